// SPDX-License-Identifier: LGPL-3.0-or-later

//! Process entry point: loads settings, brings up every subsystem
//! [`bd_core::lib`] describes, and drives them until shutdown (spec.md §5/§6).

use bd_core::cli::{log as bd_log, Options};
use bd_core::config::Settings;
use bd_core::discord::DiscordPresence;
use bd_core::enrichment::{FsCache, PlayerDataLoader};
use bd_core::ingest::{run_ingest, EventBroadcaster, FileTail, LogSource, UdpSource};
use bd_core::launcher::GameProcessWatcher;
use bd_core::model::SteamId;
use bd_core::overwatch::Overwatch;
use bd_core::rcon::{RconConnection, StatusUpdater};
use bd_core::rules::{ListManager, RulesEngine};
use bd_core::shutdown::Shutdown;
use bd_core::state::{GameState, GameStateHandle};
use bd_core::store::sqlite::SqliteStore;
use bd_core::store::PlayerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};

/// How often [`ListManager::refresh`] re-fetches every configured remote list
/// (spec.md §4.6).
const LIST_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
/// How often [`GameState::tick`] expires stale roster entries and evaluates
/// the rules engine (spec.md §4.4).
const GAME_STATE_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// How often [`PlayerDataLoader`] drains its queued steamIDs (spec.md §4.7).
const PROFILE_BATCH_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let options = Options::parse_args();
    bd_log::init(&options);

    if let Err(e) = run(options).await {
        log::error!("fatal startup error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(options: Options) -> anyhow::Result<()> {
    let settings = Settings::read_or_create().await?;
    let local_steam_id = settings.local_steam_id();
    let shutdown = Shutdown::new();

    let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::connect(&settings.db_path()).await?);

    let rules = Arc::new(RwLock::new(RulesEngine::new()));
    if !options.skip_local_lists {
        load_local_lists(&settings, &rules).await;
    }

    let broadcaster = Arc::new(EventBroadcaster::new());

    let (profile_tx, profile_rx) = mpsc::channel::<SteamId>(256);
    let game_state = GameState::new(store.clone(), profile_tx, local_steam_id, settings.disconnected_timeout_duration());
    let state = GameStateHandle::new(game_state);

    let http = reqwest::Client::builder().user_agent("bd-core").build()?;
    let cache_root = settings.cache_root();
    let enrichment_cache = FsCache::new(cache_root.clone(), Duration::from_secs(3600));
    let list_cache = FsCache::new(cache_root, Duration::from_secs(3600));

    let rcon = Arc::new(RconConnection::new(settings.rcon_credentials()));
    let (game_running_tx, game_running_rx) = watch::channel(false);

    let mut tasks = Vec::new();

    let watcher = GameProcessWatcher::new();
    let watcher_cancel = shutdown.child();
    let watcher_running_tx = game_running_tx.clone();
    let auto_close = settings.auto_close_on_game_exit;
    let shutdown_trigger = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        watcher.run(watcher_running_tx, auto_close, watcher_cancel.clone()).await;
        if watcher_cancel.is_cancelled() {
            shutdown_trigger.trigger();
        }
    }));

    let status_updater = StatusUpdater::new(rcon.clone(), broadcaster.clone(), game_running_rx.clone());
    let status_cancel = shutdown.child();
    tasks.push(tokio::spawn(status_updater.run(status_cancel)));

    if !options.dry_run {
        let loader = PlayerDataLoader::new(http.clone(), settings.api_key.clone(), enrichment_cache);
        let loader_sink = state.clone();
        let mut loader_cancel = shutdown.child();
        tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = loader_cancel.cancelled() => {},
                _ = loader.run(profile_rx, &loader_sink, PROFILE_BATCH_INTERVAL) => {},
            }
        }));
    } else {
        drop(profile_rx);
    }

    let list_manager = Arc::new(ListManager::new(http.clone(), list_cache));
    {
        let list_manager = list_manager.clone();
        let rules = rules.clone();
        let lists = settings.lists.clone();
        let mut cancel = shutdown.child();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LIST_REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let ok = list_manager.refresh(&lists, &rules).await;
                        log::info!("refreshed {ok}/{} remote lists", lists.len());
                    }
                }
            }
        }));
    }

    {
        let state = state.clone();
        let rules = rules.clone();
        let rcon = rcon.clone();
        let mut overwatch = Overwatch::new(
            state.clone(),
            rcon,
            local_steam_id,
            settings.chat_warnings_enabled,
            settings.kicker_enabled,
        );
        let mut cancel = shutdown.child();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GAME_STATE_TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let matches = state.tick(&rules).await;
                        overwatch.review(matches).await;
                    }
                }
            }
        }));
    }

    if !options.dry_run {
        let source: Box<dyn LogSource> = if settings.udp_listener_enabled {
            Box::new(UdpSource::bind(settings.udp_listener_addr).await?)
        } else {
            let console_log = settings.tf2_root.join("console.log");
            Box::new(FileTail::open(console_log).await?)
        };
        let (ingest_cancel_tx, ingest_cancel_rx) = oneshot::channel();
        let ingest_broadcaster = broadcaster.clone();
        tasks.push(tokio::spawn(async move {
            run_ingest(source, &ingest_broadcaster, ingest_cancel_rx).await;
        }));
        let mut shutdown_watch = shutdown.child();
        tokio::spawn(async move {
            shutdown_watch.cancelled().await;
            let _ = ingest_cancel_tx.send(());
        });

        let state = state.clone();
        let mut sub = broadcaster.subscribe();
        let mut cancel = shutdown.child();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = sub.recv() => {
                        match event {
                            Some(event) => state.apply(event).await,
                            None => return,
                        }
                    }
                }
            }
        }));
    }

    if settings.discord_presence_enabled && !options.dry_run {
        match DiscordPresence::connect(chrono::Utc::now().timestamp()) {
            Ok(presence) => {
                let state = state.clone();
                let cancel = shutdown.child();
                tasks.push(tokio::spawn(presence.run(state, cancel)));
            }
            Err(e) => log::warn!("discord rich presence unavailable: {e:#}"),
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("received interrupt, shutting down");
        }
        _ = shutdown.triggered() => {
            log::info!("shutdown triggered internally");
        }
    }
    shutdown.trigger();

    let drain = futures::future::join_all(tasks);
    if tokio::time::timeout(bd_core::shutdown::SHUTDOWN_DEADLINE, drain).await.is_err() {
        log::warn!("shutdown deadline exceeded, abandoning remaining tasks");
    }

    if let Err(e) = persist_local_lists(&settings, &rules).await {
        log::warn!("failed to persist local lists on shutdown: {e}");
    }
    rcon.close().await;

    Ok(())
}

async fn load_local_lists(settings: &Settings, rules: &RwLock<RulesEngine>) {
    use bd_core::rules::LOCAL_ORIGIN;

    let player_path = settings.local_player_list_path();
    match tokio::fs::read(&player_path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(list) => {
                rules.write().await.import_players(LOCAL_ORIGIN, &list);
            }
            Err(e) => log::warn!("local player list at {player_path:?} failed to parse: {e}"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to read local player list {player_path:?}: {e}"),
    }

    let rules_path = settings.local_rules_list_path();
    match tokio::fs::read(&rules_path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(list) => {
                if let Err(e) = rules.write().await.import_rules(LOCAL_ORIGIN, &list) {
                    log::warn!("local rules list at {rules_path:?} failed to compile: {e}");
                }
            }
            Err(e) => log::warn!("local rules list at {rules_path:?} failed to parse: {e}"),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to read local rules list {rules_path:?}: {e}"),
    }
}

/// Writes the `local` origin's marks and rules back to disk so they survive
/// a restart (spec.md §6: the local lists are the one piece of state this
/// process itself authors, not merely caches).
async fn persist_local_lists(settings: &Settings, rules: &RwLock<RulesEngine>) -> anyhow::Result<()> {
    use bd_core::rules::LOCAL_ORIGIN;
    let engine = rules.read().await;

    let player_path = settings.local_player_list_path();
    let mut player_file = std::fs::File::create(&player_path)?;
    engine.export_players(LOCAL_ORIGIN, &mut player_file)?;

    let rules_path = settings.local_rules_list_path();
    let mut rules_file = std::fs::File::create(&rules_path)?;
    engine.export_rules(LOCAL_ORIGIN, &mut rules_file)?;

    Ok(())
}
