// SPDX-License-Identifier: LGPL-3.0-or-later

use super::chat_recorder::ChatRecorder;
use crate::enrichment::player_data_loader::{PlayerBans, PlayerSummary, RosterSink};
use crate::ingest::LogEvent;
use crate::model::{Player, Server, SteamId, UserMessage};
use crate::rules::RulesEngine;
use crate::store::PlayerStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

/// Bound on the in-memory chat scrollback `GameState` keeps for query
/// purposes; the full history lives in the store (spec.md §6).
const MESSAGE_HISTORY_CAP: usize = 1000;

/// Minimum spacing between chat warnings for the same player (spec.md §4.10).
const CHAT_WARNING_COOLDOWN: Duration = Duration::from_secs(30);

/// A player the [`RulesEngine`] flagged on a tick, handed to Overwatch for
/// policy action (spec.md §4.4/§4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPlayer {
    pub steam_id: SteamId,
    pub user_id: i32,
    pub name: String,
    pub origin: String,
    pub attributes: Vec<String>,
}

/// Single-owner authoritative model of the current server and its roster
/// (spec.md §4.4). Guarded by a readers-writer lock at the call site via
/// [`GameStateHandle`]; `GameState` itself assumes exclusive `&mut` access.
pub struct GameState {
    server: Server,
    roster: HashMap<SteamId, Player>,
    order: Vec<SteamId>,
    messages: VecDeque<UserMessage>,
    next_message_id: i64,
    store: Arc<dyn PlayerStore>,
    chat_recorder: ChatRecorder,
    profile_queue: mpsc::Sender<SteamId>,
    local_steam_id: Option<SteamId>,
    disconnected_timeout: Duration,
}

impl GameState {
    pub fn new(
        store: Arc<dyn PlayerStore>,
        profile_queue: mpsc::Sender<SteamId>,
        local_steam_id: Option<SteamId>,
        disconnected_timeout: Duration,
    ) -> Self {
        let chat_recorder = ChatRecorder::spawn(store.clone());
        Self {
            server: Server::default(),
            roster: HashMap::new(),
            order: Vec::new(),
            messages: VecDeque::new(),
            next_message_id: 0,
            store,
            chat_recorder,
            profile_queue,
            local_steam_id,
            disconnected_timeout,
        }
    }

    /// Mutates roster/server/messages per the event kind (spec.md §4.4's
    /// event-to-effect table).
    pub async fn apply(&mut self, event: LogEvent) {
        match event {
            LogEvent::Map { name, .. } => {
                self.server.current_map = name;
                self.server.touch();
            }
            LogEvent::Hostname { name, .. } => {
                self.server.name = name;
                self.server.touch();
            }
            LogEvent::Tags { tags, .. } => {
                self.server.tags = tags;
                self.server.touch();
                // UI-refresh notice: the HTTP adapter (out of scope) polls
                // `server()` directly, so there is no further signal to emit here.
            }
            LogEvent::Address { ip, port, .. } => {
                self.server.address = Some(ip);
                self.server.port = port;
                self.server.touch();
            }
            LogEvent::StatusId {
                user_id,
                name,
                steam_id,
                connected,
                ping,
                ..
            } => {
                self.apply_status_id(user_id, name, steam_id, connected, ping).await;
            }
            LogEvent::Chat {
                name,
                team_only,
                dead,
                message,
                timestamp,
                ..
            } => {
                self.apply_chat(name, team_only, dead, message, timestamp);
            }
            LogEvent::Kill { killer, victim, .. } => {
                self.apply_kill(&killer, &victim);
            }
            LogEvent::Disconnect { .. } => {
                // Recorded but does not remove the Player — removal is driven
                // solely by the expiry tick, so late-arriving events still
                // find the player (spec.md §4.4).
            }
            LogEvent::Lobby { steam_id, team } => {
                if let Some(player) = self.roster.get_mut(&steam_id) {
                    player.team = team;
                }
            }
            LogEvent::Connect { .. } | LogEvent::LobbyChangeBanner { .. } => {
                // No handler: omitted from spec.md §4.4's event-to-effect table.
            }
        }
    }

    async fn apply_status_id(&mut self, user_id: i32, name: String, steam_id: SteamId, connected: Duration, ping: u32) {
        if !steam_id.is_valid() {
            return;
        }
        if !self.roster.contains_key(&steam_id) {
            let player = match self.store.load_or_create_player(steam_id, &name).await {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("failed to load/create player {steam_id}: {e}");
                    Player::new(steam_id, name.clone())
                }
            };
            self.roster.insert(steam_id, player);
            self.order.push(steam_id);
            if self.profile_queue.try_send(steam_id).is_err() {
                log::debug!("profile update queue full or closed, dropping request for {steam_id}");
            }
        }

        self.reject_or_warn_user_id_reuse(steam_id, user_id);

        let player = self.roster.get_mut(&steam_id).expect("inserted above");
        if player.previous_name != name {
            let store = self.store.clone();
            let sid = steam_id;
            let new_name = name.clone();
            tokio::spawn(async move {
                if let Err(e) = store.save_name(sid, &new_name).await {
                    log::warn!("failed to persist name history for {sid}: {e}");
                }
            });
            player.previous_name = name.clone();
        }
        player.name = name;
        player.user_id = user_id;
        player.connected = connected;
        player.ping = ping;
        player.updated_on = Instant::now();
    }

    /// spec.md §9's open question is pinned down by SPEC_FULL.md §D: slot
    /// reuse before expiry never happens. A conflicting userID on a *live*
    /// roster entry trips a `debug_assert!` in debug builds; in release it
    /// is logged and the stale association is cleared so the new owner wins.
    fn reject_or_warn_user_id_reuse(&mut self, steam_id: SteamId, user_id: i32) {
        if user_id == 0 {
            return;
        }
        for (sid, player) in self.roster.iter_mut() {
            if *sid != steam_id && player.user_id == user_id {
                debug_assert!(
                    false,
                    "userID {user_id} reassigned from {sid} to {steam_id} before expiry"
                );
                log::warn!("userID {user_id} reassigned from {sid} to {steam_id} before expiry; clearing stale association");
                player.user_id = 0;
            }
        }
    }

    fn apply_chat(&mut self, name: String, team_only: bool, dead: bool, message: String, timestamp: DateTime<Utc>) {
        let Some(steam_id) = self.resolve_name(&name) else {
            log::debug!("chat from unresolved name {name:?}, dropping");
            return;
        };
        let user_id = self.roster.get(&steam_id).map(|p| p.user_id).unwrap_or(0);
        self.next_message_id += 1;
        let user_message = UserMessage {
            message_id: self.next_message_id,
            steam_id,
            user_id,
            name,
            team: team_only,
            dead,
            message,
            created_at: timestamp,
        };
        if self.messages.len() >= MESSAGE_HISTORY_CAP {
            self.messages.pop_front();
        }
        self.messages.push_back(user_message.clone());
        self.chat_recorder.record(user_message);
    }

    /// Chat events carry only a display name; resolve it against the live
    /// roster (spec.md §4.9 "Roster identity"). Unresolvable names are
    /// dropped, not queued for later reconciliation.
    fn resolve_name(&self, name: &str) -> Option<SteamId> {
        self.order
            .iter()
            .find(|sid| self.roster.get(sid).is_some_and(|p| p.name == name))
            .copied()
    }

    /// `kills_on_local`/`deaths_by_local` describe the *other* player's
    /// record against the local player, not the local player's own tally —
    /// they answer "has this roster member killed me" and "have I killed
    /// this roster member".
    fn apply_kill(&mut self, killer: &str, victim: &str) {
        let local_name = self
            .local_steam_id
            .and_then(|sid| self.roster.get(&sid))
            .map(|p| p.name.clone());
        let victim_is_local = local_name.as_deref() == Some(victim);
        let killer_is_local = local_name.as_deref() == Some(killer);
        for player in self.roster.values_mut() {
            if player.name == killer {
                player.kills += 1;
                if victim_is_local {
                    player.kills_on_local += 1;
                }
            }
            if player.name == victim {
                player.deaths += 1;
                if killer_is_local {
                    player.deaths_by_local += 1;
                }
            }
        }
    }

    /// Expires stale players, persists them, then evaluates the rest against
    /// `rules`, returning the matches for Overwatch to act on (spec.md §4.4).
    pub async fn tick(&mut self, rules: &RwLock<RulesEngine>) -> Vec<MatchedPlayer> {
        self.expire_stale().await;
        self.evaluate_and_flush(rules).await
    }

    async fn expire_stale(&mut self) {
        let now = Instant::now();
        let timeout = self.disconnected_timeout;
        let expired: Vec<SteamId> = self
            .roster
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.updated_on) > timeout)
            .map(|(sid, _)| *sid)
            .collect();
        for sid in expired {
            self.order.retain(|s| *s != sid);
            if let Some(mut player) = self.roster.remove(&sid) {
                log::info!("player {sid} ({}) expired", player.name);
                if let Err(e) = self.store.save_player(&mut player).await {
                    log::warn!("failed to persist expired player {sid}: {e}");
                }
            }
        }
    }

    async fn evaluate_and_flush(&mut self, rules: &RwLock<RulesEngine>) -> Vec<MatchedPlayer> {
        let mut matched = Vec::new();
        let sids = self.order.clone();
        for sid in sids {
            let Some((user_id, name)) = self.roster.get(&sid).map(|p| (p.user_id, p.name.clone())) else {
                continue;
            };
            {
                let engine = rules.read().await;
                if let Some(m) = engine.match_steam(sid) {
                    matched.push(MatchedPlayer {
                        steam_id: sid,
                        user_id,
                        name: name.clone(),
                        origin: m.origin,
                        attributes: m.attributes,
                    });
                } else if let Some(m) = engine.match_name(&name) {
                    log::debug!("name-only match for {sid} ({name}): origin={} attrs={:?}", m.origin, m.attributes);
                }
            }
            if let Some(player) = self.roster.get_mut(&sid) {
                if let Err(e) = self.store.save_player(player).await {
                    log::warn!("failed to flush player {sid}: {e}");
                }
            }
        }
        matched
    }

    pub fn players(&self) -> Vec<Player> {
        self.order.iter().filter_map(|sid| self.roster.get(sid)).cloned().collect()
    }

    pub fn server(&self) -> Server {
        self.server.clone()
    }

    pub fn find_by_steam_id(&self, steam_id: SteamId) -> Option<Player> {
        self.roster.get(&steam_id).cloned()
    }

    pub fn find_by_user_id(&self, user_id: i32) -> Option<Player> {
        self.roster.values().find(|p| p.user_id == user_id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Player> {
        self.roster.values().find(|p| p.name == name).cloned()
    }

    pub fn messages(&self) -> Vec<UserMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }
}

/// Shared handle around a lock-guarded [`GameState`]. This is the surface
/// external consumers (the HTTP adapter, [`PlayerDataLoader`](crate::enrichment::PlayerDataLoader))
/// take a clone of, rather than touching `GameState` directly.
#[derive(Clone)]
pub struct GameStateHandle(Arc<RwLock<GameState>>);

impl GameStateHandle {
    pub fn new(inner: GameState) -> Self {
        Self(Arc::new(RwLock::new(inner)))
    }

    pub async fn apply(&self, event: LogEvent) {
        self.0.write().await.apply(event).await;
    }

    pub async fn tick(&self, rules: &RwLock<RulesEngine>) -> Vec<MatchedPlayer> {
        self.0.write().await.tick(rules).await
    }

    pub async fn players(&self) -> Vec<Player> {
        self.0.read().await.players()
    }

    pub async fn server(&self) -> Server {
        self.0.read().await.server()
    }

    pub async fn find_by_steam_id(&self, steam_id: SteamId) -> Option<Player> {
        self.0.read().await.find_by_steam_id(steam_id)
    }

    pub async fn find_by_user_id(&self, user_id: i32) -> Option<Player> {
        self.0.read().await.find_by_user_id(user_id)
    }

    pub async fn messages(&self) -> Vec<UserMessage> {
        self.0.read().await.messages()
    }

    /// Grants a chat-warning announcement if `steam_id`'s `announced_last` is
    /// unset or at least [`CHAT_WARNING_COOLDOWN`] in the past, updating it on
    /// grant. Returns `false` for an unknown steamID or a still-cooling-down one.
    pub async fn try_announce(&self, steam_id: SteamId) -> bool {
        let mut guard = self.0.write().await;
        let Some(player) = guard.roster.get_mut(&steam_id) else {
            return false;
        };
        let now = Instant::now();
        let cooled_down = player
            .announced_last
            .map_or(true, |last| now.saturating_duration_since(last) >= CHAT_WARNING_COOLDOWN);
        if cooled_down {
            player.announced_last = Some(now);
        }
        cooled_down
    }

    pub async fn record_kick_attempt(&self, steam_id: SteamId) {
        let mut guard = self.0.write().await;
        if let Some(player) = guard.roster.get_mut(&steam_id) {
            player.kick_attempt_count += 1;
        }
    }
}

#[async_trait::async_trait]
impl RosterSink for GameStateHandle {
    async fn apply_summary(&self, summary: PlayerSummary) {
        let mut guard = self.0.write().await;
        if let Some(player) = guard.roster.get_mut(&summary.steam_id) {
            player.visibility = summary.visibility;
            player.avatar_hash = summary.avatar_hash;
            player.account_created_on = summary.account_created_on;
            player.real_name = summary.real_name;
        }
    }

    async fn apply_bans(&self, bans: PlayerBans) {
        let mut guard = self.0.write().await;
        if let Some(player) = guard.roster.get_mut(&bans.steam_id) {
            player.number_of_vac_bans = bans.number_of_vac_bans;
            player.number_of_game_bans = bans.number_of_game_bans;
            player.community_banned = bans.community_banned;
            player.days_since_last_ban = bans.days_since_last_ban;
            player.economy_ban = bans.economy_ban;
        }
    }

    async fn attach_avatar(&self, steam_id: SteamId, bytes: Vec<u8>) {
        let mut guard = self.0.write().await;
        if let Some(player) = guard.roster.get_mut(&steam_id) {
            player.avatar_bytes = Some(bytes);
        }
    }

    async fn avatar_hashes(&self) -> Vec<(SteamId, String)> {
        let guard = self.0.read().await;
        guard
            .roster
            .values()
            .filter(|p| !p.avatar_hash.is_empty())
            .map(|p| (p.steam_id, p.avatar_hash.clone()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::sqlite::SqliteStore;

    async fn state() -> (GameState, mpsc::Receiver<SteamId>) {
        let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let (tx, rx) = mpsc::channel(16);
        let state = GameState::new(store, tx, None, Duration::from_secs(60));
        (state, rx)
    }

    #[tokio::test]
    async fn status_then_chat_resolves_steam_id_s1() {
        let (mut state, _rx) = state().await;
        state
            .apply_status_id(7, "Knyfe".to_string(), SteamId(76561197960265851), Duration::from_secs(10), 20)
            .await;
        state.apply_chat("Knyfe".to_string(), true, true, "gg".to_string(), Utc::now());

        let messages = state.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].steam_id, SteamId(76561197960265851));
        assert!(messages[0].team);
        assert!(messages[0].dead);
    }

    #[tokio::test]
    async fn chat_from_unknown_name_is_dropped() {
        let (mut state, _rx) = state().await;
        state.apply_chat("Ghost".to_string(), false, false, "hi".to_string(), Utc::now());
        assert!(state.messages().is_empty());
    }

    #[tokio::test]
    async fn expiry_removes_player_and_persists_once_s2() {
        let (mut state, _rx) = state().await;
        state
            .apply_status_id(7, "Knyfe".to_string(), SteamId(76561197960265851), Duration::from_secs(10), 20)
            .await;
        assert_eq!(state.roster_len(), 1);

        if let Some(player) = state.roster.get_mut(&SteamId(76561197960265851)) {
            player.updated_on = Instant::now() - Duration::from_secs(61);
        }
        state.expire_stale().await;
        assert_eq!(state.roster_len(), 0);
    }

    #[tokio::test]
    async fn disconnect_does_not_remove_player() {
        let (mut state, _rx) = state().await;
        state
            .apply_status_id(7, "Knyfe".to_string(), SteamId(76561197960265851), Duration::from_secs(10), 20)
            .await;
        state
            .apply(LogEvent::Disconnect {
                timestamp: Utc::now(),
                reason: "Disconnect by user.".to_string(),
            })
            .await;
        assert_eq!(state.roster_len(), 1);
    }

    #[tokio::test]
    async fn kill_counters_track_local_player_exchanges() {
        let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let (tx, _rx) = mpsc::channel(16);
        let mut state = GameState::new(store, tx, Some(SteamId(1)), Duration::from_secs(60));
        state.apply_status_id(1, "Local".to_string(), SteamId(1), Duration::ZERO, 0).await;
        state.apply_status_id(2, "Other".to_string(), SteamId(2), Duration::ZERO, 0).await;

        state.apply_kill("Other", "Local");
        let other = state.find_by_steam_id(SteamId(2)).unwrap();
        assert_eq!(other.kills, 1);
        assert_eq!(other.kills_on_local, 1);

        state.apply_kill("Local", "Other");
        let other = state.find_by_steam_id(SteamId(2)).unwrap();
        assert_eq!(other.deaths, 1);
        assert_eq!(other.deaths_by_local, 1);
    }

    #[tokio::test]
    async fn roster_never_has_duplicate_steam_ids() {
        let (mut state, _rx) = state().await;
        for _ in 0..3 {
            state
                .apply_status_id(7, "Knyfe".to_string(), SteamId(76561197960265851), Duration::from_secs(10), 20)
                .await;
        }
        assert_eq!(state.roster_len(), 1);
    }
}
