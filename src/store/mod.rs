// SPDX-License-Identifier: LGPL-3.0-or-later

//! Persistent player history: names, chat messages, and ban/profile counters
//! that outlive a single session. See spec.md §4.4's event-to-effect table
//! and §6 for the schema this backs.

pub mod sqlite;

use crate::model::{Player, SteamId, UserMessage, UserNameHistory};

/// Everything GameState, ChatRecorder, and PlayerDataLoader need from
/// durable storage. A trait so tests can substitute an in-memory fake
/// without touching sqlx.
#[async_trait::async_trait]
pub trait PlayerStore: Send + Sync {
    /// Looks up a player by steamID. If no row exists, creates one as
    /// `dangling` and immediately persists it (mirrors the upstream
    /// behavior of never leaving a freshly-seen player unsaved).
    async fn load_or_create_player(
        &self,
        steam_id: SteamId,
        name: &str,
    ) -> Result<Player, sqlx::Error>;

    /// Inserts (if `player.dangling`) or updates the player row, clearing
    /// `dangling` on success.
    async fn save_player(&self, player: &mut Player) -> Result<(), sqlx::Error>;

    async fn save_name(&self, steam_id: SteamId, name: &str) -> Result<(), sqlx::Error>;

    async fn save_message(&self, steam_id: SteamId, message: &str) -> Result<(), sqlx::Error>;

    async fn fetch_names(&self, steam_id: SteamId) -> Result<Vec<UserNameHistory>, sqlx::Error>;

    async fn fetch_messages(&self, steam_id: SteamId) -> Result<Vec<UserMessage>, sqlx::Error>;
}
