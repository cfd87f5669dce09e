// SPDX-License-Identifier: LGPL-3.0-or-later

use super::steamid::SteamId;
use chrono::{DateTime, Utc};

/// Append-only chat message. Created once, never mutated.
#[derive(Debug, Clone)]
pub struct UserMessage {
    pub message_id: i64,
    pub steam_id: SteamId,
    pub user_id: i32,
    pub name: String,
    pub team: bool,
    pub dead: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A row recorded when a player's display name changes from what was last seen.
#[derive(Debug, Clone)]
pub struct UserNameHistory {
    pub name_id: i64,
    pub steam_id: SteamId,
    pub name: String,
    pub first_seen: DateTime<Utc>,
}
