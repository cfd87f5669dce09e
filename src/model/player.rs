// SPDX-License-Identifier: LGPL-3.0-or-later

use super::steamid::SteamId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blue,
    Unassigned,
    Spectator,
}

impl Default for Team {
    fn default() -> Self {
        Team::Unassigned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum Visibility {
    Private = 1,
    FriendsOnly = 2,
    Public = 3,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

impl Visibility {
    pub fn from_steam_api(value: i64) -> Visibility {
        match value {
            1 => Visibility::Private,
            2 => Visibility::FriendsOnly,
            _ => Visibility::Public,
        }
    }
}

/// A member of the current server's roster. Keyed by `steam_id` within
/// [`crate::state::GameState`]; at most one `Player` per steam_id exists at a time.
#[derive(Debug, Clone)]
pub struct Player {
    pub steam_id: SteamId,
    pub user_id: i32,
    pub name: String,
    pub previous_name: String,
    pub connected: Duration,
    pub ping: u32,
    pub team: Team,
    pub visibility: Visibility,
    pub real_name: String,
    pub avatar_hash: String,
    pub avatar_bytes: Option<Vec<u8>>,
    pub account_created_on: Option<DateTime<Utc>>,
    pub number_of_vac_bans: i64,
    pub number_of_game_bans: i64,
    pub days_since_last_ban: i64,
    pub community_banned: bool,
    pub economy_ban: bool,
    pub kills: u64,
    pub deaths: u64,
    pub kills_on_local: u64,
    pub deaths_by_local: u64,
    pub rage_quits: u64,
    pub announced_last: Option<Instant>,
    pub kick_attempt_count: u32,
    pub created_on: DateTime<Utc>,
    pub updated_on: Instant,
    /// True until this player has been written to the persistent store at least once.
    pub dangling: bool,
}

impl Player {
    /// A freshly-seen player, not yet loaded from or inserted into the store.
    pub fn new(steam_id: SteamId, name: String) -> Self {
        let now = Utc::now();
        Self {
            steam_id,
            user_id: 0,
            name,
            previous_name: String::new(),
            connected: Duration::ZERO,
            ping: 0,
            team: Team::Unassigned,
            visibility: Visibility::Public,
            real_name: String::new(),
            avatar_hash: String::new(),
            avatar_bytes: None,
            account_created_on: None,
            number_of_vac_bans: 0,
            number_of_game_bans: 0,
            days_since_last_ban: 0,
            community_banned: false,
            economy_ban: false,
            kills: 0,
            deaths: 0,
            kills_on_local: 0,
            deaths_by_local: 0,
            rage_quits: 0,
            announced_last: None,
            kick_attempt_count: 0,
            created_on: now,
            updated_on: Instant::now(),
            dangling: true,
        }
    }

    pub fn set_avatar(&mut self, hash: String, bytes: Vec<u8>) {
        self.avatar_hash = hash;
        self.avatar_bytes = Some(bytes);
    }

    pub fn avatar_url(&self) -> Option<String> {
        if self.avatar_hash.is_empty() {
            return None;
        }
        Some(format!(
            "https://avatars.steamstatic.com/{}_full.jpg",
            self.avatar_hash
        ))
    }
}
