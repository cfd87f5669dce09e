// SPDX-License-Identifier: LGPL-3.0-or-later

//! The `tf2_bot_detector` JSON list shapes. Imports and exports must
//! round-trip these byte-for-byte modulo key ordering (spec.md §6).

use crate::model::SteamId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileInfo {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub update_url: Option<String>,
}

/// A single `steamid`/`attributes` entry within a [`PlayerList`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerListEntry {
    pub steamid: PlayerListSteamId,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub last_seen: Option<LastSeen>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LastSeen {
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub time: Option<i64>,
}

/// `steamid` fields in the wild are either a bare 64-bit integer or a
/// `[U:1:N]`/`STEAM_0:...` string; accept either on import, always emit
/// the 64-bit numeric form on export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerListSteamId {
    Numeric(u64),
    Text(String),
}

impl PlayerListSteamId {
    pub fn resolve(&self) -> Option<SteamId> {
        match self {
            PlayerListSteamId::Numeric(n) => Some(SteamId(*n)),
            PlayerListSteamId::Text(s) => SteamId::from_steam3(s).or_else(|| s.parse().ok().map(SteamId)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerList {
    pub file_info: FileInfo,
    pub players: Vec<PlayerListEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTrigger {
    #[serde(default)]
    pub username_text_match: Option<TextMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMatch {
    pub mode: TextMatchMode,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextMatchMode {
    Equal,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(default)]
    pub mark: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    pub description: String,
    pub triggers: RuleTrigger,
    pub actions: RuleAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesList {
    pub file_info: FileInfo,
    pub rules: Vec<RuleEntry>,
}
