// SPDX-License-Identifier: LGPL-3.0-or-later

//! Chat-warning and vote-kick policy driven off [`GameState`](crate::state::GameState)'s
//! tick matches (spec.md §4.10).

use crate::model::SteamId;
use crate::rate_limiter::RateLimiter;
use crate::rcon::RconConnection;
use crate::state::{GameStateHandle, MatchedPlayer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One vote-kick attempt per this long, across the whole server — not per
/// player (spec.md §4.10: "one vote per 30 s total").
const KICK_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickReason {
    Cheating,
    Idle,
    Scamming,
    Other,
}

impl KickReason {
    /// The spec leaves attribute→reason mapping unspecified; this picks the
    /// first recognizable keyword among a match's attributes and otherwise
    /// falls back to `Other` (DESIGN.md "Kick reason derivation").
    pub fn from_attributes(attributes: &[String]) -> Self {
        for attribute in attributes {
            let lower = attribute.to_lowercase();
            if lower.contains("cheat") {
                return KickReason::Cheating;
            }
            if lower.contains("scam") {
                return KickReason::Scamming;
            }
            if lower.contains("idle") || lower.contains("afk") {
                return KickReason::Idle;
            }
        }
        KickReason::Other
    }
}

impl fmt::Display for KickReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KickReason::Cheating => "cheating",
            KickReason::Idle => "idle",
            KickReason::Scamming => "scamming",
            KickReason::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Acts on [`MatchedPlayer`]s GameState surfaces each tick. Never touches the
/// local player's own steamID.
pub struct Overwatch {
    state: GameStateHandle,
    rcon: Arc<RconConnection>,
    local_steam_id: Option<SteamId>,
    chat_warnings_enabled: bool,
    kicker_enabled: bool,
    kick_limiter: RateLimiter,
}

impl Overwatch {
    pub fn new(
        state: GameStateHandle,
        rcon: Arc<RconConnection>,
        local_steam_id: Option<SteamId>,
        chat_warnings_enabled: bool,
        kicker_enabled: bool,
    ) -> Self {
        Self {
            state,
            rcon,
            local_steam_id,
            chat_warnings_enabled,
            kicker_enabled,
            kick_limiter: RateLimiter::once_per(KICK_COOLDOWN),
        }
    }

    pub async fn review(&mut self, matches: Vec<MatchedPlayer>) {
        for matched in matches {
            if Some(matched.steam_id) == self.local_steam_id {
                continue;
            }
            self.apply(matched).await;
        }
    }

    async fn apply(&mut self, matched: MatchedPlayer) {
        if self.chat_warnings_enabled {
            self.warn(&matched).await;
        }
        if self.kicker_enabled {
            self.kick(&matched).await;
        }
    }

    async fn warn(&self, matched: &MatchedPlayer) {
        if !self.state.try_announce(matched.steam_id).await {
            return;
        }
        let message = format!("Player is a bot: ({}) [{}] {} ", matched.user_id, matched.origin, matched.name);
        if let Err(e) = self.rcon.exec(&format!("say_party \"{message}\"")).await {
            log::warn!("failed to send chat warning for {}: {e}", matched.steam_id);
        }
    }

    async fn kick(&mut self, matched: &MatchedPlayer) {
        if self.kick_limiter.should_limit_rate() {
            return;
        }
        let reason = KickReason::from_attributes(&matched.attributes);
        let cmd = format!("callvote kick \"{} {reason}\"", matched.user_id);
        match self.rcon.exec(&cmd).await {
            Ok(_) => self.state.record_kick_attempt(matched.steam_id).await,
            Err(e) => log::warn!("failed to call vote kick on {}: {e}", matched.steam_id),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kick_reason_prefers_cheating_keyword() {
        let attrs = vec!["suspicious".to_string(), "cheater".to_string()];
        assert_eq!(KickReason::from_attributes(&attrs), KickReason::Cheating);
    }

    #[test]
    fn kick_reason_falls_back_to_other() {
        let attrs = vec!["exploiter".to_string()];
        assert_eq!(KickReason::from_attributes(&attrs), KickReason::Other);
    }

    #[test]
    fn kick_reason_display_matches_spec_vocabulary() {
        assert_eq!(KickReason::Cheating.to_string(), "cheating");
        assert_eq!(KickReason::Idle.to_string(), "idle");
        assert_eq!(KickReason::Scamming.to_string(), "scamming");
        assert_eq!(KickReason::Other.to_string(), "other");
    }
}
