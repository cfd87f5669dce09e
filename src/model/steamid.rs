// SPDX-License-Identifier: LGPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::fmt;

/// 64-bit canonical Steam account identifier. Roster identity is keyed on this;
/// userID and name are lookup hints only (see DESIGN.md "Roster identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(pub u64);

const STEAM64_IDENT: u64 = 0x0110_0001_0000_0000;

impl SteamId {
    pub const INVALID: SteamId = SteamId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Parses a SteamID3 string of the form `[U:1:N]` into its 64-bit form.
    pub fn from_steam3(s: &str) -> Option<SteamId> {
        let inner = s.strip_prefix("[U:1:")?.strip_suffix(']')?;
        let account_id: u64 = inner.parse().ok()?;
        Some(SteamId(STEAM64_IDENT + account_id))
    }

    pub fn to_steam3(self) -> String {
        let account_id = self.0.wrapping_sub(STEAM64_IDENT);
        format!("[U:1:{account_id}]")
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_steam3() {
        let sid = SteamId::from_steam3("[U:1:123]").unwrap();
        assert_eq!(sid, SteamId(76561197960265851));
        assert_eq!(sid.to_steam3(), "[U:1:123]");
    }

    #[test]
    fn rejects_malformed_steam3() {
        assert!(SteamId::from_steam3("garbage").is_none());
        assert!(SteamId::from_steam3("[U:1:abc]").is_none());
    }
}
