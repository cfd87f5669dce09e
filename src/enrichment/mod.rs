// SPDX-License-Identifier: LGPL-3.0-or-later

//! Third-party profile/ban enrichment and avatar caching (spec.md §4.7).

pub mod cache;
pub mod player_data_loader;

pub use cache::FsCache;
pub use player_data_loader::{PlayerDataLoader, PlayerSummary, PlayerBans};
