// SPDX-License-Identifier: LGPL-3.0-or-later

//! The authoritative server/roster model and its chat persistence sidecar
//! (spec.md §4.4).

pub mod chat_recorder;
pub mod game_state;

pub use chat_recorder::ChatRecorder;
pub use game_state::{GameState, GameStateHandle, MatchedPlayer};
