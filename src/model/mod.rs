// SPDX-License-Identifier: LGPL-3.0-or-later

pub mod message;
pub mod player;
pub mod server;
pub mod steamid;

pub use message::{UserMessage, UserNameHistory};
pub use player::{Player, Team, Visibility};
pub use server::Server;
pub use steamid::SteamId;
