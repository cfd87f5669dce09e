// SPDX-License-Identifier: LGPL-3.0-or-later

//! Settings file ((de)serialization is the adapter's job per spec.md §1,
//! but the shape and the per-user path it lives at are core contract — see
//! spec.md §6 and SPEC_FULL.md §C.1).

pub mod settings;

pub use settings::{LinkConfig, RconCredentials, RconMode, Settings, SteamIdFormat};
