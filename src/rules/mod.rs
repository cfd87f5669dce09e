// SPDX-License-Identifier: LGPL-3.0-or-later

//! The reputation layer: locally-authored marks plus remotely fetched
//! player/rule lists, merged into one queryable surface. See spec.md
//! §4.5/§4.6.

pub mod engine;
pub mod list_manager;
pub mod schema;

pub use engine::{Match, MarkOptions, RuleCompileError, RulesEngine, LOCAL_ORIGIN};
pub use list_manager::{ListConfig, ListKind, ListManager};
