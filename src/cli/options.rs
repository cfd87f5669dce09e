// SPDX-License-Identifier: LGPL-3.0-or-later

use clap::Parser;
use std::path::PathBuf;

/// Command-line overrides of the persisted [`crate::config::Settings`].
/// Everything here is optional; an unset field leaves the settings file's
/// value untouched.
#[derive(Debug, Parser)]
#[command(name = "bd", about = "Real-time cheater/bot detector core for Team Fortress 2")]
pub struct Options {
    /// Overrides the per-user settings file location.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increases log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Runs the full pipeline against synthetic input instead of a live
    /// game: RCON and third-party API calls become no-ops. Matches the
    /// original's `RunMode` test harness (SPEC_FULL.md §C.8).
    #[arg(long)]
    pub dry_run: bool,

    /// Skips loading the local player/rules list on startup (only
    /// meaningful with `--dry-run`).
    #[arg(long)]
    pub skip_local_lists: bool,
}

impl Options {
    pub fn parse_args() -> Self {
        Options::parse()
    }
}
