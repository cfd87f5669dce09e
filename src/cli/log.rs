// SPDX-License-Identifier: LGPL-3.0-or-later

use super::options::Options;
use log::LevelFilter;

/// Initializes the global logger once, at startup, from [`Options`].
/// Verbosity flags raise the floor above the build-profile default; they
/// never lower it, so a release build can't be made quieter than `info`.
pub fn init(options: &Options) {
    let base = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let level = match options.verbose {
        0 => base,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_module_path(true)
        .format_timestamp_millis()
        .init();
}
