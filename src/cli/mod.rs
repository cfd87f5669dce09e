// SPDX-License-Identifier: LGPL-3.0-or-later

//! Process entry surface: argument parsing and logger initialization.

pub mod log;
pub mod options;

pub use options::Options;
