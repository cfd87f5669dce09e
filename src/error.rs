// SPDX-License-Identifier: LGPL-3.0-or-later

use std::path::PathBuf;
use thiserror::Error;

/// Startup-fatal configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine per-user config directory")]
    NoConfigDir,
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A log source (file tail or UDP listener) could not be opened.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("console log path {0} could not be opened: {1}")]
    FileUnavailable(PathBuf, #[source] std::io::Error),
    #[error("UDP listener could not bind {0}: {1}")]
    UdpUnavailable(std::net::SocketAddr, #[source] std::io::Error),
}

/// Transient RCON transport/protocol failures. Triggers a reconnect on next call.
#[derive(Debug, Error)]
pub enum RconError {
    #[error("rcon transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rcon authentication rejected")]
    AuthFailed,
    #[error("rcon response did not match any in-flight request")]
    Desync,
    #[error("rcon connect timed out")]
    ConnectTimeout,
}

/// A single remote list failed to refresh. Logged; previous state is kept.
#[derive(Debug, Error)]
pub enum RemoteFetchError {
    #[error("http error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("list at {url} failed to parse: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk cache outcomes. `Miss`/`Expired` are expected control flow, not failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,
    #[error("cache entry expired")]
    Expired,
}

/// A policy action was refused because its precondition didn't hold.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("game is not currently running")]
    NotMarked,
}
