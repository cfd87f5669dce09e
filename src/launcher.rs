// SPDX-License-Identifier: LGPL-3.0-or-later

//! Platform-specific game launch argv and the process-liveness poller that
//! drives `auto_close_on_game_exit` (spec.md §6, grounded on
//! `process_state.go`'s `processState`).

use crate::error::PolicyError;
use crate::model::SteamId;
use crate::rcon::RconConnection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const PROCESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[cfg(target_os = "windows")]
const PROCESS_NAMES: &[&str] = &["hl2.exe"];
#[cfg(target_os = "linux")]
const PROCESS_NAMES: &[&str] = &["hl2_linux", "tf_linux64"];
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
const PROCESS_NAMES: &[&str] = &["hl2_linux", "tf_linux64", "hl2.exe"];

/// Builds the argv the original passes to the platform launcher (spec.md
/// §6), grounded on `getLaunchArgs`'s parameter list: rcon password, rcon
/// port, the Steam install directory, and the local player's steamID (used
/// to build the `+alias` TF2BD marks itself with on the server).
pub fn launch_args(rcon_password: &str, rcon_port: u16, steam_root: &Path, local_steam_id: Option<SteamId>) -> Vec<String> {
    let alias_target = match local_steam_id {
        Some(sid) => format!("exec tf2bd_marker_{sid}"),
        None => "exec tf2bd_marker".to_string(),
    };
    let _ = steam_root; // used by the caller to locate the executable, not as an argv token
    vec![
        "-game".to_string(),
        "tf".to_string(),
        "-steam".to_string(),
        "-secure".to_string(),
        "-usercon".to_string(),
        "+ip".to_string(),
        "0.0.0.0".to_string(),
        "+alias".to_string(),
        alias_target,
        "+rcon_password".to_string(),
        rcon_password.to_string(),
        "+hostport".to_string(),
        rcon_port.to_string(),
        "+net_start".to_string(),
        "+con_timestamp".to_string(),
        "1".to_string(),
        "+ip".to_string(),
        "0.0.0.0".to_string(),
    ]
}

#[cfg(target_os = "windows")]
fn executable_name() -> &'static str {
    "hl2.exe"
}

#[cfg(not(target_os = "windows"))]
fn executable_name() -> &'static str {
    "hl2_linux"
}

/// Spawns the game as an untracked child process (spec.md §6: "launched as a
/// child process and not tracked after launch beyond 'is it running'").
pub fn spawn_game(tf2_root: &Path, args: &[String]) -> std::io::Result<tokio::process::Child> {
    let executable = tf2_root
        .parent()
        .unwrap_or(tf2_root)
        .join(executable_name());
    tokio::process::Command::new(executable)
        .current_dir(tf2_root.parent().unwrap_or(tf2_root))
        .args(args)
        .kill_on_drop(false)
        .spawn()
}

/// Issues `quit` over RCON. Refuses if the game isn't currently known to be
/// running, mirroring the original's `errNotMarked` policy refusal.
pub async fn quit_game(rcon: &RconConnection, game_running: bool) -> Result<(), PolicyError> {
    if !game_running {
        return Err(PolicyError::NotMarked);
    }
    if let Err(e) = rcon.exec("quit").await {
        log::warn!("quit command failed: {e}");
    }
    Ok(())
}

/// Polls OS process enumeration for a known TF2 executable name, publishing
/// liveness on a watch channel and optionally triggering shutdown once the
/// game has started at least once and then stopped (`auto_close_on_game_exit`).
pub struct GameProcessWatcher {
    system: sysinfo::System,
    has_started_once: AtomicBool,
}

impl GameProcessWatcher {
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        let running = Self::scan(&system);
        Self {
            system,
            has_started_once: AtomicBool::new(running),
        }
    }

    fn scan(system: &sysinfo::System) -> bool {
        system.processes().values().any(|process| {
            let name = process.name().to_string_lossy();
            PROCESS_NAMES.iter().any(|candidate| name.eq_ignore_ascii_case(candidate))
        })
    }

    pub fn is_running(&self) -> bool {
        Self::scan(&self.system)
    }

    /// Runs until `cancel` fires. `game_running_tx` is read by
    /// [`crate::rcon::StatusUpdater`]; when `auto_close_on_game_exit` is set
    /// and the game was observed running at least once, its exit triggers
    /// `cancel` itself.
    pub async fn run(mut self, game_running_tx: watch::Sender<bool>, auto_close_on_game_exit: bool, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(PROCESS_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
                    let running = Self::scan(&self.system);
                    if running {
                        self.has_started_once.store(true, Ordering::Relaxed);
                    }
                    game_running_tx.send_if_modified(|current| {
                        let changed = *current != running;
                        *current = running;
                        changed
                    });
                    if auto_close_on_game_exit && self.has_started_once.load(Ordering::Relaxed) && !running {
                        log::info!("auto-closing on game exit");
                        cancel.cancel();
                        return;
                    }
                }
            }
        }
    }
}

impl Default for GameProcessWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn launch_args_carries_rcon_credentials_and_fixed_flags() {
        let args = launch_args("hunter2", 21212, Path::new("/steam"), Some(SteamId(76561197960265851)));
        assert!(args.windows(2).any(|w| w[0] == "+rcon_password" && w[1] == "hunter2"));
        assert!(args.windows(2).any(|w| w[0] == "+hostport" && w[1] == "21212"));
        assert!(args.contains(&"-usercon".to_string()));
        assert!(args.contains(&"+net_start".to_string()));
    }

    #[tokio::test]
    async fn quit_game_refuses_when_not_running() {
        let creds = crate::config::RconCredentials {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: String::new(),
        };
        let rcon = RconConnection::new(creds);
        let result = quit_game(&rcon, false).await;
        assert!(matches!(result, Err(PolicyError::NotMarked)));
    }
}
