// SPDX-License-Identifier: LGPL-3.0-or-later

use super::connection::RconConnection;
use crate::ingest::{EventBroadcaster, LogParser};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Every [`POLL_INTERVAL`], while the game process is running, runs
/// `status;tf_lobby_debug` and feeds each response line back through a
/// [`LogParser`] onto the broadcaster — exactly as if LogSource had produced
/// it (spec.md §4.9). This is the only way roster/ping/team data is learned
/// when the passive console log goes quiet between connects.
pub struct StatusUpdater {
    rcon: Arc<RconConnection>,
    broadcaster: Arc<EventBroadcaster>,
    game_running: watch::Receiver<bool>,
}

impl StatusUpdater {
    pub fn new(rcon: Arc<RconConnection>, broadcaster: Arc<EventBroadcaster>, game_running: watch::Receiver<bool>) -> Self {
        Self {
            rcon,
            broadcaster,
            game_running,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let parser = LogParser::new();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if !*self.game_running.borrow_and_update() {
                        continue;
                    }
                    self.poll_once(&parser).await;
                }
            }
        }
    }

    async fn poll_once(&self, parser: &LogParser) {
        match self.rcon.exec("status;tf_lobby_debug").await {
            Ok(response) => {
                for line in response.lines() {
                    if let Some(event) = parser.parse(line) {
                        self.broadcaster.publish(event);
                    }
                }
            }
            Err(e) => log::warn!("rcon status poll failed: {e}"),
        }
    }
}
