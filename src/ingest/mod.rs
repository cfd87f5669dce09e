// SPDX-License-Identifier: LGPL-3.0-or-later

//! Turns raw console lines into classified [`LogEvent`]s and fans them out
//! to consumers. See spec.md §4.1/§4.2 for the ingest contract.

pub mod broadcaster;
pub mod parser;
pub mod source;

pub use broadcaster::{EventBroadcaster, EventSubscription};
pub use parser::{LogEvent, LogParser};
pub use source::{FileTail, LogSource, UdpSource};

use tokio::sync::{mpsc, oneshot};

/// Wires a [`LogSource`] through a [`LogParser`] into an [`EventBroadcaster`].
/// Runs until `cancel` resolves or the source exits on its own (e.g. the
/// underlying file vanished).
pub async fn run_ingest(
    source: Box<dyn LogSource>,
    broadcaster: &EventBroadcaster,
    cancel: oneshot::Receiver<()>,
) {
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let source_task = tokio::spawn(source.run(tx, cancel));

    let parser = LogParser::new();
    while let Some(line) = rx.recv().await {
        if let Some(event) = parser.parse(&line) {
            broadcaster.publish(event);
        }
    }

    let _ = source_task.await;
}
