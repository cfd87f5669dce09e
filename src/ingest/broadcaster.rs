// SPDX-License-Identifier: LGPL-3.0-or-later

use super::parser::LogEvent;
use tokio::sync::broadcast;

/// Default per-consumer queue depth. A consumer that falls this far behind
/// the fastest one starts losing the oldest events it hasn't read yet.
const DEFAULT_CAPACITY: usize = 1024;

/// Fans a single stream of classified log events out to any number of
/// consumers (GameState, chat recorder, RCON status updater, future UI).
/// Bounded per spec.md §4.1/§5 so one slow consumer can't back-pressure the
/// ingest pipeline; a slow subscriber instead silently drops its oldest
/// unread events and the drop count is logged.
pub struct EventBroadcaster {
    tx: broadcast::Sender<LogEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    pub fn publish(&self, event: LogEvent) {
        // No receivers is the normal state before any subscriber has attached.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// A single consumer's view of the event stream, with its own lag counter.
pub struct EventSubscription {
    rx: broadcast::Receiver<LogEvent>,
    dropped: u64,
}

impl EventSubscription {
    /// Returns the next event, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    log::warn!("event subscriber lagged, dropped {n} events ({} total)", self.dropped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::SteamId;
    use chrono::Utc;

    fn sample_event() -> LogEvent {
        LogEvent::Connect {
            timestamp: Utc::now(),
            name: "Knyfe".to_string(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe();
        broadcaster.publish(sample_event());
        assert!(sub.recv().await.is_some());
        let _ = SteamId::INVALID;
    }

    #[tokio::test]
    async fn lagging_subscriber_reports_drops_instead_of_blocking_publisher() {
        let broadcaster = EventBroadcaster::with_capacity(2);
        let mut sub = broadcaster.subscribe();
        for _ in 0..5 {
            broadcaster.publish(sample_event());
        }
        let event = sub.recv().await;
        assert!(event.is_some());
        assert!(sub.dropped_count() > 0);
    }

    #[tokio::test]
    async fn recv_returns_none_after_broadcaster_dropped() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe();
        drop(broadcaster);
        assert!(sub.recv().await.is_none());
    }
}
