// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::model::UserMessage;
use crate::store::PlayerStore;
use std::sync::Arc;
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 256;

/// Takes `UserMessage`s off [`GameState`](super::game_state::GameState)'s hot
/// path and persists them asynchronously (spec.md §4.4's chat row: "append
/// to in-memory messages; persist asynchronously"). A full queue is the only
/// way this component applies backpressure, and it never blocks the caller.
pub struct ChatRecorder {
    tx: mpsc::Sender<UserMessage>,
}

impl ChatRecorder {
    /// Spawns the persistence loop and returns a handle to it. The loop
    /// exits once every [`ChatRecorder`] clone referencing `tx` is dropped.
    pub fn spawn(store: Arc<dyn PlayerStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<UserMessage>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = store.save_message(message.steam_id, &message.message).await {
                    log::warn!("failed to persist chat message: {e}");
                }
            }
        });
        Self { tx }
    }

    /// Queues `message` for persistence. Drops it (with a warning) rather
    /// than blocking if the queue is saturated — chat history is best-effort,
    /// never on the critical path of event processing.
    pub fn record(&self, message: UserMessage) {
        if self.tx.try_send(message).is_err() {
            log::warn!("chat recorder queue full, dropping message");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::SteamId;
    use crate::store::sqlite::SqliteStore;
    use chrono::Utc;

    #[tokio::test]
    async fn queued_message_is_persisted() {
        let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let sid = SteamId(76561197960265851);
        store.load_or_create_player(sid, "Knyfe").await.unwrap();

        let recorder = ChatRecorder::spawn(store.clone());
        recorder.record(UserMessage {
            message_id: 0,
            steam_id: sid,
            user_id: 7,
            name: "Knyfe".to_string(),
            team: false,
            dead: false,
            message: "gg".to_string(),
            created_at: Utc::now(),
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let messages = store.fetch_messages(sid).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message, "gg");
    }
}
