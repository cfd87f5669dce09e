// SPDX-License-Identifier: LGPL-3.0-or-later

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Background tasks are given at most this long to drain their current item
/// and exit once shutdown is requested (spec.md §5); anything still running
/// after that is abandoned rather than awaited.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);

/// A single cancellation token tree rooted at process start (spec.md §5).
/// Every long-lived task holds a [`CancellationToken::child_token`] of the
/// root so cancellation is observed at every suspension point without any
/// task needing a back-reference to its siblings.
#[derive(Clone)]
pub struct Shutdown {
    root: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// A child token for one subsystem task. Cancelling the root cancels
    /// every child; cancelling a child never affects the root or siblings.
    pub fn child(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Signals every subsystem to begin shutting down.
    pub fn trigger(&self) {
        self.root.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Resolves once [`Shutdown::trigger`] has been called.
    pub async fn triggered(&self) {
        self.root.cancelled().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn children_observe_root_cancellation() {
        let shutdown = Shutdown::new();
        let child = shutdown.child();
        assert!(!child.is_cancelled());
        shutdown.trigger();
        assert!(child.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn triggered_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.triggered().await;
        });
        shutdown.trigger();
        handle.await.unwrap();
    }
}
