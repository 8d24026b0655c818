//! The alert store boundary.
//!
//! An [`AlertStore`] is a replicated, append-only collection of alerts with
//! server-assigned timestamps and push-based subscription. Every push is a
//! full [`Snapshot`] of the collection ordered by `created_at` descending;
//! consumers never receive diffs.
//!
//! [`SqliteAlertStore`] is the bundled implementation.

pub mod migrations;
pub mod schema;
mod sqlite;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::alert::{Alert, AlertId, NewAlert};
use crate::error::Result;
use crate::identity::SessionToken;

pub use sqlite::{SqliteAlertStore, StoreStats};

/// A full, ordered materialization of the alert collection.
pub type Snapshot = Vec<Alert>;

/// Trait for alert store backends.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// The name of this backend (for logging).
    fn name(&self) -> &'static str;

    /// Authorize subsequent operations with an anonymous session.
    ///
    /// Backends that do not check sessions accept and ignore the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the session.
    async fn attach_session(&self, _session: &SessionToken) -> Result<()> {
        Ok(())
    }

    /// Open a live subscription to the collection, ordered by `created_at`
    /// descending.
    ///
    /// The current snapshot is delivered first, followed by a fresh snapshot
    /// after every change. The stream ends only when the subscription is
    /// dropped or the backend goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established, e.g.
    /// because no session is attached yet.
    async fn subscribe_ordered(&self) -> Result<Subscription>;

    /// Append a new alert. The backend assigns the id and `created_at`.
    ///
    /// Resolves once the write is durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is refused or fails.
    async fn append(&self, record: NewAlert) -> Result<AlertId>;
}

/// Producer half of a [`Subscription`], held by the store.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::UnboundedSender<Snapshot>,
}

impl SnapshotSender {
    /// Push a snapshot. Returns `false` once the subscriber has gone away.
    pub fn send(&self, snapshot: Snapshot) -> bool {
        self.tx.send(snapshot).is_ok()
    }

    /// The subscriber has been dropped or cancelled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A cancellable stream of full snapshots.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) releases
/// it; the store notices on its next push.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    /// Create a connected sender/subscription pair.
    #[must_use]
    pub fn channel() -> (SnapshotSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SnapshotSender { tx }, Self { rx })
    }

    /// Wait for the next snapshot. `None` means the store side has closed.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Release the subscription.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_subscription_delivers_in_order() {
        let (tx, mut sub) = Subscription::channel();
        assert!(tx.send(Vec::new()));
        assert!(tx.send(Vec::new()));
        drop(tx);

        assert_eq!(sub.recv().await, Some(Vec::new()));
        assert_eq!(sub.next().await, Some(Vec::new()));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_closes_sender() {
        let (tx, sub) = Subscription::channel();
        assert!(!tx.is_closed());

        sub.cancel();
        assert!(tx.is_closed());
        assert!(!tx.send(Vec::new()));
    }

    #[tokio::test]
    async fn test_drop_closes_sender() {
        let (tx, sub) = Subscription::channel();
        drop(sub);
        assert!(tx.is_closed());
    }
}
