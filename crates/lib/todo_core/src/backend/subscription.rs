//! Cancellable snapshot subscriptions.
//!
//! A store hands the client a [`Subscription`] and keeps the paired
//! [`SnapshotSink`]. Snapshots pushed into the sink are delivered in order;
//! once the client cancels (or drops) its handle the sink reports closed and
//! further pushes are discarded.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::models::Snapshot;

/// Create a connected sink/handle pair.
pub fn channel() -> (SnapshotSink, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let id = crate::uuid::uuidv7();
    (
        SnapshotSink {
            id,
            tx,
            cancel: cancel.clone(),
        },
        Subscription { id, rx, cancel },
    )
}

/// Client side of a subscription: a lazy stream of snapshots.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Snapshot>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop delivery. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(subscription = %self.id, "cancelling subscription");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the next snapshot. `None` once cancelled or the store hung up.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.next().await
    }

    /// Take an already delivered snapshot without waiting.
    pub fn try_next_snapshot(&mut self) -> Option<Snapshot> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Store side of a subscription.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    id: Uuid,
    tx: mpsc::UnboundedSender<Snapshot>,
    cancel: CancellationToken,
}

impl SnapshotSink {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Deliver a snapshot. Returns `false` when the subscriber is gone.
    pub fn push(&self, snapshot: Snapshot) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(snapshot).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the subscriber cancels.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}
