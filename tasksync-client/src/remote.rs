use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tasksync_core::{
    NewTaskRecord, OwnerId, RemoteId, RemoteWriteError, SubscriptionError, TaskPatch, TaskRecord,
};

/// One delivery on the live subscription channel.
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    /// Complete, authoritative listing of the subscribed owner's tasks.
    Snapshot(Vec<TaskRecord>),
    /// The subscription failed; no further snapshots will arrive on this
    /// channel.
    Lost(String),
}

/// Runs its cancel action when dropped.
pub struct SubscriptionGuard(Option<Box<dyn FnOnce() + Send>>);

impl SubscriptionGuard {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    pub fn noop() -> Self {
        Self(None)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubscriptionGuard")
            .field(&self.0.is_some())
            .finish()
    }
}

/// Handle on an established live query. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<SnapshotEvent>,
    _guard: SubscriptionGuard,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<SnapshotEvent>, guard: SubscriptionGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// Next event, or `None` once the remote side closed the channel.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }
}

/// The remote document collection as the store consumes it. One
/// subscription per owner at a time; writes are independent requests that
/// either confirm or fail, never retried here.
#[async_trait]
pub trait RemoteCollection: Send + Sync + 'static {
    /// Establishes a live query over the owner's tasks. The first event on
    /// the returned subscription is the current snapshot.
    async fn subscribe(&self, owner: OwnerId) -> Result<Subscription, SubscriptionError>;

    /// Durably creates a task; the remote assigns its id and creation
    /// timestamp.
    async fn create(&self, record: NewTaskRecord) -> Result<RemoteId, RemoteWriteError>;

    /// Applies a partial edit to an existing task.
    async fn update(&self, id: RemoteId, patch: TaskPatch) -> Result<(), RemoteWriteError>;

    /// Deletes a task.
    async fn delete(&self, id: RemoteId) -> Result<(), RemoteWriteError>;
}
