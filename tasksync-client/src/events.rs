use tokio::sync::broadcast;

use crate::state::TaskId;

/// Notifications the store fans out so embedders can re-render without
/// polling `derived_view()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TaskAdded { id: TaskId },
    TaskUpdated { id: TaskId },
    TaskRemoved { id: TaskId },
    SnapshotApplied { count: usize },
    SubscriptionFailed { message: String },
    SyncError { message: String },
    SignedOut,
}

/// Broadcast fan-out for store events. Emission never blocks and never
/// fails: receivers that lag past the channel capacity miss events, and an
/// absent audience is fine.
pub(crate) struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}
