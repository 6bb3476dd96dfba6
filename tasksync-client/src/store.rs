use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use tasksync_core::{
    normalize_description, normalize_tags, validate_patch, validate_title, NewTaskRecord, OwnerId,
    RemoteId, StatusFilter, TagPolicy, TaskDraft, TaskPatch,
};

use crate::errors::StoreError;
use crate::events::{EventBus, StoreEvent};
use crate::remote::{RemoteCollection, SnapshotEvent, Subscription};
use crate::state::{Lifecycle, MutationTarget, StoreState, Task, TaskId};

const EVENT_CAPACITY: usize = 64;

/// Store construction knobs.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub tag_policy: TagPolicy,
}

/// Single source of truth for the signed-in owner's task collection.
///
/// The store owns an in-memory snapshot of the remote collection, applies
/// caller mutations optimistically before the corresponding remote write
/// confirms, and rolls them back when it does not. Every snapshot delivered
/// by the live subscription replaces the collection wholesale, so optimistic
/// and confirmed state can never stay diverged for longer than one
/// subscription round-trip.
pub struct TaskStore<R: RemoteCollection> {
    remote: Arc<R>,
    state: Arc<Mutex<StoreState>>,
    events: Arc<EventBus>,
    config: StoreConfig,
    driver: JoinHandle<()>,
}

fn lock_state(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R: RemoteCollection> TaskStore<R> {
    /// Builds the store and spawns its subscription driver. Must be called
    /// from within a tokio runtime. The driver follows the identity
    /// channel: it subscribes when an owner appears, re-subscribes when the
    /// owner changes, and tears everything down on sign-out.
    pub fn new(
        remote: Arc<R>,
        identity: watch::Receiver<Option<OwnerId>>,
        config: StoreConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(StoreState::new()));
        let events = Arc::new(EventBus::new(EVENT_CAPACITY));
        let driver = tokio::spawn(drive_subscription(
            remote.clone(),
            identity,
            state.clone(),
            events.clone(),
        ));

        Self {
            remote,
            state,
            events,
            config,
            driver,
        }
    }

    /// Validates the draft, inserts it optimistically at the head of the
    /// collection, then issues the durable create. On success the pending
    /// id is swapped for the remote-assigned one, which is returned; on
    /// failure the optimistic entry is removed again and the error slot set.
    pub async fn add(&self, draft: TaskDraft) -> Result<RemoteId, StoreError> {
        let title = validate_title(&draft.title)?;
        let tags = normalize_tags(&draft.tags, &self.config.tag_policy)?;
        let description = normalize_description(draft.description.as_deref());

        let local_id = Uuid::new_v4();
        let owner = {
            let mut st = lock_state(&self.state);
            let owner = st.owner.clone().ok_or(StoreError::SignedOut)?;
            // Locally-stamped timestamp; the next snapshot carries the
            // server-assigned one.
            st.insert_optimistic(Task {
                id: TaskId::Pending(local_id),
                owner_id: owner.clone(),
                title: title.clone(),
                description: description.clone(),
                completed: false,
                tags: tags.clone(),
                created_at: Utc::now(),
            });
            owner
        };
        self.events.emit(StoreEvent::TaskAdded {
            id: TaskId::Pending(local_id),
        });
        tracing::debug!(owner = %owner, %local_id, "optimistic insert, issuing create");

        let record = NewTaskRecord {
            owner_id: owner,
            title,
            description,
            completed: false,
            tags,
        };
        match self.remote.create(record).await {
            Ok(remote_id) => {
                let confirmed = {
                    let mut st = lock_state(&self.state);
                    let confirmed = st.confirm(local_id, remote_id.clone());
                    st.clear_error();
                    confirmed
                };
                if confirmed {
                    self.events.emit(StoreEvent::TaskUpdated {
                        id: TaskId::Confirmed(remote_id.clone()),
                    });
                } else {
                    tracing::debug!(%local_id, "optimistic entry already superseded by a snapshot");
                }
                Ok(remote_id)
            }
            Err(e) => {
                tracing::warn!(%local_id, error = %e, "create failed, rolling back optimistic insert");
                let message = format!("could not add the task: {e}");
                {
                    let mut st = lock_state(&self.state);
                    st.remove_by_id(&TaskId::Pending(local_id));
                    st.set_error(&message);
                }
                self.events.emit(StoreEvent::SyncError { message });
                Err(e.into())
            }
        }
    }

    /// Flips `completed` optimistically and issues the remote update,
    /// reverting the flip if the write fails. An unknown id only surfaces
    /// through the error slot, not the return value.
    pub async fn toggle_completion(&self, id: &TaskId) -> Result<(), StoreError> {
        let (remote_id, next) = {
            let mut st = lock_state(&self.state);
            match st.target(id) {
                MutationTarget::Missing => {
                    tracing::warn!(%id, "toggle requested for a task the store does not hold");
                    let message = format!("no task with id {id} in the local collection");
                    st.set_error(&message);
                    drop(st);
                    self.events.emit(StoreEvent::SyncError { message });
                    return Ok(());
                }
                MutationTarget::Pending => {
                    return Err(StoreError::UnconfirmedTask(id.to_string()));
                }
                MutationTarget::Confirmed(remote_id) => {
                    let Some(next) = st.flip_completed(id) else {
                        return Ok(());
                    };
                    (remote_id, next)
                }
            }
        };

        match self
            .remote
            .update(remote_id, TaskPatch::completion(next))
            .await
        {
            Ok(()) => {
                lock_state(&self.state).clear_error();
                self.events.emit(StoreEvent::TaskUpdated { id: id.clone() });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "toggle failed, reverting");
                let message = format!("could not change the task state: {e}");
                {
                    let mut st = lock_state(&self.state);
                    st.set_completed(id, !next);
                    st.set_error(&message);
                }
                self.events.emit(StoreEvent::SyncError { message });
                Err(e.into())
            }
        }
    }

    /// Applies a partial edit optimistically and issues the remote update,
    /// restoring the prior field values if the write fails.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        let patch = validate_patch(&patch, &self.config.tag_policy)?;

        let (remote_id, prior) = {
            let mut st = lock_state(&self.state);
            let remote_id = match st.target(id) {
                MutationTarget::Missing => return Err(StoreError::UnknownTask(id.to_string())),
                MutationTarget::Pending => {
                    return Err(StoreError::UnconfirmedTask(id.to_string()))
                }
                MutationTarget::Confirmed(remote_id) => remote_id,
            };
            let Some(prior) = st.apply_patch_to(id, &patch) else {
                return Err(StoreError::UnknownTask(id.to_string()));
            };
            (remote_id, prior)
        };

        match self.remote.update(remote_id, patch).await {
            Ok(()) => {
                lock_state(&self.state).clear_error();
                self.events.emit(StoreEvent::TaskUpdated { id: id.clone() });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "update failed, restoring prior task");
                let message = format!("could not update the task: {e}");
                {
                    let mut st = lock_state(&self.state);
                    st.replace(id, prior);
                    st.set_error(&message);
                }
                self.events.emit(StoreEvent::SyncError { message });
                Err(e.into())
            }
        }
    }

    /// Removes the task optimistically and issues the remote delete,
    /// re-inserting the entry at its prior position if the write fails.
    pub async fn remove(&self, id: &TaskId) -> Result<(), StoreError> {
        let (remote_id, index, removed) = {
            let mut st = lock_state(&self.state);
            let remote_id = match st.target(id) {
                MutationTarget::Missing => return Err(StoreError::UnknownTask(id.to_string())),
                MutationTarget::Pending => {
                    return Err(StoreError::UnconfirmedTask(id.to_string()))
                }
                MutationTarget::Confirmed(remote_id) => remote_id,
            };
            let Some((index, removed)) = st.remove_by_id(id) else {
                return Err(StoreError::UnknownTask(id.to_string()));
            };
            (remote_id, index, removed)
        };
        self.events.emit(StoreEvent::TaskRemoved { id: id.clone() });

        match self.remote.delete(remote_id).await {
            Ok(()) => {
                lock_state(&self.state).clear_error();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "delete failed, restoring task at its prior position");
                let message = format!("could not delete the task: {e}");
                {
                    let mut st = lock_state(&self.state);
                    st.restore_at(index, removed);
                    st.set_error(&message);
                }
                self.events.emit(StoreEvent::SyncError { message });
                Err(e.into())
            }
        }
    }

    /// Local state only; no remote interaction.
    pub fn set_status_filter(&self, filter: StatusFilter) {
        lock_state(&self.state).status_filter = filter;
    }

    /// Local state only; the tag goes through the same normalization as
    /// stored tags so it can actually match them.
    pub fn set_tag_filter(&self, tag: Option<String>) {
        let tag = tag.and_then(|t| {
            let t = t.trim();
            if t.is_empty() {
                return None;
            }
            Some(if self.config.tag_policy.lowercase {
                t.to_lowercase()
            } else {
                t.to_string()
            })
        });
        lock_state(&self.state).tag_filter = tag;
    }

    /// The collection as the current filters see it.
    pub fn derived_view(&self) -> Vec<Task> {
        lock_state(&self.state).derived_view()
    }

    /// Tags available for filtering: the deduplicated union across the
    /// unfiltered collection, in first-seen order.
    pub fn available_tags(&self) -> Vec<String> {
        lock_state(&self.state).available_tags()
    }

    pub fn status_filter(&self) -> StatusFilter {
        lock_state(&self.state).status_filter
    }

    pub fn tag_filter(&self) -> Option<String> {
        lock_state(&self.state).tag_filter.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        lock_state(&self.state).lifecycle
    }

    /// True while the first snapshot for the current owner is still on its
    /// way.
    pub fn is_loading(&self) -> bool {
        self.lifecycle() == Lifecycle::Subscribing
    }

    /// The error slot: at most one current human-readable message. A newer
    /// failure supersedes it, a successful mutation clears it.
    pub fn last_error(&self) -> Option<String> {
        lock_state(&self.state).error.clone()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        lock_state(&self.state).owner.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl<R: RemoteCollection> Drop for TaskStore<R> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum PumpEnd {
    OwnerChanged,
    IdentityClosed,
    Lost(String),
}

/// Follows the identity channel and pumps the live subscription into the
/// store state. One instance per store, aborted when the store drops.
async fn drive_subscription<R: RemoteCollection>(
    remote: Arc<R>,
    mut identity: watch::Receiver<Option<OwnerId>>,
    state: Arc<Mutex<StoreState>>,
    events: Arc<EventBus>,
) {
    loop {
        let owner = identity.borrow_and_update().clone();
        let Some(owner) = owner else {
            let was_signed_in = {
                let mut st = lock_state(&state);
                let was = st.lifecycle != Lifecycle::Unauthenticated;
                st.signed_out();
                was
            };
            if was_signed_in {
                tracing::info!("owner signed out, subscription torn down");
                events.emit(StoreEvent::SignedOut);
            }
            if identity.changed().await.is_err() {
                return;
            }
            continue;
        };

        tracing::info!(owner = %owner, "establishing task subscription");
        lock_state(&state).begin_subscription(owner.clone());

        let mut subscription = match remote.subscribe(owner.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(owner = %owner, error = %e, "subscription could not be established");
                let message = e.to_string();
                lock_state(&state).subscription_lost(&message);
                events.emit(StoreEvent::SubscriptionFailed { message });
                if identity.changed().await.is_err() {
                    return;
                }
                continue;
            }
        };

        let end = pump(&mut identity, &mut subscription, &owner, &state, &events).await;
        drop(subscription);

        match end {
            PumpEnd::OwnerChanged => continue,
            PumpEnd::IdentityClosed => return,
            PumpEnd::Lost(message) => {
                tracing::error!(owner = %owner, error = %message, "subscription lost");
                lock_state(&state).subscription_lost(&message);
                events.emit(StoreEvent::SubscriptionFailed { message });
                // Dead until a new subscription; only an identity change
                // starts one.
                if identity.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn pump(
    identity: &mut watch::Receiver<Option<OwnerId>>,
    subscription: &mut Subscription,
    owner: &OwnerId,
    state: &Arc<Mutex<StoreState>>,
    events: &Arc<EventBus>,
) -> PumpEnd {
    loop {
        tokio::select! {
            changed = identity.changed() => {
                return match changed {
                    Ok(()) => PumpEnd::OwnerChanged,
                    Err(_) => PumpEnd::IdentityClosed,
                };
            }
            event = subscription.recv() => {
                match event {
                    Some(SnapshotEvent::Snapshot(records)) => {
                        let count = lock_state(state).apply_snapshot(records);
                        tracing::debug!(owner = %owner, count, "snapshot applied");
                        events.emit(StoreEvent::SnapshotApplied { count });
                    }
                    Some(SnapshotEvent::Lost(message)) => return PumpEnd::Lost(message),
                    None => return PumpEnd::Lost("subscription channel closed".to_string()),
                }
            }
        }
    }
}
