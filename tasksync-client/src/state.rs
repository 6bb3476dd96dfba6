use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tasksync_core::{OwnerId, RemoteId, StatusFilter, TaskPatch, TaskRecord};

/// Task identity as the store tracks it. An optimistic insert starts out
/// `Pending` under a locally-generated id and is swapped to `Confirmed` in
/// place once the remote store assigns the real one; the pending id is
/// never exposed again after that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskId {
    Pending(Uuid),
    Confirmed(RemoteId),
}

impl TaskId {
    pub fn remote(&self) -> Option<&RemoteId> {
        match self {
            TaskId::Confirmed(id) => Some(id),
            TaskId::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TaskId::Pending(_))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Pending(id) => write!(f, "pending:{id}"),
            TaskId::Confirmed(id) => f.write_str(id.as_str()),
        }
    }
}

/// A store entry as handed to the view layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub(crate) fn from_record(record: TaskRecord) -> Self {
        Self {
            id: TaskId::Confirmed(record.id),
            owner_id: record.owner_id,
            title: record.title,
            description: record.description,
            completed: record.completed,
            tags: record.tags,
            created_at: record.created_at,
        }
    }
}

/// Subscription lifecycle of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unauthenticated,
    Subscribing,
    Live,
    Error,
}

/// What a mutation is aimed at, resolved against the local collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MutationTarget {
    Confirmed(RemoteId),
    Pending,
    Missing,
}

/// Everything the store knows, behind one lock. All transitions are
/// synchronous functions here so they can be exercised without a runtime.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub owner: Option<OwnerId>,
    pub lifecycle: Lifecycle,
    pub entries: Vec<Task>,
    pub status_filter: StatusFilter,
    pub tag_filter: Option<String>,
    pub error: Option<String>,
}

impl StoreState {
    pub fn new() -> Self {
        Self {
            owner: None,
            lifecycle: Lifecycle::Unauthenticated,
            entries: Vec::new(),
            status_filter: StatusFilter::default(),
            tag_filter: None,
            error: None,
        }
    }

    /// A new owner is being subscribed; any previous owner's collection is
    /// gone immediately.
    pub fn begin_subscription(&mut self, owner: OwnerId) {
        self.owner = Some(owner);
        self.lifecycle = Lifecycle::Subscribing;
        self.entries.clear();
        self.error = None;
    }

    pub fn signed_out(&mut self) {
        self.owner = None;
        self.lifecycle = Lifecycle::Unauthenticated;
        self.entries.clear();
        self.error = None;
    }

    /// Replaces the collection wholesale with the authoritative snapshot,
    /// re-deriving creation-time-descending order. Records for any other
    /// owner are discarded. Unreconciled optimistic entries are superseded.
    pub fn apply_snapshot(&mut self, records: Vec<TaskRecord>) -> usize {
        let Some(owner) = self.owner.clone() else {
            return 0;
        };

        let mut entries: Vec<Task> = records
            .into_iter()
            .filter(|record| {
                if record.owner_id == owner {
                    true
                } else {
                    tracing::warn!(
                        task = %record.id,
                        owner = %record.owner_id,
                        "snapshot carried a foreign-owner record, dropping it"
                    );
                    false
                }
            })
            .map(Task::from_record)
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let count = entries.len();
        self.entries = entries;
        self.lifecycle = Lifecycle::Live;
        count
    }

    pub fn subscription_lost(&mut self, message: &str) {
        self.lifecycle = Lifecycle::Error;
        self.error = Some(message.to_string());
    }

    /// Head insert: the caller sees the new task with zero latency.
    pub fn insert_optimistic(&mut self, task: Task) {
        self.entries.insert(0, task);
    }

    /// Swaps a pending id for the remote-assigned one, in place. Returns
    /// false when a snapshot already superseded the entry.
    pub fn confirm(&mut self, local_id: Uuid, remote_id: RemoteId) -> bool {
        match self.position(&TaskId::Pending(local_id)) {
            Some(index) => {
                self.entries[index].id = TaskId::Confirmed(remote_id);
                true
            }
            None => false,
        }
    }

    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.entries.iter().position(|task| &task.id == id)
    }

    pub fn target(&self, id: &TaskId) -> MutationTarget {
        match self.position(id) {
            None => MutationTarget::Missing,
            Some(index) => match self.entries[index].id.remote() {
                Some(remote_id) => MutationTarget::Confirmed(remote_id.clone()),
                None => MutationTarget::Pending,
            },
        }
    }

    /// Flips `completed` and returns the new value, if the task is held.
    pub fn flip_completed(&mut self, id: &TaskId) -> Option<bool> {
        let index = self.position(id)?;
        let task = &mut self.entries[index];
        task.completed = !task.completed;
        Some(task.completed)
    }

    pub fn set_completed(&mut self, id: &TaskId, completed: bool) {
        if let Some(index) = self.position(id) {
            self.entries[index].completed = completed;
        }
    }

    /// Applies a partial edit and returns a clone of the prior entry for
    /// rollback. `None` when the task is not held.
    pub fn apply_patch_to(&mut self, id: &TaskId, patch: &TaskPatch) -> Option<Task> {
        let index = self.position(id)?;
        let task = &mut self.entries[index];
        let prior = task.clone();

        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(description) = &patch.description {
            task.description = if description.is_empty() {
                None
            } else {
                Some(description.clone())
            };
        }
        if let Some(tags) = &patch.tags {
            task.tags = tags.clone();
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }

        Some(prior)
    }

    /// Overwrites the entry with the given id; rollback path for `update`.
    pub fn replace(&mut self, id: &TaskId, prior: Task) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries[index] = prior;
                true
            }
            None => false,
        }
    }

    pub fn remove_by_id(&mut self, id: &TaskId) -> Option<(usize, Task)> {
        let index = self.position(id)?;
        Some((index, self.entries.remove(index)))
    }

    /// Re-inserts a removed entry at its prior position, clamped to the
    /// current length; rollback path for `remove`.
    pub fn restore_at(&mut self, index: usize, task: Task) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, task);
    }

    pub fn set_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Current filters applied to the collection.
    pub fn derived_view(&self) -> Vec<Task> {
        self.entries
            .iter()
            .filter(|task| self.status_filter.matches(task.completed))
            .filter(|task| match &self.tag_filter {
                Some(tag) => task.tags.iter().any(|t| t == tag),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Deduplicated union of tags across the unfiltered collection, in
    /// first-seen order.
    pub fn available_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for task in &self.entries {
            for tag in &task.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }
}
