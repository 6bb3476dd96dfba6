use thiserror::Error;

use crate::models::RemoteId;

/// Caller input violated a local invariant. Resolved synchronously; the
/// remote service never sees the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("tags must not be empty")]
    EmptyTag,

    #[error("tag `{tag}` is longer than {max} characters")]
    TagTooLong { tag: String, max: usize },

    #[error("update contains no fields")]
    EmptyPatch,
}

/// A remote create/update/delete failed. Reported asynchronously and
/// always accompanied by rollback of the optimistic change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteWriteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no task with id {0} in the remote collection")]
    NotFound(RemoteId),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("remote store rejected the write: {0}")]
    Rejected(String),

    #[error("timed out waiting for write confirmation")]
    Timeout,
}

/// The live subscription failed. Terminal for the current subscription;
/// recovery requires establishing a new one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("failed to establish subscription: {0}")]
    Connect(String),

    #[error("subscription lost: {0}")]
    Lost(String),
}
