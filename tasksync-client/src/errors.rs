use thiserror::Error;

use tasksync_core::{RemoteWriteError, SubscriptionError, ValidationError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteWriteError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("no signed-in owner")]
    SignedOut,

    #[error("no task with id {0} in the local collection")]
    UnknownTask(String),

    #[error("task {0} has not been confirmed by the remote store yet")]
    UnconfirmedTask(String),
}
