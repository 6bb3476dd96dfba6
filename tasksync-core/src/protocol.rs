use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NewTaskRecord, OwnerId, RemoteId, TaskPatch, TaskRecord};

/// Frames sent by the client over the WebSocket transport. Writes carry a
/// `request_id` so confirmations can be correlated out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        owner_id: OwnerId,
    },
    Unsubscribe,

    CreateTask {
        request_id: Uuid,
        record: NewTaskRecord,
    },
    UpdateTask {
        request_id: Uuid,
        task_id: RemoteId,
        patch: TaskPatch,
    },
    DeleteTask {
        request_id: Uuid,
        task_id: RemoteId,
    },

    // Heartbeat
    Ping,
}

/// Frames pushed by the server. A `Snapshot` is the complete, authoritative
/// listing of the subscribed owner's tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Snapshot {
        tasks: Vec<TaskRecord>,
    },

    TaskCreated {
        request_id: Uuid,
        task_id: Option<RemoteId>,
        success: bool,
        error: Option<String>,
    },
    TaskUpdated {
        request_id: Uuid,
        success: bool,
        error: Option<String>,
    },
    TaskDeleted {
        request_id: Uuid,
        success: bool,
        error: Option<String>,
    },

    SubscriptionError {
        message: String,
    },

    // Heartbeat
    Pong,
}
