use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use tasksync_core::{
    ClientFrame, NewTaskRecord, OwnerId, RemoteId, RemoteWriteError, ServerFrame,
    SubscriptionError, TaskPatch,
};

use crate::remote::{RemoteCollection, SnapshotEvent, Subscription, SubscriptionGuard};

const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);
const OUTGOING_BUFFER: usize = 100;
const SNAPSHOT_BUFFER: usize = 32;

type WriteOutcome = Result<Option<RemoteId>, RemoteWriteError>;

#[derive(Default)]
struct Router {
    pending: HashMap<Uuid, oneshot::Sender<WriteOutcome>>,
    snapshots: Option<mpsc::Sender<SnapshotEvent>>,
}

/// WebSocket-backed remote collection. One connection carries the live
/// subscription and all writes; confirmations are correlated by request id.
/// Failed writes are never retried here, and a lost connection is terminal:
/// pending writes fail and the subscriber receives a `Lost` event.
pub struct WsRemote {
    tx: mpsc::Sender<ClientFrame>,
    router: Arc<Mutex<Router>>,
    confirm_timeout: Duration,
}

impl WsRemote {
    pub async fn connect(server_url: &str) -> Result<Self, SubscriptionError> {
        Self::connect_with_timeout(server_url, DEFAULT_CONFIRM_TIMEOUT).await
    }

    /// Connects with bounded exponential backoff; `confirm_timeout` bounds
    /// the wait for each individual write confirmation.
    pub async fn connect_with_timeout(
        server_url: &str,
        confirm_timeout: Duration,
    ) -> Result<Self, SubscriptionError> {
        let ws_stream = Self::connect_with_retry(server_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (tx_send, mut rx_send) = mpsc::channel::<ClientFrame>(OUTGOING_BUFFER);
        let router = Arc::new(Mutex::new(Router::default()));

        // Writer task
        tokio::spawn(async move {
            while let Some(frame) = rx_send.recv().await {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode outgoing frame");
                        continue;
                    }
                };
                if write.send(Message::Text(json)).await.is_err() {
                    tracing::warn!("websocket writer closed");
                    break;
                }
            }
        });

        // Reader task
        let reader_router = router.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => Self::route_frame(&reader_router, frame).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "ignoring malformed server frame");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket read failed");
                        break;
                    }
                    _ => {}
                }
            }
            Self::connection_closed(&reader_router).await;
        });

        Ok(Self {
            tx: tx_send,
            router,
            confirm_timeout,
        })
    }

    async fn connect_with_retry(
        server_url: &str,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        SubscriptionError,
    > {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(2000),
            max_elapsed_time: Some(Duration::from_secs(10)),
            randomization_factor: 0.1,
            ..Default::default()
        };

        let server_url = server_url.to_string();
        let operation = || async {
            match connect_async(&server_url).await {
                Ok((ws_stream, _)) => Ok(ws_stream),
                Err(e) => {
                    tracing::debug!(url = %server_url, error = %e, "connection attempt failed");
                    Err(backoff::Error::transient(e))
                }
            }
        };

        retry(backoff, operation)
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))
    }

    async fn route_frame(router: &Arc<Mutex<Router>>, frame: ServerFrame) {
        match frame {
            ServerFrame::Snapshot { tasks } => {
                let sender = router.lock().await.snapshots.clone();
                if let Some(sender) = sender {
                    if sender.send(SnapshotEvent::Snapshot(tasks)).await.is_err() {
                        // Subscriber went away; stop forwarding.
                        router.lock().await.snapshots = None;
                    }
                }
            }
            ServerFrame::SubscriptionError { message } => {
                let sender = router.lock().await.snapshots.take();
                if let Some(sender) = sender {
                    let _ = sender.send(SnapshotEvent::Lost(message)).await;
                }
            }
            ServerFrame::TaskCreated {
                request_id,
                task_id,
                success,
                error,
            } => {
                let outcome = if success {
                    Ok(task_id)
                } else {
                    Err(RemoteWriteError::Rejected(
                        error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                };
                Self::complete(router, request_id, outcome).await;
            }
            ServerFrame::TaskUpdated {
                request_id,
                success,
                error,
            }
            | ServerFrame::TaskDeleted {
                request_id,
                success,
                error,
            } => {
                let outcome = if success {
                    Ok(None)
                } else {
                    Err(RemoteWriteError::Rejected(
                        error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                };
                Self::complete(router, request_id, outcome).await;
            }
            ServerFrame::Pong => {}
        }
    }

    async fn complete(router: &Arc<Mutex<Router>>, request_id: Uuid, outcome: WriteOutcome) {
        match router.lock().await.pending.remove(&request_id) {
            Some(sender) => {
                let _ = sender.send(outcome);
            }
            None => {
                tracing::warn!(%request_id, "confirmation for an unknown or timed-out request");
            }
        }
    }

    async fn connection_closed(router: &Arc<Mutex<Router>>) {
        tracing::warn!("websocket connection closed, failing pending writes");
        let (pending, snapshots) = {
            let mut router = router.lock().await;
            let pending: Vec<_> = router.pending.drain().collect();
            (pending, router.snapshots.take())
        };
        for (_, sender) in pending {
            let _ = sender.send(Err(RemoteWriteError::Network(
                "connection closed".to_string(),
            )));
        }
        if let Some(sender) = snapshots {
            let _ = sender
                .send(SnapshotEvent::Lost("connection closed".to_string()))
                .await;
        }
    }

    async fn request(&self, request_id: Uuid, frame: ClientFrame) -> WriteOutcome {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.router.lock().await.pending.insert(request_id, reply_tx);

        if self.tx.send(frame).await.is_err() {
            self.router.lock().await.pending.remove(&request_id);
            return Err(RemoteWriteError::Network("connection closed".to_string()));
        }

        match tokio::time::timeout(self.confirm_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RemoteWriteError::Network("connection closed".to_string())),
            Err(_) => {
                self.router.lock().await.pending.remove(&request_id);
                Err(RemoteWriteError::Timeout)
            }
        }
    }
}

#[async_trait]
impl RemoteCollection for WsRemote {
    async fn subscribe(&self, owner: OwnerId) -> Result<Subscription, SubscriptionError> {
        let (snap_tx, snap_rx) = mpsc::channel(SNAPSHOT_BUFFER);
        self.router.lock().await.snapshots = Some(snap_tx);

        self.tx
            .send(ClientFrame::Subscribe { owner_id: owner })
            .await
            .map_err(|_| SubscriptionError::Connect("connection closed".to_string()))?;

        let unsubscribe_tx = self.tx.clone();
        let guard = SubscriptionGuard::new(move || {
            let _ = unsubscribe_tx.try_send(ClientFrame::Unsubscribe);
        });
        Ok(Subscription::new(snap_rx, guard))
    }

    async fn create(&self, record: NewTaskRecord) -> Result<RemoteId, RemoteWriteError> {
        let request_id = Uuid::new_v4();
        match self
            .request(request_id, ClientFrame::CreateTask { request_id, record })
            .await?
        {
            Some(task_id) => Ok(task_id),
            None => Err(RemoteWriteError::Rejected(
                "create confirmation carried no task id".to_string(),
            )),
        }
    }

    async fn update(&self, id: RemoteId, patch: TaskPatch) -> Result<(), RemoteWriteError> {
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ClientFrame::UpdateTask {
                request_id,
                task_id: id,
                patch,
            },
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, id: RemoteId) -> Result<(), RemoteWriteError> {
        let request_id = Uuid::new_v4();
        self.request(
            request_id,
            ClientFrame::DeleteTask {
                request_id,
                task_id: id,
            },
        )
        .await
        .map(|_| ())
    }
}
