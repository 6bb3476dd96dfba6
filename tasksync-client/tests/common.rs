use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;

use tasksync_client::{
    IdentityHandle, Lifecycle, RemoteCollection, SnapshotEvent, StoreConfig, Subscription,
    SubscriptionGuard, TaskStore,
};
use tasksync_core::{
    NewTaskRecord, OwnerId, RemoteId, RemoteWriteError, SubscriptionError, TaskPatch, TaskRecord,
};

/// Scriptable in-memory remote: tests control failure injection, block
/// writes to observe optimistic state, and push snapshots by hand.
#[allow(dead_code)]
pub struct FakeRemote {
    counter: AtomicUsize,
    pub fail_subscribe: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub block_create: AtomicBool,
    snapshot_tx: Mutex<Option<mpsc::Sender<SnapshotEvent>>>,
    subscription_active: Arc<AtomicBool>,
    created: Mutex<Vec<NewTaskRecord>>,
    updated: Mutex<Vec<(RemoteId, TaskPatch)>>,
    deleted: Mutex<Vec<RemoteId>>,
}

#[allow(dead_code)]
impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicUsize::new(0),
            fail_subscribe: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            block_create: AtomicBool::new(false),
            snapshot_tx: Mutex::new(None),
            subscription_active: Arc::new(AtomicBool::new(false)),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    /// Delivers a snapshot on the active subscription. Returns false when
    /// nothing is listening any more.
    pub async fn push_snapshot(&self, records: Vec<TaskRecord>) -> bool {
        self.push(SnapshotEvent::Snapshot(records)).await
    }

    pub async fn push_lost(&self, message: &str) -> bool {
        self.push(SnapshotEvent::Lost(message.to_string())).await
    }

    async fn push(&self, event: SnapshotEvent) -> bool {
        let sender = self.snapshot_tx.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn subscription_active(&self) -> bool {
        self.subscription_active.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<NewTaskRecord> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(RemoteId, TaskPatch)> {
        self.updated.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<RemoteId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteCollection for FakeRemote {
    async fn subscribe(&self, _owner: OwnerId) -> Result<Subscription, SubscriptionError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Connect(
                "remote refused the subscription".to_string(),
            ));
        }
        let (tx, rx) = mpsc::channel(16);
        *self.snapshot_tx.lock().unwrap() = Some(tx);
        self.subscription_active.store(true, Ordering::SeqCst);

        let active = self.subscription_active.clone();
        let guard = SubscriptionGuard::new(move || active.store(false, Ordering::SeqCst));
        Ok(Subscription::new(rx, guard))
    }

    async fn create(&self, record: NewTaskRecord) -> Result<RemoteId, RemoteWriteError> {
        while self.block_create.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RemoteWriteError::Network("wire is down".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.lock().unwrap().push(record);
        Ok(RemoteId::new(format!("rem-{n}")))
    }

    async fn update(&self, id: RemoteId, patch: TaskPatch) -> Result<(), RemoteWriteError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(RemoteWriteError::Network("wire is down".to_string()));
        }
        self.updated.lock().unwrap().push((id, patch));
        Ok(())
    }

    async fn delete(&self, id: RemoteId) -> Result<(), RemoteWriteError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RemoteWriteError::Network("wire is down".to_string()));
        }
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }
}

#[allow(dead_code)]
pub struct TestSetup {
    pub store: Arc<TaskStore<FakeRemote>>,
    pub remote: Arc<FakeRemote>,
    pub identity: IdentityHandle,
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[allow(dead_code)]
pub fn test_owner() -> OwnerId {
    OwnerId::from("user-1")
}

/// Store with a signed-in owner whose subscription is established but has
/// not seen a snapshot yet.
#[allow(dead_code)]
pub async fn setup_signed_in() -> TestSetup {
    init_tracing();
    let remote = FakeRemote::new();
    let (identity, rx) = IdentityHandle::signed_in(test_owner());
    let store = Arc::new(TaskStore::new(remote.clone(), rx, StoreConfig::default()));
    wait_until(|| remote.subscription_active()).await;
    TestSetup {
        store,
        remote,
        identity,
    }
}

/// Store that has gone `Live` on an empty snapshot.
#[allow(dead_code)]
pub async fn setup_live() -> TestSetup {
    let setup = setup_signed_in().await;
    assert!(setup.remote.push_snapshot(Vec::new()).await);
    wait_until(|| setup.store.lifecycle() == Lifecycle::Live).await;
    setup
}

/// Polls until the condition holds; panics after two seconds.
#[allow(dead_code)]
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Confirmed record owned by the default test owner, `minutes_ago` old.
#[allow(dead_code)]
pub fn record(id: &str, minutes_ago: i64) -> TaskRecord {
    record_for(test_owner(), id, minutes_ago)
}

#[allow(dead_code)]
pub fn record_for(owner: OwnerId, id: &str, minutes_ago: i64) -> TaskRecord {
    TaskRecord {
        id: RemoteId::from(id),
        owner_id: owner,
        title: format!("task {id}"),
        description: None,
        completed: false,
        tags: Vec::new(),
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}
