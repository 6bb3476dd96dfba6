use tokio::sync::watch;

use tasksync_core::OwnerId;

/// Injectable identity source. The store consumes the receiver half and
/// re-establishes its subscription whenever the owner changes; tests and
/// embedders drive the sender half.
#[derive(Debug, Clone)]
pub struct IdentityHandle {
    tx: watch::Sender<Option<OwnerId>>,
}

impl IdentityHandle {
    /// Starts signed out.
    pub fn signed_out() -> (Self, watch::Receiver<Option<OwnerId>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Starts with the given owner already signed in.
    pub fn signed_in(owner: OwnerId) -> (Self, watch::Receiver<Option<OwnerId>>) {
        let (tx, rx) = watch::channel(Some(owner));
        (Self { tx }, rx)
    }

    pub fn sign_in(&self, owner: OwnerId) {
        let _ = self.tx.send(Some(owner));
    }

    pub fn sign_out(&self) {
        let _ = self.tx.send(None);
    }

    pub fn current(&self) -> Option<OwnerId> {
        self.tx.borrow().clone()
    }

    /// A fresh receiver for another store over the same identity.
    pub fn watch(&self) -> watch::Receiver<Option<OwnerId>> {
        self.tx.subscribe()
    }
}
