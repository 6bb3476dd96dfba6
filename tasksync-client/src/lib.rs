pub mod errors;
pub mod events;
pub mod identity;
pub mod remote;
pub mod state;
pub mod store;
pub mod ws;

pub use errors::StoreError;
pub use events::StoreEvent;
pub use identity::IdentityHandle;
pub use remote::{RemoteCollection, SnapshotEvent, Subscription, SubscriptionGuard};
pub use state::{Lifecycle, Task, TaskId};
pub use store::{StoreConfig, TaskStore};
pub use ws::WsRemote;
