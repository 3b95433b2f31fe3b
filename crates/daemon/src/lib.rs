pub mod coordinator;
pub mod registry;
pub mod runner;
pub mod worker;

pub use coordinator::{Coordinator, ScanStats, SyncError};
pub use registry::{MemoryRegistry, PairRegistry};
pub use runner::{SyncRunner, spawn_runner};
pub use worker::{AbortHandle, Connector, PermissionSyncer, Worker};
