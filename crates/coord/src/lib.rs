pub mod fence;
pub mod lease;
pub mod store;

pub use fence::{FencePayload, SyncFence};
pub use lease::Lease;
pub use store::{CoordError, CoordinationStore, MemoryStore};
