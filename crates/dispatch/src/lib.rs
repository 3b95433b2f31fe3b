pub mod book;
pub mod process_pool;
pub mod queue;

pub use book::{MemoryTaskBook, TaskBook, TaskRecord, TaskStatus, run_tracked};
pub use process_pool::{ProcessPool, UnitState, UnitStatus};
pub use queue::{LocalQueue, Priority, QueuedTask, TaskPayload, TaskQueue};
