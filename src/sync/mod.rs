//! Batched, retried synchronization of built entries with the store.

mod batch;
mod retry;

pub use batch::{partition, BatchSynchronizer, SyncError, SyncReport, DEFAULT_BATCH_SIZE};
pub use retry::{retry, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_DELAY};
