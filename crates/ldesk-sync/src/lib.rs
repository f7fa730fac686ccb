//! Location reconciliation and per-entity sync jobs.
//!
//! [`Deduplicator`] folds fetched locations into the store under their
//! normalized id. [`SyncOrchestrator`] drives fetch → merge → persist cycles
//! with coalescing, bounded retries, timeouts, and cancellation.

pub mod dedup;
mod error;
pub mod orchestrator;
pub mod retry;

pub use dedup::{
    decide, merge_into, prefers_incoming, DedupReport, Deduplicator, MergeDecision, ReconcileError,
};
pub use error::SyncError;
pub use orchestrator::{
    EntityRef, JobError, JobHandle, ReviewSyncSummary, SyncJob, SyncOrchestrator, SyncOutcome,
    SyncSettings, SyncStatus, SyncTarget,
};
pub use retry::RetryPolicy;
