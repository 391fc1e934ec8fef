//! Domain model for bulk archive retrieval
//!
//! Core value types shared by the execution engine, the state store and the
//! performance harness. Everything here is plain data: batches are immutable
//! once created and failure handling derives *new* batches instead of
//! mutating existing ones.

pub mod attempt;
pub mod batch;
pub mod summary;

pub use attempt::{AttemptOutcome, BatchAttempt};
pub use batch::{NidPair, RetrievalBatch};
pub use summary::{format_bytes, PerformanceTrial, RunSummary};
