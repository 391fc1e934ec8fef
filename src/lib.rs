//! arsadmin-retriever - bulk document retrieval for OnDemand archives
//!
//! Drives many concurrent invocations of the external `arsadmin retrieve`
//! tool, recovers from partial failures inside a single invocation, persists
//! resumable execution state, and throttles admission on free disk space.
//! A performance harness sweeps worker-pool sizes over the same engine.

// Module declarations
pub mod domain;
pub mod engine;
pub mod harness;
pub mod infrastructure;

// Re-export the main surface for binary and test use
pub use domain::{AttemptOutcome, BatchAttempt, NidPair, PerformanceTrial, RetrievalBatch, RunSummary};
pub use engine::{ErrorClassifier, RetrievalEngine, StateStore};
pub use harness::PerformanceHarness;
pub use infrastructure::{ArsAdminInvoker, DiskGuard, RetrieverConfig};
