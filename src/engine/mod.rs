//! Retrieval execution engine
//!
//! Scheduler, failure classification, batch splitting and durable execution
//! state. The engine pulls pending batches, admits them to a bounded worker
//! pool gated by the disk guard, runs each through the external tool, and
//! feeds results through the classifier -> splitter -> state store chain.

pub mod classifier;
pub mod executor;
pub mod splitter;
pub mod state_store;

pub use classifier::ErrorClassifier;
pub use executor::{EngineError, RetrievalEngine};
pub use splitter::{decide_follow_up, FollowUp};
pub use state_store::{ExecutionState, StateStore, StateStoreError};
