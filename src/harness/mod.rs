//! Performance harness: concurrency sweeps over the execution engine.

pub mod performance;

pub use performance::{HarnessError, PerformanceHarness};
