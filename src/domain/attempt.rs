//! BatchAttempt: one execution of a batch through the external tool
//!
//! Attempts are immutable records. A retry is never an in-place mutation;
//! the splitter derives a new batch and the engine creates a fresh attempt
//! for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classified result of one attempt.
///
/// The classifier guarantees exactly one of these per attempt; unmatched
/// diagnostic text degrades to `UnknownFailure`, never a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Exit status zero; all requested items presumed retrieved.
    Success,
    /// The tool stopped at the named unrecoverable item. Items strictly
    /// before it succeeded; the named item and everything after did not run.
    SingleItemCorruption { item_name: String },
    /// Application group missing or credential lacks access. Whole batch
    /// unusable, no partial success assumed.
    GroupOrPermissionFailure,
    /// Storage node could not be resolved. Whole batch unusable; logged and
    /// skipped without spinning.
    InfrastructureFailure,
    /// Nonzero exit with diagnostics matching none of the known patterns.
    /// Treated like a group failure but flagged distinctly for triage.
    UnknownFailure,
}

impl AttemptOutcome {
    /// Whether this outcome abandons every remaining item in the batch.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::GroupOrPermissionFailure | Self::InfrastructureFailure | Self::UnknownFailure
        )
    }

    /// Stable label used in the structured failure log.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SingleItemCorruption { .. } => "single_item_corruption",
            Self::GroupOrPermissionFailure => "group_or_permission_failure",
            Self::InfrastructureFailure => "infrastructure_failure",
            Self::UnknownFailure => "unknown_failure",
        }
    }
}

/// Immutable record of one tool invocation over a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAttempt {
    pub id: Uuid,
    /// The batch (original or derived) this attempt executed.
    pub batch_ref: Uuid,
    /// 0 for the original batch, incrementing along the derived chain.
    pub attempt_index: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// None when the process was killed by a signal.
    pub exit_status: Option<i32>,
    /// Captured diagnostic output (stderr).
    pub raw_output: String,
    /// Sum of on-disk sizes for the requested items after the invocation.
    pub bytes_transferred: u64,
    pub outcome: AttemptOutcome,
}
