//! Batch Splitter: remediation for a classified attempt
//!
//! Given an attempt's outcome, decides what happens next: mark the batch
//! complete, isolate the corrupt item and continue with the remaining
//! suffix, or abandon the whole batch. The corrupt item itself is never
//! retried; the point is to identify it for later manual inspection.

use crate::domain::attempt::AttemptOutcome;
use crate::domain::batch::RetrievalBatch;

/// The follow-up actions for one classified attempt.
#[derive(Debug)]
pub enum FollowUp {
    /// All requested items retrieved; the chain is done.
    Complete,
    /// One item failed permanently; items before it succeeded; the suffix
    /// (if any) re-enters the queue as a new derived batch.
    IsolateAndContinue {
        failed_item: String,
        succeeded_items: Vec<String>,
        suffix: Option<RetrievalBatch>,
    },
    /// Every item in the batch is recorded failed with the diagnostic; no
    /// further attempts, processing moves on to unrelated batches.
    Abandon { failed_items: Vec<String> },
}

/// Decide the remediation for `batch` given its classified `outcome`.
///
/// A corruption naming an item that is not in the batch cannot place the
/// split point, so it falls back to abandoning the batch; the classifier
/// output and the batch ordering disagree and guessing would lose items.
pub fn decide_follow_up(batch: &RetrievalBatch, outcome: &AttemptOutcome) -> FollowUp {
    match outcome {
        AttemptOutcome::Success => FollowUp::Complete,

        AttemptOutcome::SingleItemCorruption { item_name } => {
            match batch.position_of(item_name) {
                Some(index) => FollowUp::IsolateAndContinue {
                    failed_item: item_name.clone(),
                    succeeded_items: batch.item_names[..index].to_vec(),
                    suffix: batch.derive_suffix_after(index),
                },
                None => FollowUp::Abandon {
                    failed_items: batch.item_names.clone(),
                },
            }
        }

        AttemptOutcome::GroupOrPermissionFailure
        | AttemptOutcome::InfrastructureFailure
        | AttemptOutcome::UnknownFailure => FollowUp::Abandon {
            failed_items: batch.item_names.clone(),
        },
    }
}
