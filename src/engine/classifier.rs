//! Error Classifier: structured outcomes from tool diagnostics
//!
//! The external tool reports failures as free text on stderr. Classification
//! is a prioritized list of (matcher, constructor) rules; the first matching
//! rule wins and unmatched text degrades to `UnknownFailure` rather than
//! crashing the pipeline. Corruption is matched before the batch-fatal
//! categories so an ambiguous blob resolves to the recoverable outcome.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::attempt::AttemptOutcome;

/// Marker the tool prints when it stops at one unrecoverable object.
const CORRUPTION_MARKER: &str = "ARS1159E Unable to retrieve the object";
/// Marker for a missing application group or insufficient permission.
const GROUP_MARKER: &str = "ARS1110E The application group";
/// Marker for an unresolvable storage-node condition.
const STORAGE_NODE_MARKER: &str = "ARS1168E Unable to determine Storage Node";

static CORRUPT_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"Unable to retrieve the object >(\S+)<").expect("static regex is valid")
});

type Rule = fn(&str) -> Option<AttemptOutcome>;

/// Priority order matters: the corruption rule runs before the batch-fatal
/// rules per the tie-break policy.
const RULES: &[Rule] = &[
    classify_corruption,
    classify_group_failure,
    classify_storage_node_failure,
];

fn classify_corruption(stderr: &str) -> Option<AttemptOutcome> {
    if !stderr.contains(CORRUPTION_MARKER) {
        return None;
    }
    // The marker without a capturable item name means we cannot place the
    // split point; degrade to UnknownFailure like any unreadable diagnostic.
    match CORRUPT_ITEM_RE.captures(stderr) {
        Some(captures) => Some(AttemptOutcome::SingleItemCorruption {
            item_name: captures[1].to_string(),
        }),
        None => Some(AttemptOutcome::UnknownFailure),
    }
}

fn classify_group_failure(stderr: &str) -> Option<AttemptOutcome> {
    stderr
        .contains(GROUP_MARKER)
        .then_some(AttemptOutcome::GroupOrPermissionFailure)
}

fn classify_storage_node_failure(stderr: &str) -> Option<AttemptOutcome> {
    stderr
        .contains(STORAGE_NODE_MARKER)
        .then_some(AttemptOutcome::InfrastructureFailure)
}

/// Classifies one attempt's exit status and captured diagnostics.
#[derive(Debug, Default, Clone)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Exactly one outcome per attempt. Exit zero is success regardless of
    /// what the tool printed; anything else runs the rule chain.
    pub fn classify(&self, exit_status: Option<i32>, stderr: &str) -> AttemptOutcome {
        if exit_status == Some(0) {
            return AttemptOutcome::Success;
        }

        RULES
            .iter()
            .find_map(|rule| rule(stderr))
            .unwrap_or(AttemptOutcome::UnknownFailure)
    }
}
