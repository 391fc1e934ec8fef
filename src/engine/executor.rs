//! Retrieval Execution Engine
//!
//! Single-threaded scheduler over a bounded worker pool. Workers each block
//! on one external-tool subprocess; all outcome handling (classification,
//! splitting, state updates, totals) happens on the scheduler task, which is
//! the only mutator of the pending queue. Derived suffix batches are pushed
//! to the front of the queue so a half-done chain finishes before new
//! batches start, and a suffix never launches before its parent attempt is
//! classified because it only exists once the parent's report is handled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::attempt::{AttemptOutcome, BatchAttempt};
use crate::domain::batch::RetrievalBatch;
use crate::domain::summary::{format_bytes, RunSummary};
use crate::engine::classifier::ErrorClassifier;
use crate::engine::splitter::{decide_follow_up, FollowUp};
use crate::engine::state_store::{StateStore, StateStoreError};
use crate::infrastructure::disk_guard::DiskGuard;
use crate::infrastructure::external_tool::{ExternalToolError, ToolInvoker, ToolOutput};
use crate::infrastructure::logging::FAILURE_TARGET;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    State(#[from] StateStoreError),
}

/// Raw result a worker hands back to the scheduler.
struct WorkerReport {
    batch: RetrievalBatch,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    result: Result<ToolOutput, ExternalToolError>,
    bytes_transferred: u64,
}

/// The scheduler driving concurrent invocations of the external tool.
pub struct RetrievalEngine {
    invoker: Arc<dyn ToolInvoker>,
    disk_guard: Arc<DiskGuard>,
    state: Arc<StateStore>,
    classifier: ErrorClassifier,
    max_workers: usize,
    cancel: CancellationToken,
}

impl RetrievalEngine {
    pub fn new(
        invoker: Arc<dyn ToolInvoker>,
        disk_guard: Arc<DiskGuard>,
        state: Arc<StateStore>,
        max_workers: usize,
    ) -> Self {
        Self {
            invoker,
            disk_guard,
            state,
            classifier: ErrorClassifier::new(),
            max_workers: max_workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Token external control uses to request a graceful stop: in-flight
    /// subprocesses finish, then the engine checkpoints and returns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run all not-yet-terminal batches from the command list to completion
    /// (or until cancellation / disk-guard denial stops admission).
    ///
    /// Always ends with a durable checkpoint, so a follow-up process can
    /// resume from whatever was recorded.
    pub async fn run(&self, batches: &[RetrievalBatch]) -> Result<RunSummary, EngineError> {
        let start = Instant::now();
        let pending_indices = self.state.pending_indices(batches.len()).await;
        let skipped = batches.len() - pending_indices.len();
        if skipped > 0 {
            info!("⏭️ Skipping {} batches already terminal in prior runs", skipped);
        }

        let mut queue: VecDeque<RetrievalBatch> = pending_indices
            .into_iter()
            .map(|index| batches[index].clone())
            .collect();

        info!(
            "🚀 Engine starting: {} pending batches, {} workers",
            queue.len(),
            self.max_workers
        );

        let (report_tx, mut report_rx) = mpsc::channel::<WorkerReport>(self.max_workers.max(1));
        let mut summary = RunSummary::default();
        let mut in_flight = 0usize;
        let mut disk_denial_logged = false;

        loop {
            // Admission: the disk guard is consulted immediately before each
            // launch, not once per tick.
            while in_flight < self.max_workers
                && !self.cancel.is_cancelled()
                && !queue.is_empty()
            {
                if !self.disk_guard.admit() {
                    if !disk_denial_logged {
                        warn!(
                            "🛑 Free disk space below {:.1}%, not admitting new batches",
                            self.disk_guard.min_free_percent()
                        );
                        disk_denial_logged = true;
                    }
                    break;
                }
                disk_denial_logged = false;

                if let Some(batch) = queue.pop_front() {
                    debug!("Admitting batch {} ({} items)", batch.log_key(), batch.item_count());
                    self.spawn_worker(batch, report_tx.clone());
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                if !queue.is_empty() {
                    // Denied or cancelled with nothing running: stop here,
                    // the remaining batches stay pending for a resume.
                    summary.stopped_early = true;
                }
                break;
            }

            match report_rx.recv().await {
                Some(report) => {
                    in_flight -= 1;
                    self.handle_report(report, &mut queue, &mut summary).await;
                }
                None => break,
            }
        }

        self.state.checkpoint().await?;

        summary.elapsed = start.elapsed();
        info!(
            "🏁 Engine finished: {} transferred, {} completed, {} abandoned, {} failed items, {:.1}s",
            format_bytes(summary.total_bytes_transferred),
            summary.completed_batches,
            summary.abandoned_batches,
            summary.failed_item_count(),
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    fn spawn_worker(&self, batch: RetrievalBatch, report_tx: mpsc::Sender<WorkerReport>) {
        let invoker = Arc::clone(&self.invoker);
        tokio::spawn(async move {
            let started_at = Utc::now();

            let result = match tokio::fs::create_dir_all(&batch.target_directory).await {
                Ok(()) => invoker.invoke(&batch).await,
                Err(e) => Err(ExternalToolError::Launch(e)),
            };

            let ended_at = Utc::now();
            let bytes_transferred = measure_retrieved_bytes(&batch).await;

            let report = WorkerReport {
                batch,
                started_at,
                ended_at,
                result,
                bytes_transferred,
            };
            // The scheduler outlives every worker it spawned; a send failure
            // means the run is being torn down and the report is moot.
            let _ = report_tx.send(report).await;
        });
    }

    /// Classifier -> splitter -> state store chain for one finished attempt.
    async fn handle_report(
        &self,
        report: WorkerReport,
        queue: &mut VecDeque<RetrievalBatch>,
        summary: &mut RunSummary,
    ) {
        let batch = report.batch;
        let (output, launch_failed) = match report.result {
            Ok(output) => (output, false),
            Err(e) => {
                // The tool could not be started for this batch. The startup
                // probe already guards against a missing executable, so this
                // is reported as an unknown failure and the run continues.
                error!("Worker could not launch the tool for batch {}: {}", batch.log_key(), e);
                (
                    ToolOutput {
                        exit_status: None,
                        stdout: String::new(),
                        stderr: e.to_string(),
                    },
                    true,
                )
            }
        };

        let outcome = if launch_failed {
            AttemptOutcome::UnknownFailure
        } else {
            self.classifier.classify(output.exit_status, &output.stderr)
        };

        let attempt = BatchAttempt {
            id: Uuid::new_v4(),
            batch_ref: batch.id,
            attempt_index: batch.derived_depth,
            started_at: report.started_at,
            ended_at: report.ended_at,
            exit_status: output.exit_status,
            raw_output: output.stderr.clone(),
            bytes_transferred: report.bytes_transferred,
            outcome: outcome.clone(),
        };

        summary.total_bytes_transferred += report.bytes_transferred;

        match decide_follow_up(&batch, &outcome) {
            FollowUp::Complete => {
                self.state.record_terminal(batch.source_index).await;
                summary.completed_batches += 1;
                info!(
                    "✅ Batch {} complete: {} items, {}",
                    batch.log_key(),
                    batch.item_count(),
                    format_bytes(report.bytes_transferred)
                );
            }

            FollowUp::IsolateAndContinue { failed_item, succeeded_items, suffix } => {
                let detail = failure_detail(&outcome, &output);
                self.state.record_failed_item(&failed_item, &detail).await;
                summary.failed_items.insert(failed_item.clone(), detail);
                self.log_failure(&batch, &attempt, Some(&failed_item), &output);

                warn!(
                    "⚠️ Batch {}: item '{}' permanently failed, {} succeeded before it, continuing",
                    batch.log_key(),
                    failed_item,
                    succeeded_items.len()
                );

                match suffix {
                    // Suffix priority: the derived batch goes to the front
                    // so this chain drains before untouched batches start.
                    Some(suffix) => queue.push_front(suffix),
                    None => {
                        // Degenerate empty suffix: the chain is drained and
                        // that is a terminal outcome for the source command.
                        self.state.record_terminal(batch.source_index).await;
                        summary.completed_batches += 1;
                    }
                }
            }

            FollowUp::Abandon { failed_items } => {
                let detail = failure_detail(&outcome, &output);
                for item in &failed_items {
                    self.state.record_failed_item(item, &detail).await;
                    summary.failed_items.insert(item.clone(), detail.clone());
                }
                self.state.record_terminal(batch.source_index).await;
                summary.abandoned_batches += 1;
                self.log_failure(&batch, &attempt, None, &output);

                error!(
                    "❌ Batch {} abandoned ({}): {} items recorded failed",
                    batch.log_key(),
                    outcome.label(),
                    failed_items.len()
                );
            }
        }
    }

    /// One structured record per terminal failure outcome, on the dedicated
    /// failure log, sufficient for offline triage without re-running.
    fn log_failure(
        &self,
        batch: &RetrievalBatch,
        attempt: &BatchAttempt,
        failed_item: Option<&str>,
        output: &ToolOutput,
    ) {
        error!(
            target: FAILURE_TARGET,
            batch_id = %batch.id,
            attempt_id = %attempt.id,
            source_index = batch.source_index,
            attempt_index = attempt.attempt_index,
            group = %batch.group_id,
            nid_pair = %batch.nid_pair,
            outcome = attempt.outcome.label(),
            failed_item = failed_item.unwrap_or(""),
            exit_status = ?output.exit_status,
            raw_output = %output.stderr,
            "terminal failure"
        );
    }
}

/// Error detail persisted per failed item: classification plus the first
/// diagnostic line, enough to triage without the full capture.
fn failure_detail(outcome: &AttemptOutcome, output: &ToolOutput) -> String {
    let first_line = output.stderr.lines().next().unwrap_or("").trim();
    match output.exit_status {
        Some(code) => format!("{} (code {}): {}", outcome.label(), code, first_line),
        None => format!("{}: {}", outcome.label(), first_line),
    }
}

/// Bytes now on disk for the batch's requested items. Items the tool never
/// reached have no file and contribute nothing.
async fn measure_retrieved_bytes(batch: &RetrievalBatch) -> u64 {
    let mut total = 0u64;
    for item in &batch.item_names {
        let path = batch.target_directory.join(item);
        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            if metadata.is_file() {
                total += metadata.len();
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::NidPair;
    use crate::infrastructure::disk_guard::FreeSpaceProbe;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the scripted tool should do for one (source_index, depth) pair.
    #[derive(Clone)]
    enum Script {
        /// Write a file of `item_bytes` for every requested item, exit 0.
        Succeed { item_bytes: u64 },
        /// Write files for the items before `item`, then fail naming it.
        CorruptAt { item: String, item_bytes: u64 },
        GroupFailure,
        StorageNodeFailure,
        LaunchError,
    }

    struct ScriptedInvoker {
        scripts: HashMap<(usize, u32), Script>,
        invocations: Mutex<Vec<(usize, u32, Vec<String>)>>,
    }

    impl ScriptedInvoker {
        fn new(scripts: HashMap<(usize, u32), Script>) -> Self {
            Self {
                scripts,
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn invocation_count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }

        fn invocations(&self) -> Vec<(usize, u32, Vec<String>)> {
            self.invocations.lock().unwrap().clone()
        }

        async fn write_item(dir: &Path, item: &str, bytes: u64) {
            tokio::fs::write(dir.join(item), vec![0u8; bytes as usize])
                .await
                .unwrap();
        }
    }

    #[async_trait]
    impl ToolInvoker for ScriptedInvoker {
        async fn invoke(&self, batch: &RetrievalBatch) -> Result<ToolOutput, ExternalToolError> {
            self.invocations.lock().unwrap().push((
                batch.source_index,
                batch.derived_depth,
                batch.item_names.clone(),
            ));

            let script = self
                .scripts
                .get(&(batch.source_index, batch.derived_depth))
                .cloned()
                .unwrap_or(Script::Succeed { item_bytes: 0 });

            match script {
                Script::Succeed { item_bytes } => {
                    for item in &batch.item_names {
                        Self::write_item(&batch.target_directory, item, item_bytes).await;
                    }
                    Ok(ToolOutput {
                        exit_status: Some(0),
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                }
                Script::CorruptAt { item, item_bytes } => {
                    for name in &batch.item_names {
                        if *name == item {
                            break;
                        }
                        Self::write_item(&batch.target_directory, name, item_bytes).await;
                    }
                    Ok(ToolOutput {
                        exit_status: Some(2),
                        stdout: String::new(),
                        stderr: format!(
                            "ARS1159E Unable to retrieve the object >{item}< from node\n"
                        ),
                    })
                }
                Script::GroupFailure => Ok(ToolOutput {
                    exit_status: Some(1),
                    stdout: String::new(),
                    stderr: "ARS1110E The application group does not exist\n".to_string(),
                }),
                Script::StorageNodeFailure => Ok(ToolOutput {
                    exit_status: Some(1),
                    stdout: String::new(),
                    stderr: "ARS1168E Unable to determine Storage Node\n".to_string(),
                }),
                Script::LaunchError => Err(ExternalToolError::Launch(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "spawn denied",
                ))),
            }
        }
    }

    struct AlwaysFree;
    impl FreeSpaceProbe for AlwaysFree {
        fn free_space_percent(&self, _path: &Path) -> Option<f64> {
            Some(90.0)
        }
    }

    struct NeverFree;
    impl FreeSpaceProbe for NeverFree {
        fn free_space_percent(&self, _path: &Path) -> Option<f64> {
            Some(1.0)
        }
    }

    /// Admits for the first `n` samples, denies afterwards.
    struct DenyAfter {
        remaining: AtomicUsize,
    }
    impl FreeSpaceProbe for DenyAfter {
        fn free_space_percent(&self, _path: &Path) -> Option<f64> {
            let prior = self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
            match prior {
                Ok(v) if v > 0 => Some(90.0),
                _ => Some(1.0),
            }
        }
    }

    fn test_batch(source_index: usize, dir: &Path, items: &[&str]) -> RetrievalBatch {
        RetrievalBatch::new(
            source_index,
            "AG1".into(),
            "ARCHIVE".into(),
            "admin".into(),
            None,
            NidPair { primary: 1, secondary: 0 },
            dir.join(format!("batch{source_index}")),
            items.iter().map(|s| s.to_string()).collect(),
        )
    }

    async fn engine_with(
        invoker: Arc<ScriptedInvoker>,
        probe: Box<dyn FreeSpaceProbe>,
        dir: &Path,
        workers: usize,
    ) -> (RetrievalEngine, Arc<StateStore>) {
        let state = Arc::new(StateStore::load(dir.join("state.json")).await.unwrap());
        let guard = Arc::new(DiskGuard::with_probe(dir, 10.0, probe));
        let engine = RetrievalEngine::new(invoker, guard, Arc::clone(&state), workers);
        (engine, state)
    }

    #[tokio::test]
    async fn corruption_at_third_of_five_isolates_and_retries_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            (
                (0, 0),
                Script::CorruptAt { item: "d3".into(), item_bytes: 100 },
            ),
            ((0, 1), Script::Succeed { item_bytes: 100 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 4).await;

        let batches = vec![test_batch(0, dir.path(), &["d1", "d2", "d3", "d4", "d5"])];
        let summary = engine.run(&batches).await.unwrap();

        // one permanently failed item, items 1-2 and 4-5 retrieved
        assert_eq!(summary.failed_item_count(), 1);
        assert!(summary.failed_items.contains_key("d3"));
        assert_eq!(summary.total_bytes_transferred, 400);
        assert_eq!(summary.completed_batches, 1);
        assert_eq!(summary.abandoned_batches, 0);
        assert!(!summary.stopped_early);

        // the derived attempt ran exactly the suffix, in order
        let invocations = invoker.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[1].2, vec!["d4", "d5"]);

        assert!(state.is_terminal(0).await);
    }

    #[tokio::test]
    async fn corruption_at_last_item_drains_the_chain_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([(
            (0, 0),
            Script::CorruptAt { item: "d2".into(), item_bytes: 10 },
        )]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 2).await;

        let batches = vec![test_batch(0, dir.path(), &["d1", "d2"])];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(invoker.invocation_count(), 1);
        assert_eq!(summary.failed_item_count(), 1);
        assert_eq!(summary.completed_batches, 1);
        assert!(state.is_terminal(0).await);
    }

    #[tokio::test]
    async fn group_failure_abandons_without_bytes_or_retry() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<String> = (1..=10).map(|i| format!("doc{i}")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();

        let scripts = HashMap::from([((0, 0), Script::GroupFailure)]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 2).await;

        let batches = vec![test_batch(0, dir.path(), &refs)];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(summary.failed_item_count(), 10);
        assert_eq!(summary.total_bytes_transferred, 0);
        assert_eq!(summary.abandoned_batches, 1);
        assert_eq!(summary.completed_batches, 0);
        assert_eq!(invoker.invocation_count(), 1);
        assert!(state.is_terminal(0).await);
    }

    #[tokio::test]
    async fn infrastructure_failure_moves_on_to_unrelated_batches() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            ((0, 0), Script::StorageNodeFailure),
            ((1, 0), Script::Succeed { item_bytes: 50 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, _state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 1).await;

        let batches = vec![
            test_batch(0, dir.path(), &["a1", "a2"]),
            test_batch(1, dir.path(), &["b1"]),
        ];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(summary.abandoned_batches, 1);
        assert_eq!(summary.completed_batches, 1);
        assert_eq!(summary.total_bytes_transferred, 50);
        assert_eq!(summary.failed_item_count(), 2);
    }

    #[tokio::test]
    async fn launch_error_is_unknown_failure_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            ((0, 0), Script::LaunchError),
            ((1, 0), Script::Succeed { item_bytes: 5 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, _state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 1).await;

        let batches = vec![
            test_batch(0, dir.path(), &["a1"]),
            test_batch(1, dir.path(), &["b1"]),
        ];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(summary.abandoned_batches, 1);
        assert_eq!(summary.completed_batches, 1);
        assert!(summary.failed_items.contains_key("a1"));
    }

    #[tokio::test]
    async fn disk_denial_blocks_admission_but_not_completion() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            ((0, 0), Script::Succeed { item_bytes: 77 }),
            ((1, 0), Script::Succeed { item_bytes: 77 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        // one admission sample passes, every later one denies
        let probe = Box::new(DenyAfter { remaining: AtomicUsize::new(1) });
        let (engine, state) =
            engine_with(Arc::clone(&invoker), probe, dir.path(), 1).await;

        let batches = vec![
            test_batch(0, dir.path(), &["a1"]),
            test_batch(1, dir.path(), &["b1"]),
        ];
        let summary = engine.run(&batches).await.unwrap();

        // the admitted worker finished and its bytes count toward the total
        assert_eq!(invoker.invocation_count(), 1);
        assert_eq!(summary.total_bytes_transferred, 77);
        assert_eq!(summary.completed_batches, 1);
        assert!(summary.stopped_early);
        assert!(state.is_terminal(0).await);
        assert!(!state.is_terminal(1).await);
    }

    #[tokio::test]
    async fn full_denial_leaves_everything_pending() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new(HashMap::new()));
        let (engine, state) =
            engine_with(Arc::clone(&invoker), Box::new(NeverFree), dir.path(), 4).await;

        let batches = vec![test_batch(0, dir.path(), &["a1"])];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(invoker.invocation_count(), 0);
        assert!(summary.stopped_early);
        assert!(!state.is_terminal(0).await);
    }

    #[tokio::test]
    async fn resume_skips_batches_already_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            ((0, 0), Script::Succeed { item_bytes: 1 }),
            ((1, 0), Script::Succeed { item_bytes: 1 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 2).await;

        state.record_terminal(0).await;

        let batches = vec![
            test_batch(0, dir.path(), &["a1"]),
            test_batch(1, dir.path(), &["b1"]),
        ];
        let summary = engine.run(&batches).await.unwrap();

        let invocations = invoker.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].0, 1);
        assert_eq!(summary.completed_batches, 1);
    }

    #[tokio::test]
    async fn cancellation_before_start_admits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::new(HashMap::new()));
        let (engine, _state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 2).await;

        engine.cancellation_token().cancel();

        let batches = vec![test_batch(0, dir.path(), &["a1"])];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(invoker.invocation_count(), 0);
        assert!(summary.stopped_early);
    }

    #[tokio::test]
    async fn repeated_corruption_conserves_every_item() {
        // Corruption at the head of each derived batch in turn: d1 then d2,
        // then the final singleton succeeds. Every item lands in exactly one
        // terminal bucket.
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            ((0, 0), Script::CorruptAt { item: "d1".into(), item_bytes: 10 }),
            ((0, 1), Script::CorruptAt { item: "d2".into(), item_bytes: 10 }),
            ((0, 2), Script::Succeed { item_bytes: 10 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 3).await;

        let batches = vec![test_batch(0, dir.path(), &["d1", "d2", "d3"])];
        let summary = engine.run(&batches).await.unwrap();

        assert_eq!(summary.failed_item_count(), 2);
        assert!(summary.failed_items.contains_key("d1"));
        assert!(summary.failed_items.contains_key("d2"));
        // only d3 retrieved
        assert_eq!(summary.total_bytes_transferred, 10);
        assert_eq!(summary.completed_batches, 1);
        assert_eq!(invoker.invocation_count(), 3);
        assert!(state.is_terminal(0).await);

        // attempts within the chain ran strictly sequentially by depth
        let depths: Vec<u32> = invoker.invocations().iter().map(|i| i.1).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn suffix_batches_take_priority_over_unstarted_batches() {
        // Single worker: after batch 0 splits, its suffix must run before
        // batch 1 even though batch 1 was queued first.
        let dir = tempfile::tempdir().unwrap();
        let scripts = HashMap::from([
            ((0, 0), Script::CorruptAt { item: "d1".into(), item_bytes: 1 }),
            ((0, 1), Script::Succeed { item_bytes: 1 }),
            ((1, 0), Script::Succeed { item_bytes: 1 }),
        ]);
        let invoker = Arc::new(ScriptedInvoker::new(scripts));
        let (engine, _state) =
            engine_with(Arc::clone(&invoker), Box::new(AlwaysFree), dir.path(), 1).await;

        let batches = vec![
            test_batch(0, dir.path(), &["d1", "d2"]),
            test_batch(1, dir.path(), &["e1"]),
        ];
        engine.run(&batches).await.unwrap();

        let order: Vec<(usize, u32)> =
            invoker.invocations().iter().map(|i| (i.0, i.1)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);
    }
}
