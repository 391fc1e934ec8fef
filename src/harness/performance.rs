//! Performance Harness
//!
//! Reuses the execution engine under a synthetic or real workload, running
//! one trial per configured concurrency level. Every trial starts from
//! identical conditions: the data directory and state file are removed
//! before it and its artifacts are deleted after it. A trial ends when the
//! target byte volume is reached or the engine runs out of admissible work,
//! whichever comes first. A trial that errors out is excluded from the
//! report rather than half-counted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::batch::RetrievalBatch;
use crate::domain::summary::{format_bytes, PerformanceTrial};
use crate::engine::executor::{EngineError, RetrievalEngine};
use crate::engine::state_store::{StateStore, StateStoreError};
use crate::infrastructure::config::RetrieverConfig;
use crate::infrastructure::disk_guard::DiskGuard;
use crate::infrastructure::external_tool::ToolInvoker;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Failed to reset trial workspace: {0}")]
    Reset(#[source] std::io::Error),

    #[error(transparent)]
    State(#[from] StateStoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Sweeps worker-pool sizes and reports comparative throughput.
pub struct PerformanceHarness {
    invoker: Arc<dyn ToolInvoker>,
    config: RetrieverConfig,
}

impl PerformanceHarness {
    pub fn new(invoker: Arc<dyn ToolInvoker>, config: RetrieverConfig) -> Self {
        Self { invoker, config }
    }

    /// Run one trial per configured concurrency level over `batches`.
    /// Interrupted trials are logged and excluded; the report keeps the
    /// configured level order.
    pub async fn run_sweep(
        &self,
        batches: &[RetrievalBatch],
    ) -> Result<Vec<PerformanceTrial>, HarnessError> {
        let levels = self.config.performance.concurrency_levels.clone();
        let target_bytes = self.config.performance.target_bytes;
        let mut trials = Vec::with_capacity(levels.len());

        info!(
            "📊 Performance sweep: levels {:?}, target {} per trial",
            levels,
            format_bytes(target_bytes)
        );

        for concurrency in levels {
            match self.run_trial(concurrency, target_bytes, batches).await {
                Ok(trial) => {
                    info!(
                        "📈 concurrency {}: {} in {:.2}s -> {:.2} MB/s, {} failed items",
                        trial.concurrency,
                        format_bytes(trial.bytes_transferred),
                        trial.duration.as_secs_f64(),
                        trial.throughput_mb_per_s,
                        trial.failed_item_count
                    );
                    trials.push(trial);
                }
                Err(e) => {
                    error!("Trial at concurrency {} failed, excluding from report: {}", concurrency, e);
                }
            }
        }

        self.teardown().await?;
        Ok(trials)
    }

    async fn run_trial(
        &self,
        concurrency: usize,
        target_bytes: u64,
        batches: &[RetrievalBatch],
    ) -> Result<PerformanceTrial, HarnessError> {
        self.teardown().await?;
        fs::create_dir_all(&self.config.paths.data_dir)
            .await
            .map_err(HarnessError::Reset)?;

        let state = Arc::new(StateStore::load(&self.config.paths.state_file).await?);
        let disk_guard = Arc::new(DiskGuard::new(
            self.config.paths.data_dir.clone(),
            self.config.disk.min_free_space_percent,
        ));
        let engine = RetrievalEngine::new(
            Arc::clone(&self.invoker),
            disk_guard,
            state,
            concurrency,
        );

        // Stop the engine once the data directory reaches the target volume.
        let token = engine.cancellation_token();
        let watcher = spawn_volume_watcher(
            self.config.paths.data_dir.clone(),
            target_bytes,
            token.clone(),
        );

        let start = Instant::now();
        let summary = engine.run(batches).await?;
        let duration = start.elapsed();
        token.cancel();
        let _ = watcher.await;

        Ok(PerformanceTrial::new(
            concurrency,
            target_bytes,
            duration,
            summary.total_bytes_transferred,
            summary.failed_item_count(),
        ))
    }

    /// Delete trial artifacts so the next trial starts clean.
    async fn teardown(&self) -> Result<(), HarnessError> {
        remove_dir_with_retry(&self.config.paths.data_dir, 5, Duration::from_secs(1))
            .await
            .map_err(HarnessError::Reset)?;

        match fs::remove_file(&self.config.paths.state_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(HarnessError::Reset(e)),
        }
        Ok(())
    }
}

/// Polls the data directory size and fires the token at the target volume.
fn spawn_volume_watcher(
    data_dir: PathBuf,
    target_bytes: u64,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(500)) => {
                    let size = directory_size(&data_dir).await;
                    if size >= target_bytes {
                        info!(
                            "🎯 Target volume reached ({}), stopping trial",
                            format_bytes(size)
                        );
                        token.cancel();
                        break;
                    }
                }
            }
        }
    })
}

/// Recursive on-disk size of everything under `path`. Missing directories
/// count as zero; the engine may not have created it yet.
pub async fn directory_size(path: &Path) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.metadata().await {
                Ok(metadata) if metadata.is_dir() => stack.push(entry.path()),
                Ok(metadata) if metadata.is_file() => total += metadata.len(),
                _ => {}
            }
        }
    }
    total
}

/// rmtree with bounded retries; on some filesystems removal races with
/// still-closing file handles.
async fn remove_dir_with_retry(
    path: &Path,
    max_retries: u32,
    delay: Duration,
) -> Result<(), std::io::Error> {
    if !path.exists() {
        return Ok(());
    }

    let mut last_error = None;
    for attempt in 1..=max_retries {
        match fs::remove_dir_all(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                warn!(
                    "Attempt {}/{} to remove {} failed: {}",
                    attempt,
                    max_retries,
                    path.display(),
                    e
                );
                last_error = Some(e);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| std::io::Error::other("directory removal failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::NidPair;
    use crate::infrastructure::external_tool::{ExternalToolError, ToolOutput};
    use async_trait::async_trait;

    /// Writes a fixed-size file per requested item and succeeds.
    struct SyntheticInvoker {
        item_bytes: u64,
    }

    #[async_trait]
    impl ToolInvoker for SyntheticInvoker {
        async fn invoke(&self, batch: &RetrievalBatch) -> Result<ToolOutput, ExternalToolError> {
            for item in &batch.item_names {
                tokio::fs::write(
                    batch.target_directory.join(item),
                    vec![0u8; self.item_bytes as usize],
                )
                .await
                .map_err(ExternalToolError::Launch)?;
            }
            Ok(ToolOutput {
                exit_status: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn workload(data_dir: &Path, batch_count: usize, items_per_batch: usize) -> Vec<RetrievalBatch> {
        (0..batch_count)
            .map(|index| {
                RetrievalBatch::new(
                    index,
                    "AG1".into(),
                    "ARCHIVE".into(),
                    "admin".into(),
                    None,
                    NidPair { primary: 1, secondary: 0 },
                    data_dir.join(format!("g{index}")),
                    (0..items_per_batch)
                        .map(|i| format!("doc{index}_{i}"))
                        .collect(),
                )
            })
            .collect()
    }

    fn harness_config(root: &Path) -> RetrieverConfig {
        let mut config = RetrieverConfig::default();
        config.paths.data_dir = root.join("data");
        config.paths.state_file = root.join("state.json");
        config.performance.concurrency_levels = vec![2, 4];
        // generous target: trials run the whole workload to completion
        config.performance.target_bytes = u64::MAX;
        config
    }

    #[tokio::test]
    async fn sweep_produces_one_record_per_level_with_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = harness_config(dir.path());
        let data_dir = config.paths.data_dir.clone();
        let invoker = Arc::new(SyntheticInvoker { item_bytes: 1024 });

        let harness = PerformanceHarness::new(invoker, config);
        let batches = workload(&data_dir, 4, 8);
        let trials = harness.run_sweep(&batches).await.unwrap();

        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].concurrency, 2);
        assert_eq!(trials[1].concurrency, 4);
        for trial in &trials {
            // 4 batches x 8 items x 1 KB each
            assert_eq!(trial.bytes_transferred, 4 * 8 * 1024);
            assert_eq!(trial.failed_item_count, 0);
            assert!(trial.throughput_mb_per_s >= 0.0);
        }
    }

    #[tokio::test]
    async fn trials_start_clean_and_artifacts_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = harness_config(dir.path());
        let data_dir = config.paths.data_dir.clone();
        let state_file = config.paths.state_file.clone();
        let invoker = Arc::new(SyntheticInvoker { item_bytes: 16 });

        let harness = PerformanceHarness::new(invoker, config);
        let batches = workload(&data_dir, 2, 2);
        harness.run_sweep(&batches).await.unwrap();

        // teardown after the sweep removed both
        assert!(!data_dir.exists());
        assert!(!state_file.exists());
    }

    #[tokio::test]
    async fn directory_size_walks_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(dir.path().join("top"), vec![0u8; 10]).await.unwrap();
        tokio::fs::write(nested.join("deep"), vec![0u8; 32]).await.unwrap();

        assert_eq!(directory_size(dir.path()).await, 42);
    }

    #[tokio::test]
    async fn directory_size_of_missing_path_is_zero() {
        assert_eq!(directory_size(Path::new("/definitely/not/here")).await, 0);
    }
}
