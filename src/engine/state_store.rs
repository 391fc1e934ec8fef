//! Execution State Store: durable, resumable run ledger
//!
//! One pretty-printed JSON checkpoint document, human-inspectable for manual
//! recovery. `next_unprocessed_index` advances only over the contiguous
//! prefix of terminally-recorded batches, never speculatively. Batches that
//! were in flight when the process died are simply not in the set and re-run
//! from scratch on resume (at-least-once semantics).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted ledger. Keys are positions in the original command list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    /// First index whose batch has no recorded terminal outcome.
    pub next_unprocessed_index: usize,
    /// Source indices with a terminal outcome (completed, abandoned, or a
    /// fully drained retry chain).
    pub completed_batches: BTreeSet<usize>,
    /// Item name -> last error detail for permanently failed items.
    pub failed_items: BTreeMap<String, String>,
    pub last_checkpoint_time: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn is_terminal(&self, source_index: usize) -> bool {
        self.completed_batches.contains(&source_index)
    }

    fn advance_next_index(&mut self) {
        while self.completed_batches.contains(&self.next_unprocessed_index) {
            self.next_unprocessed_index += 1;
        }
    }
}

/// Durable store around [`ExecutionState`].
///
/// The engine scheduler is the single writer during a run; the async mutex
/// here serializes it against the periodic checkpoint task.
pub struct StateStore {
    state_file: PathBuf,
    state: Mutex<ExecutionState>,
}

impl StateStore {
    /// Load prior state, or start empty when no file exists yet.
    pub async fn load(state_file: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let state_file = state_file.into();
        let state = match fs::read_to_string(&state_file).await {
            Ok(content) => {
                let state: ExecutionState =
                    serde_json::from_str(&content).map_err(|source| StateStoreError::Corrupt {
                        path: state_file.clone(),
                        source,
                    })?;
                info!(
                    "🔁 Loaded execution state: {} terminal batches, {} failed items, next index {}",
                    state.completed_batches.len(),
                    state.failed_items.len(),
                    state.next_unprocessed_index
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No prior state at {}, starting fresh", state_file.display());
                ExecutionState::default()
            }
            Err(source) => {
                return Err(StateStoreError::Read {
                    path: state_file,
                    source,
                })
            }
        };

        Ok(Self {
            state_file,
            state: Mutex::new(state),
        })
    }

    /// Record a batch chain as terminal and advance the contiguous prefix.
    pub async fn record_terminal(&self, source_index: usize) {
        let mut state = self.state.lock().await;
        state.completed_batches.insert(source_index);
        state.advance_next_index();
    }

    /// Record one permanently failed item with its last error detail.
    pub async fn record_failed_item(&self, item: &str, detail: &str) {
        let mut state = self.state.lock().await;
        state
            .failed_items
            .insert(item.to_string(), detail.to_string());
    }

    pub async fn is_terminal(&self, source_index: usize) -> bool {
        self.state.lock().await.is_terminal(source_index)
    }

    pub async fn snapshot(&self) -> ExecutionState {
        self.state.lock().await.clone()
    }

    /// Indices from the command list that still need running, in original
    /// order. In-flight-at-crash batches have no terminal record and are
    /// included again.
    pub async fn pending_indices(&self, total_batches: usize) -> Vec<usize> {
        let state = self.state.lock().await;
        (0..total_batches)
            .filter(|index| !state.is_terminal(*index))
            .collect()
    }

    /// Durable flush: serialize to a sibling temp file, then rename over the
    /// checkpoint so a crash mid-write never corrupts the previous one.
    pub async fn checkpoint(&self) -> Result<(), StateStoreError> {
        let serialized = {
            let mut state = self.state.lock().await;
            state.last_checkpoint_time = Some(Utc::now());
            serde_json::to_string_pretty(&*state)?
        };

        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StateStoreError::Write {
                    path: self.state_file.clone(),
                    source,
                })?;
        }

        let tmp_path = self.state_file.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .await
            .map_err(|source| StateStoreError::Write {
                path: tmp_path.clone(),
                source,
            })?;
        fs::rename(&tmp_path, &self.state_file)
            .await
            .map_err(|source| StateStoreError::Write {
                path: self.state_file.clone(),
                source,
            })?;

        debug!("💾 State checkpointed to {}", self.state_file.display());
        Ok(())
    }

    /// Background task flushing the state at a bounded cadence until the
    /// token fires. The caller still owes one final explicit checkpoint.
    pub fn spawn_periodic_checkpoint(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = store.checkpoint().await {
                            error!("Periodic checkpoint failed: {}", e);
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        })
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }
}
