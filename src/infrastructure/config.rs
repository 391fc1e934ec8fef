//! Retriever configuration
//!
//! Layered loading through the `config` crate: a base file, an optional
//! environment-specific file, then `ARSRETRIEVER__<SECTION>__<KEY>`
//! environment overrides.
//! Every section has defaults matching the production deployment so the
//! binary runs without any file present.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config from file: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Top-level configuration for the retriever and the performance harness.
/// Every section falls back to its default, so partial files are fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub disk: DiskSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub tool: ToolSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Bounded worker pool size.
    pub max_workers: usize,
    /// Upper bound on items in one batch. Enforced upstream, validated here.
    pub items_per_batch_cap: usize,
    /// Seconds between periodic state checkpoints.
    pub checkpoint_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    /// Below this free-space percentage no new batches are admitted.
    pub min_free_space_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Persisted ordered command list produced upstream.
    pub command_file: PathBuf,
    /// Durable execution state checkpoint document.
    pub state_file: PathBuf,
    /// Root directory retrieved documents land under.
    pub data_dir: PathBuf,
    /// Directory for the general and failure log files.
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// External retrieval executable, looked up on PATH when not absolute.
    pub executable: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Worker-pool sizes swept by the harness, in trial order.
    pub concurrency_levels: Vec<usize>,
    /// Per-trial workload target in bytes.
    pub target_bytes: u64,
    /// Where the harness writes its comparative report.
    pub report_file: PathBuf,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_workers: 8,
            items_per_batch_cap: 1000,
            checkpoint_interval_secs: 60,
        }
    }
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            min_free_space_percent: 10.0,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            command_file: PathBuf::from("./out/arsadmin_commands.txt"),
            state_file: PathBuf::from("./out/execution_state.json"),
            data_dir: PathBuf::from("./out/data"),
            log_dir: PathBuf::from("./out/log"),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("arsadmin"),
        }
    }
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            concurrency_levels: vec![2, 4, 8],
            target_bytes: 5 * 1024 * 1024 * 1024,
            report_file: PathBuf::from("./out/performance_report.json"),
        }
    }
}

impl RetrieverConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(env_source())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Base file plus optional `config/<env>` overlay, then env overrides.
    pub fn for_environment(env: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(env_source())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.max_workers == 0 {
            return Err(ConfigError::Validation {
                message: "execution.max_workers must be greater than 0".to_string(),
            });
        }

        if self.execution.items_per_batch_cap == 0 || self.execution.items_per_batch_cap > 1000 {
            return Err(ConfigError::Validation {
                message: "execution.items_per_batch_cap must be in 1..=1000".to_string(),
            });
        }

        if !(0.0..=100.0).contains(&self.disk.min_free_space_percent) {
            return Err(ConfigError::Validation {
                message: "disk.min_free_space_percent must be in 0..=100".to_string(),
            });
        }

        if self.performance.concurrency_levels.iter().any(|&c| c == 0) {
            return Err(ConfigError::Validation {
                message: "performance.concurrency_levels entries must be greater than 0"
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.execution.checkpoint_interval_secs)
    }
}

/// Environment overrides shaped `ARSRETRIEVER__<SECTION>__<KEY>`. The prefix
/// separator must be set explicitly; the default is a single underscore.
fn env_source() -> config::Environment {
    config::Environment::with_prefix("ARSRETRIEVER")
        .prefix_separator("__")
        .separator("__")
}
