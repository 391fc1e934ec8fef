//! Logging system configuration and initialization
//!
//! Dual-output tracing setup:
//! - Console plus a rolling general log file (`retriever.log`)
//! - A dedicated failure log (`failures.jsonl`) carrying one structured JSON
//!   record per terminal failure outcome, sufficient for offline triage
//!   without re-running anything
//!
//! Failure records are emitted with `target: FAILURE_TARGET` and routed to
//! their own file by a per-layer filter; they never clutter the general log
//! beyond the usual error line.

use std::path::Path;

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    filter::filter_fn,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Event target for structured terminal-failure records.
pub const FAILURE_TARGET: &str = "retriever::failure_log";

// Keep the non-blocking writers alive for the process lifetime.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Initialize console, general-file and failure-file logging.
///
/// `RUST_LOG` overrides the default `info` filter for console and general
/// file output. The failure log is unfiltered by level; it receives exactly
/// the events addressed to [`FAILURE_TARGET`].
pub fn init_logging(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| anyhow!("Failed to create log directory {}: {}", log_dir.display(), e))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (general_writer, general_guard) =
        non_blocking(rolling::daily(log_dir, "retriever.log"));
    let (failure_writer, failure_guard) =
        non_blocking(rolling::never(log_dir, "failures.jsonl"));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(filter_fn(|meta| meta.target() != FAILURE_TARGET));

    let general_layer = fmt::layer()
        .with_writer(general_writer)
        .with_ansi(false)
        .with_filter(filter_fn(|meta| meta.target() != FAILURE_TARGET));

    let failure_layer = fmt::layer()
        .json()
        .with_writer(failure_writer)
        .with_ansi(false)
        .with_filter(filter_fn(|meta| meta.target() == FAILURE_TARGET));

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(general_layer)
        .with(failure_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let mut guards = LOG_GUARDS
        .lock()
        .map_err(|_| anyhow!("Log guard mutex poisoned"))?;
    guards.push(general_guard);
    guards.push(failure_guard);

    tracing::info!("📁 Logging initialized, log dir: {}", log_dir.display());
    Ok(())
}
