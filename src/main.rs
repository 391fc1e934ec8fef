//! Retriever binary: load config, run the engine over the persisted command
//! list, report a summary. Always exits cleanly with a summary even when
//! some items failed; only environment problems (missing tool executable,
//! unreadable command file) abort the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use arsadmin_retriever::domain::summary::format_bytes;
use arsadmin_retriever::engine::{RetrievalEngine, StateStore};
use arsadmin_retriever::infrastructure::command_source::load_command_file;
use arsadmin_retriever::infrastructure::config::RetrieverConfig;
use arsadmin_retriever::infrastructure::disk_guard::DiskGuard;
use arsadmin_retriever::infrastructure::external_tool::ArsAdminInvoker;
use arsadmin_retriever::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.paths.log_dir)?;

    let invoker = ArsAdminInvoker::new(config.tool.executable.clone());
    // Fail fast when the executable is entirely absent; no batch can work.
    invoker
        .probe()
        .await
        .context("retrieval tool is not runnable")?;

    let batches = load_command_file(
        &config.paths.command_file,
        config.execution.items_per_batch_cap,
    )
    .await
    .context("failed to load the command list")?;

    let state = Arc::new(
        StateStore::load(&config.paths.state_file)
            .await
            .context("failed to load execution state")?,
    );
    let disk_guard = Arc::new(DiskGuard::new(
        config.paths.data_dir.clone(),
        config.disk.min_free_space_percent,
    ));

    let engine = RetrievalEngine::new(
        Arc::new(invoker),
        disk_guard,
        Arc::clone(&state),
        config.execution.max_workers,
    );

    // Graceful stop on ctrl-c: in-flight invocations finish, then the
    // engine checkpoints before returning.
    let cancel = engine.cancellation_token();
    let checkpoint_task =
        state.spawn_periodic_checkpoint(config.checkpoint_interval(), cancel.clone());
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 Stop requested, letting in-flight batches finish");
                cancel.cancel();
            }
        }
    });

    let summary = engine.run(&batches).await?;
    cancel.cancel();
    let _ = checkpoint_task.await;
    state.checkpoint().await?;

    info!(
        "Run summary: {} transferred, {} batches completed, {} abandoned, {} permanently failed items{}",
        format_bytes(summary.total_bytes_transferred),
        summary.completed_batches,
        summary.abandoned_batches,
        summary.failed_item_count(),
        if summary.stopped_early { " (stopped early, resumable)" } else { "" }
    );

    Ok(())
}

fn load_config() -> Result<RetrieverConfig> {
    match std::env::var("ARSRETRIEVER_CONFIG") {
        Ok(path) => RetrieverConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}")),
        Err(_) => RetrieverConfig::for_environment("default").context("failed to load config"),
    }
}
