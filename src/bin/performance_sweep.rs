//! Performance sweep binary: run the engine across the configured
//! concurrency levels and write the comparative report.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use arsadmin_retriever::harness::PerformanceHarness;
use arsadmin_retriever::infrastructure::command_source::load_command_file;
use arsadmin_retriever::infrastructure::config::RetrieverConfig;
use arsadmin_retriever::infrastructure::external_tool::ArsAdminInvoker;
use arsadmin_retriever::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::var("ARSRETRIEVER_CONFIG") {
        Ok(path) => RetrieverConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        Err(_) => RetrieverConfig::for_environment("default").context("failed to load config")?,
    };
    init_logging(&config.paths.log_dir)?;

    let invoker = ArsAdminInvoker::new(config.tool.executable.clone());
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

    let report_file = config.performance.report_file.clone();
    let harness = PerformanceHarness::new(Arc::new(invoker), config);
    let trials = harness.run_sweep(&batches).await?;

    let report = serde_json::to_string_pretty(&trials)?;
    if let Some(parent) = report_file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&report_file, report)
        .await
        .with_context(|| format!("failed to write report to {}", report_file.display()))?;

    info!(
        "📝 Performance report with {} trials written to {}",
        trials.len(),
        report_file.display()
    );
    Ok(())
}
