//! External retrieval tool invocation
//!
//! The retrieval tool is an opaque external program. One invocation per
//! attempt, blocking until its own completion; no timeout is imposed here.
//! The invoker is a trait seam so the engine and the performance harness can
//! run against a scripted stand-in in tests.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::domain::batch::RetrievalBatch;

#[derive(Debug, Error)]
pub enum ExternalToolError {
    /// The executable does not exist at all. Raised by the startup probe;
    /// an environment problem no retry can fix.
    #[error("Retrieval tool executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("Failed to launch retrieval tool: {0}")]
    Launch(#[source] std::io::Error),
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// None when the process died to a signal.
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the engine and the external program.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run one invocation over the batch and capture its outcome. The
    /// target directory is guaranteed to exist by the caller.
    async fn invoke(&self, batch: &RetrievalBatch) -> Result<ToolOutput, ExternalToolError>;
}

/// Production invoker wrapping the `arsadmin` binary.
pub struct ArsAdminInvoker {
    executable: PathBuf,
}

impl ArsAdminInvoker {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Fail-fast startup check: spawn the bare executable once and reap it.
    /// Any spawn result other than NotFound proves the binary is present.
    pub async fn probe(&self) -> Result<(), ExternalToolError> {
        match Command::new(&self.executable)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut child) => {
                let _ = child.wait().await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExternalToolError::ExecutableNotFound(self.executable.clone()))
            }
            Err(e) => Err(ExternalToolError::Launch(e)),
        }
    }

    /// Arguments for `arsadmin retrieve` over one batch.
    fn build_args(batch: &RetrievalBatch) -> Vec<String> {
        let mut args = vec![
            "retrieve".to_string(),
            "-I".to_string(),
            batch.instance.clone(),
            "-u".to_string(),
            batch.user.clone(),
        ];
        if let Some(password) = &batch.password {
            args.push("-p".to_string());
            args.push(password.clone());
        }
        args.extend([
            "-g".to_string(),
            batch.group_id.clone(),
            "-n".to_string(),
            batch.nid_pair.to_string(),
            "-d".to_string(),
            batch.target_directory.display().to_string(),
        ]);
        args.extend(batch.item_names.iter().cloned());
        args
    }

    /// Command line for log output with the password masked.
    pub fn redacted_command_line(&self, batch: &RetrievalBatch) -> String {
        let mut rendered = vec![self.executable.display().to_string()];
        let mut args = Self::build_args(batch).into_iter();
        while let Some(arg) = args.next() {
            if arg == "-p" {
                rendered.push("-p".to_string());
                rendered.push("******".to_string());
                args.next();
            } else {
                rendered.push(arg);
            }
        }
        rendered.join(" ")
    }
}

#[async_trait]
impl ToolInvoker for ArsAdminInvoker {
    async fn invoke(&self, batch: &RetrievalBatch) -> Result<ToolOutput, ExternalToolError> {
        debug!("Executing: {}", self.redacted_command_line(batch));

        let output = Command::new(&self.executable)
            .args(Self::build_args(batch))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ExternalToolError::ExecutableNotFound(self.executable.clone())
                }
                _ => ExternalToolError::Launch(e),
            })?;

        Ok(ToolOutput {
            exit_status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
