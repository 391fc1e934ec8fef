//! Upstream command source
//!
//! Reads the persisted ordered command list produced by the upstream
//! generator, one full `arsadmin retrieve` invocation per line:
//!
//! ```text
//! arsadmin retrieve -I ARCHIVE -u admin -g AG1 -n 5-0 -d ./out/data/ag1 doc1 doc2 ...
//! ```
//!
//! The engine only ever reads this list. Each parsed line becomes one
//! [`RetrievalBatch`] carrying its line position as `source_index`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::domain::batch::{NidPair, RetrievalBatch};

#[derive(Debug, Error)]
pub enum CommandSourceError {
    #[error("Failed to read command file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command line {line}: missing required flag {flag}")]
    MissingFlag { line: usize, flag: &'static str },

    #[error("Command line {line}: flag {flag} has no value")]
    MissingValue { line: usize, flag: &'static str },

    #[error("Command line {line}: invalid nid pair: {detail}")]
    InvalidNidPair { line: usize, detail: String },

    #[error("Command line {line}: {count} items exceeds the per-batch cap of {cap}")]
    TooManyItems { line: usize, count: usize, cap: usize },
}

/// Load and parse the command file into ordered batches.
///
/// `items_per_batch_cap` is enforced upstream but respected here: a line
/// exceeding it is a generator bug and fails the load rather than silently
/// over-filling an invocation.
pub async fn load_command_file(
    path: &Path,
    items_per_batch_cap: usize,
) -> Result<Vec<RetrievalBatch>, CommandSourceError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| CommandSourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mut batches = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let batch = parse_command_line(batches.len(), line_no + 1, line, items_per_batch_cap)?;
        batches.push(batch);
    }

    info!("📋 Loaded {} commands from {}", batches.len(), path.display());
    Ok(batches)
}

/// Parse one `arsadmin retrieve` command line.
///
/// Flags: `-I` instance, `-u` user, `-p` password (optional), `-g` group,
/// `-n` primary-secondary nid pair, `-d` target directory. Everything after
/// the `-d` value is the ordered item list. An empty item list is a valid
/// degenerate batch.
fn parse_command_line(
    source_index: usize,
    line: usize,
    text: &str,
    items_per_batch_cap: usize,
) -> Result<RetrievalBatch, CommandSourceError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let mut instance = None;
    let mut user = None;
    let mut password = None;
    let mut group = None;
    let mut nid = None;
    let mut target_directory = None;
    let mut items = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match token {
            "-I" | "-u" | "-p" | "-g" | "-n" | "-d" => {
                let value = tokens.get(i + 1).copied().ok_or({
                    CommandSourceError::MissingValue {
                        line,
                        flag: flag_name(token),
                    }
                })?;
                match token {
                    "-I" => instance = Some(value.to_string()),
                    "-u" => user = Some(value.to_string()),
                    "-p" => password = Some(value.to_string()),
                    "-g" => group = Some(value.to_string()),
                    "-n" => nid = Some(value.to_string()),
                    _ => target_directory = Some(PathBuf::from(value)),
                }
                i += 2;
                // Item names follow the -d value.
                if token == "-d" {
                    items = tokens[i..].iter().map(|s| s.to_string()).collect();
                    break;
                }
            }
            _ => i += 1,
        }
    }

    let nid_text = nid.ok_or(CommandSourceError::MissingFlag { line, flag: "-n" })?;
    let nid_pair: NidPair = nid_text
        .parse()
        .map_err(|e: crate::domain::batch::ParseNidPairError| {
            CommandSourceError::InvalidNidPair {
                line,
                detail: e.to_string(),
            }
        })?;

    if items.len() > items_per_batch_cap {
        return Err(CommandSourceError::TooManyItems {
            line,
            count: items.len(),
            cap: items_per_batch_cap,
        });
    }

    Ok(RetrievalBatch::new(
        source_index,
        group.ok_or(CommandSourceError::MissingFlag { line, flag: "-g" })?,
        instance.ok_or(CommandSourceError::MissingFlag { line, flag: "-I" })?,
        user.ok_or(CommandSourceError::MissingFlag { line, flag: "-u" })?,
        password,
        nid_pair,
        target_directory.ok_or(CommandSourceError::MissingFlag { line, flag: "-d" })?,
        items,
    ))
}

fn flag_name(token: &str) -> &'static str {
    match token {
        "-I" => "-I",
        "-u" => "-u",
        "-p" => "-p",
        "-g" => "-g",
        "-n" => "-n",
        _ => "-d",
    }
}
