//! RetrievalBatch: one unit of work submitted to the external retrieval tool
//!
//! A batch groups documents that share an OnDemand application group,
//! instance, user and storage-node identifier pair. Item order matters: the
//! external tool processes items front to back and stops at the first
//! unrecoverable one, so resumption after corruption is a suffix of the
//! original ordering.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Primary/secondary storage-node identifier pair scoping a batch.
///
/// Rendered as `primary-secondary` on the tool command line (`-n 5-0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NidPair {
    pub primary: u32,
    pub secondary: u32,
}

impl fmt::Display for NidPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.primary, self.secondary)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid nid pair '{0}', expected '<primary>-<secondary>'")]
pub struct ParseNidPairError(pub String);

impl FromStr for NidPair {
    type Err = ParseNidPairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (primary, secondary) = s
            .split_once('-')
            .ok_or_else(|| ParseNidPairError(s.to_string()))?;
        let primary = primary
            .parse()
            .map_err(|_| ParseNidPairError(s.to_string()))?;
        let secondary = secondary
            .parse()
            .map_err(|_| ParseNidPairError(s.to_string()))?;
        Ok(Self { primary, secondary })
    }
}

/// One invocation's worth of item requests.
///
/// Created by the upstream command generator or derived from a failed parent
/// batch. `source_index` is the position of the originating command in the
/// persisted command list and is shared by every batch in a derived chain;
/// it is the key the state store uses for resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalBatch {
    pub id: Uuid,
    /// Parent batch when this is a derived suffix, forming a forward chain.
    pub parent_id: Option<Uuid>,
    /// Position in the original command list.
    pub source_index: usize,
    /// How many derivations deep this batch is (0 for an original command).
    pub derived_depth: u32,
    /// OnDemand application group name (`-g`).
    pub group_id: String,
    /// OnDemand instance (`-I`).
    pub instance: String,
    /// Credential user (`-u`).
    pub user: String,
    /// Optional credential password (`-p`). Never logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub nid_pair: NidPair,
    pub target_directory: PathBuf,
    /// Ordered document names, 0..=1000. Order is load-bearing.
    pub item_names: Vec<String>,
}

impl RetrievalBatch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_index: usize,
        group_id: String,
        instance: String,
        user: String,
        password: Option<String>,
        nid_pair: NidPair,
        target_directory: PathBuf,
        item_names: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            source_index,
            derived_depth: 0,
            group_id,
            instance,
            user,
            password,
            nid_pair,
            target_directory,
            item_names,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_names.len()
    }

    /// Position of `item` in this batch's ordering, if present.
    pub fn position_of(&self, item: &str) -> Option<usize> {
        self.item_names.iter().position(|name| name == item)
    }

    /// Derive the continuation batch containing the items strictly after
    /// position `index`, carrying forward group/instance/user/nid_pair and
    /// target directory. Returns `None` when nothing remains.
    pub fn derive_suffix_after(&self, index: usize) -> Option<RetrievalBatch> {
        let rest = self.item_names.get(index + 1..)?;
        if rest.is_empty() {
            return None;
        }
        Some(RetrievalBatch {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            source_index: self.source_index,
            derived_depth: self.derived_depth + 1,
            group_id: self.group_id.clone(),
            instance: self.instance.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            nid_pair: self.nid_pair,
            target_directory: self.target_directory.clone(),
            item_names: rest.to_vec(),
        })
    }

    /// Short identifier for log lines: `source_index:depth`.
    pub fn log_key(&self) -> String {
        format!("{}:{}", self.source_index, self.derived_depth)
    }
}
