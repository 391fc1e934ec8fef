//! Disk Guard: free-space sampling for admission control
//!
//! A soft, sampled check, not a hard reservation. The engine asks
//! [`DiskGuard::admit`] immediately before launching each worker; below the
//! threshold no new batches start, in-flight batches run to completion.
//! Brief overshoot during a large single-batch download is tolerated.

use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::warn;

/// Seam for tests: answers "what percentage of the volume holding `path` is
/// free?". `None` means the volume could not be resolved.
pub trait FreeSpaceProbe: Send + Sync {
    fn free_space_percent(&self, path: &Path) -> Option<f64>;
}

/// Production probe backed by the sysinfo disk list.
///
/// Picks the disk whose mount point is the longest prefix of the target
/// path, so nested mounts resolve to the correct volume.
pub struct SysinfoProbe;

impl FreeSpaceProbe for SysinfoProbe {
    fn free_space_percent(&self, path: &Path) -> Option<f64> {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();

        let disk = disks
            .list()
            .iter()
            .filter(|d| resolved.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())?;

        let total = disk.total_space();
        if total == 0 {
            return None;
        }
        Some(disk.available_space() as f64 / total as f64 * 100.0)
    }
}

/// Admission gate over a free-space probe.
pub struct DiskGuard {
    path: PathBuf,
    min_free_percent: f64,
    probe: Box<dyn FreeSpaceProbe>,
}

impl DiskGuard {
    pub fn new(path: impl Into<PathBuf>, min_free_percent: f64) -> Self {
        Self::with_probe(path, min_free_percent, Box::new(SysinfoProbe))
    }

    pub fn with_probe(
        path: impl Into<PathBuf>,
        min_free_percent: f64,
        probe: Box<dyn FreeSpaceProbe>,
    ) -> Self {
        Self {
            path: path.into(),
            min_free_percent,
            probe,
        }
    }

    /// Sampled free-space percentage of the volume holding the target path.
    pub fn free_space_percent(&self) -> Option<f64> {
        self.probe.free_space_percent(&self.path)
    }

    /// May more work be admitted right now?
    ///
    /// An unresolvable volume admits with a warning; the guard is a sampled
    /// throttle, not a hard reservation.
    pub fn admit(&self) -> bool {
        match self.free_space_percent() {
            Some(percent) => percent >= self.min_free_percent,
            None => {
                warn!(
                    path = %self.path.display(),
                    "Could not resolve disk stats for target volume, admitting"
                );
                true
            }
        }
    }

    pub fn min_free_percent(&self) -> f64 {
        self.min_free_percent
    }
}
