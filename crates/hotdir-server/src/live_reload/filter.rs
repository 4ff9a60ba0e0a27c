//! Classification of raw watch callbacks.
//!
//! A watch backend reports far more than user edits: every path seen during
//! the initial scan, summary events, and transient deletion artifacts. Only
//! callbacks that compare a known previous state with a live current state
//! count as a change worth reloading for.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Metadata snapshot of a single filesystem entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
    /// Hard link count. Zero means the entry is unlinked.
    pub nlink: u64,
}

impl FileStat {
    /// Build a snapshot from filesystem metadata.
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            is_dir: metadata.is_dir(),
            len: metadata.len(),
            modified: metadata.modified().ok(),
            nlink: link_count(metadata),
        }
    }

    /// Read the current snapshot of `path` without following symlinks.
    ///
    /// Returns `None` if the entry does not exist or cannot be read.
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        fs::symlink_metadata(path)
            .ok()
            .map(|metadata| Self::from_metadata(&metadata))
    }
}

#[cfg(unix)]
fn link_count(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn link_count(_metadata: &Metadata) -> u64 {
    1
}

/// What a raw callback is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeTarget {
    /// A single path.
    Path(PathBuf),
    /// A summary of many paths (initial scan, rescan request).
    Batch,
}

/// One raw watch callback: `(target, current, previous)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawChange {
    pub target: ChangeTarget,
    pub current: Option<FileStat>,
    pub previous: Option<FileStat>,
}

impl RawChange {
    /// Callback for a single path.
    #[must_use]
    pub fn path(
        path: impl Into<PathBuf>,
        current: Option<FileStat>,
        previous: Option<FileStat>,
    ) -> Self {
        Self {
            target: ChangeTarget::Path(path.into()),
            current,
            previous,
        }
    }

    /// Summary callback without metadata.
    #[must_use]
    pub fn batch() -> Self {
        Self {
            target: ChangeTarget::Batch,
            current: None,
            previous: None,
        }
    }
}

/// Why a callback was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseReason {
    /// Summary event carrying no metadata.
    StartupBatch,
    /// Summary event carrying metadata; no single path to attribute it to.
    AmbiguousBatch,
    /// First observation of a path.
    NewlyTracked,
    /// Entry still resolvable but no longer linked.
    Unlinked,
}

/// Result of classifying a raw callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Noise(NoiseReason),
    RealChange,
}

impl Classification {
    #[must_use]
    pub fn is_real_change(self) -> bool {
        self == Self::RealChange
    }
}

/// Classify a raw watch callback.
///
/// Rules apply in order; the first match wins.
#[must_use]
pub fn classify(change: &RawChange) -> Classification {
    if change.target == ChangeTarget::Batch {
        return if change.current.is_none() && change.previous.is_none() {
            Classification::Noise(NoiseReason::StartupBatch)
        } else {
            Classification::Noise(NoiseReason::AmbiguousBatch)
        };
    }

    if change.previous.is_none() {
        return Classification::Noise(NoiseReason::NewlyTracked);
    }

    if change.current.is_some_and(|stat| stat.nlink == 0) {
        return Classification::Noise(NoiseReason::Unlinked);
    }

    Classification::RealChange
}
