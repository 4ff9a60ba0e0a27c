//! Filesystem watcher for live reload.
//!
//! Wraps a recursive `notify` watch on one root directory. Every path the
//! backend reports is compared against a metadata snapshot, turned into a
//! [`RawChange`], and classified; the change callback fires once per real
//! change.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hotdir_config::WatchBackend;
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher as _};

use super::filter::{Classification, FileStat, RawChange, classify};
use super::lock;

/// Callback invoked on every real change. Runs on the watch backend's thread.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Default polling interval in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Watch settings.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Observe dot-prefixed entries.
    pub include_hidden: bool,
    /// Polling granularity for [`WatchBackend::Poll`].
    pub poll_interval: Duration,
    /// Watch mechanism.
    pub backend: WatchBackend,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            include_hidden: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backend: WatchBackend::Poll,
        }
    }
}

/// Error starting a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Root is missing, unreadable, or not a directory.
    #[error("watch root {} is not accessible: {source}", .path.display())]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Watch backend failure.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// A running recursive watch. Dropping it stops the backend.
pub struct Watcher {
    backend: Box<dyn notify::Watcher + Send>,
    root: PathBuf,
}

impl Watcher {
    /// Start watching `root`.
    ///
    /// Performs the initial scan synchronously; the returned watcher reports
    /// only changes made after this call.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not an accessible directory or the
    /// backend cannot be attached.
    pub fn start(
        root: &Path,
        config: &WatchConfig,
        on_change: ChangeCallback,
    ) -> Result<Self, WatchError> {
        let root = fs::canonicalize(root).map_err(|source| WatchError::RootUnavailable {
            path: root.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(WatchError::RootUnavailable {
                path: root,
                source: std::io::Error::from(std::io::ErrorKind::NotADirectory),
            });
        }

        let tracker = Arc::new(ChangeTracker::new(
            root.clone(),
            config.include_hidden,
            on_change,
        ));
        let tracked = tracker.scan();

        let handler_tracker = Arc::clone(&tracker);
        let handler = move |res: notify::Result<Event>| handler_tracker.handle(res);

        let mut backend: Box<dyn notify::Watcher + Send> = match config.backend {
            // Poll mtimes have one-second resolution; content hashes catch
            // faster edits
            WatchBackend::Poll => Box::new(PollWatcher::new(
                handler,
                notify::Config::default()
                    .with_poll_interval(config.poll_interval)
                    .with_compare_contents(true),
            )?),
            WatchBackend::Native => {
                Box::new(RecommendedWatcher::new(handler, notify::Config::default())?)
            }
        };
        backend.watch(&root, RecursiveMode::Recursive)?;

        // Edits made between the first scan and attaching the backend
        let missed = tracker.scan();

        tracing::info!(
            root = %root.display(),
            backend = ?config.backend,
            tracked,
            missed,
            "File watcher started"
        );

        Ok(Self { backend, root })
    }

    /// Canonical watched directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching and release the backend.
    pub fn stop(mut self) {
        if let Err(e) = self.backend.unwatch(&self.root) {
            tracing::debug!(error = %e, "Failed to unwatch root");
        }
        tracing::info!(root = %self.root.display(), "File watcher stopped");
    }
}

/// Per-path metadata snapshot feeding the change filter.
struct ChangeTracker {
    root: PathBuf,
    include_hidden: bool,
    snapshot: Mutex<HashMap<PathBuf, FileStat>>,
    on_change: ChangeCallback,
}

impl ChangeTracker {
    fn new(root: PathBuf, include_hidden: bool, on_change: ChangeCallback) -> Self {
        Self {
            root,
            include_hidden,
            snapshot: Mutex::new(HashMap::new()),
            on_change,
        }
    }

    /// Record every existing file, then report the summary event.
    ///
    /// Files seen for the first time classify as noise, so the first scan is
    /// silent. Later scans report files whose metadata moved since they were
    /// last recorded. Returns the number of changed entries.
    fn scan(&self) -> usize {
        let walker = ignore::WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(!self.include_hidden)
            .build();

        let mut changed = 0;
        for entry in walker.filter_map(Result::ok) {
            if let Some(change) = self.record(entry.into_path()) {
                self.dispatch(&change);
                changed += 1;
            }
        }
        self.dispatch(&RawChange::batch());
        changed
    }

    /// Handle one backend callback.
    fn handle(&self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "File watcher error");
                return;
            }
        };

        if event.need_rescan() {
            self.dispatch(&RawChange::batch());
            return;
        }
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        for path in event.paths {
            if !self.include_hidden && self.is_hidden(&path) {
                continue;
            }
            if let Some(change) = self.record(path) {
                self.dispatch(&change);
            }
        }
    }

    /// Update the snapshot for `path`.
    ///
    /// Only files are tracked; directory entries change whenever their
    /// children do and never produce a change of their own. A tracked file
    /// that disappears is reported with its last stat and a zero link count.
    /// Returns `None` when nothing changed.
    fn record(&self, path: PathBuf) -> Option<RawChange> {
        let current = FileStat::read(&path).filter(|stat| !stat.is_dir);
        let mut snapshot = lock(&self.snapshot);

        match current {
            Some(stat) => {
                let previous = snapshot.insert(path.clone(), stat);
                (previous != Some(stat)).then(|| RawChange::path(path, Some(stat), previous))
            }
            None => {
                let previous = snapshot.remove(&path)?;
                let unlinked = FileStat { nlink: 0, ..previous };
                Some(RawChange::path(path, Some(unlinked), Some(previous)))
            }
        }
    }

    fn dispatch(&self, change: &RawChange) {
        match classify(change) {
            Classification::RealChange => {
                tracing::debug!(path = ?change.target, "Change detected");
                (self.on_change)();
            }
            Classification::Noise(reason) => {
                tracing::trace!(path = ?change.target, ?reason, "Ignored watch event");
            }
        }
    }

    /// Whether any component below the root is dot-prefixed.
    fn is_hidden(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        relative.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }
}
