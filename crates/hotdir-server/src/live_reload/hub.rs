//! Live reload session registry.
//!
//! Tracks connected browser sessions, starts the file watcher on the first
//! connection, and fans every change out to all sessions.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::lock;
use super::watcher::{ChangeCallback, WatchConfig, WatchError, Watcher};

/// Message pushed to connected clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// Reload the whole page.
    Reload,
}

/// Identifier of one connected session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receiving end of one session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    rx: mpsc::UnboundedReceiver<ReloadMessage>,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the next message. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<ReloadMessage> {
        self.rx.recv().await
    }

    /// Take a pending message without waiting.
    pub fn try_recv(&mut self) -> Option<ReloadMessage> {
        self.rx.try_recv().ok()
    }
}

/// Lifecycle of the hub's file watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    /// No client has connected yet.
    NotStarted,
    /// A start was attempted. `failed` records whether it errored.
    Running { failed: bool },
}

/// A running watch that can be stopped.
pub trait WatchHandle: Send {
    fn stop(self: Box<Self>);
}

impl WatchHandle for Watcher {
    fn stop(self: Box<Self>) {
        Watcher::stop(*self);
    }
}

/// Starts the hub's watcher.
pub trait WatchStarter: Send + Sync {
    /// Begin watching `root`, calling `on_change` on every real change.
    fn start(
        &self,
        root: &Path,
        config: &WatchConfig,
        on_change: ChangeCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError>;
}

/// [`WatchStarter`] backed by the filesystem [`Watcher`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FsWatchStarter;

impl WatchStarter for FsWatchStarter {
    fn start(
        &self,
        root: &Path,
        config: &WatchConfig,
        on_change: ChangeCallback,
    ) -> Result<Box<dyn WatchHandle>, WatchError> {
        let watcher = Watcher::start(root, config, on_change)?;
        Ok(Box::new(watcher))
    }
}

/// Watcher state together with the handle it owns.
struct WatchSlot {
    state: WatcherState,
    handle: Option<Box<dyn WatchHandle>>,
}

/// Coordinates sessions and the lazily started watcher.
pub struct ReloadHub {
    watch_root: PathBuf,
    watch_config: WatchConfig,
    starter: Arc<dyn WatchStarter>,
    sessions: Mutex<HashMap<SessionId, mpsc::UnboundedSender<ReloadMessage>>>,
    watch: Mutex<WatchSlot>,
    this: Weak<ReloadHub>,
}

impl ReloadHub {
    /// Create a hub that watches `watch_root` with the filesystem watcher.
    #[must_use]
    pub fn new(watch_root: PathBuf, watch_config: WatchConfig) -> Arc<Self> {
        Self::with_starter(watch_root, watch_config, Arc::new(FsWatchStarter))
    }

    /// Create a hub with a custom watcher starter.
    #[must_use]
    pub fn with_starter(
        watch_root: PathBuf,
        watch_config: WatchConfig,
        starter: Arc<dyn WatchStarter>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            watch_root,
            watch_config,
            starter,
            sessions: Mutex::new(HashMap::new()),
            watch: Mutex::new(WatchSlot {
                state: WatcherState::NotStarted,
                handle: None,
            }),
            this: Weak::clone(this),
        })
    }

    /// Register a new session.
    ///
    /// The first call ever also starts the watcher. Blocks for the duration
    /// of the initial scan, so async callers should run it on a blocking
    /// thread.
    pub fn connect(&self) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        lock(&self.sessions).insert(id, tx);
        tracing::debug!(session = %id, "Live reload client connected");

        self.ensure_watcher();

        Session { id, rx }
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn disconnect(&self, id: SessionId) {
        if lock(&self.sessions).remove(&id).is_some() {
            tracing::debug!(session = %id, "Live reload client disconnected");
        }
    }

    /// Send a reload message to every connected session.
    ///
    /// Delivery is best-effort: a failed send is skipped and the session is
    /// kept until it disconnects. Returns the number of deliveries.
    pub fn broadcast(&self) -> usize {
        let targets: Vec<_> = lock(&self.sessions)
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            if tx.send(ReloadMessage::Reload).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(session = %id, "Dropped reload for closed session");
            }
        }

        tracing::info!(sessions = delivered, "Reload broadcast");
        delivered
    }

    /// Stop the watcher, if one is running.
    pub fn stop(&self) {
        let handle = lock(&self.watch).handle.take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    /// Number of connected sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    #[must_use]
    pub fn watcher_state(&self) -> WatcherState {
        lock(&self.watch).state
    }

    /// Start the watcher unless a start was already attempted.
    ///
    /// Runs entirely under the watch lock so concurrent first connections
    /// start at most one watcher.
    fn ensure_watcher(&self) {
        let mut slot = lock(&self.watch);
        if slot.state != WatcherState::NotStarted {
            return;
        }

        tracing::debug!(root = %self.watch_root.display(), "Creating change watcher");

        let hub = Weak::clone(&self.this);
        let on_change: ChangeCallback = Arc::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.broadcast();
            }
        });

        match self
            .starter
            .start(&self.watch_root, &self.watch_config, on_change)
        {
            Ok(handle) => {
                slot.handle = Some(handle);
                slot.state = WatcherState::Running { failed: false };
            }
            Err(e) => {
                tracing::warn!(
                    root = %self.watch_root.display(),
                    error = %e,
                    "Live reload disabled: cannot watch directory"
                );
                slot.state = WatcherState::Running { failed: true };
            }
        }
    }
}
