//! Live reload.
//!
//! Watches the served tree, filters watcher noise, and tells every connected
//! browser session to reload when a real change lands.

mod filter;
mod hub;
mod inject;
mod watcher;
mod websocket;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use filter::{ChangeTarget, Classification, FileStat, NoiseReason, RawChange, classify};
pub use hub::{
    FsWatchStarter, ReloadHub, ReloadMessage, Session, SessionId, WatchHandle, WatchStarter,
    WatcherState,
};
pub use inject::{SNIPPET, inject_into};
pub use watcher::{ChangeCallback, WatchConfig, WatchError, Watcher};

pub(crate) use inject::inject_snippet;
pub(crate) use websocket::{client_script, ws_handler};

/// WebSocket endpoint for reload notifications.
pub const WS_PATH: &str = "/__hotdir/ws";

/// Client script served to injected pages.
pub const SCRIPT_PATH: &str = "/__hotdir/livereload.js";

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
