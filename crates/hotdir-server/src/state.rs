//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tower_http::services::ServeDir;

use crate::live_reload::ReloadHub;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Canonical served root.
    pub(crate) root: PathBuf,
    /// Index file names tried for directory requests.
    pub(crate) index: Vec<String>,
    /// Serve dot-prefixed entries.
    pub(crate) hidden: bool,
    /// File service rooted at `root`. Index resolution happens before it.
    pub(crate) files: ServeDir,
    /// Live reload hub (if enabled).
    pub(crate) live_reload: Option<Arc<ReloadHub>>,
}

impl AppState {
    pub(crate) fn new(
        root: PathBuf,
        index: Vec<String>,
        hidden: bool,
        live_reload: Option<Arc<ReloadHub>>,
    ) -> Self {
        let files = ServeDir::new(&root).append_index_html_on_directories(false);
        Self {
            root,
            index,
            hidden,
            files,
            live_reload,
        }
    }
}
