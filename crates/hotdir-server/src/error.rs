//! Server errors.

use std::io;
use std::path::PathBuf;

/// Error starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Served root is missing or unreadable.
    #[error("Cannot serve {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Binding the requested address failed.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Every port from the base port upward is taken.
    #[error("No free port on {host} at or above {base_port}")]
    NoFreePort { host: String, base_port: u16 },
    /// I/O error while serving.
    #[error(transparent)]
    Io(#[from] io::Error),
}
