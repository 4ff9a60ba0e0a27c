//! `hotdir` serve command implementation.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use hotdir_config::{CliSettings, Config};
use hotdir_server::{Server, server_config_from_config};

use crate::browser;
use crate::error::CliError;
use crate::output::Output;

/// Request log format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    /// One line per request.
    Tiny,
    /// Request lines plus watcher and session detail.
    Verbose,
}

/// Arguments for serving a directory.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Directory to serve (default: current directory, or `serve.root`).
    directory: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover hotdir.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind to (default: first free port from 8080).
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to.
    #[arg(short = 'A', long)]
    address: Option<String>,

    /// Directory to watch for changes (default: the served directory).
    #[arg(short, long)]
    watch: Option<PathBuf>,

    /// Log requests.
    #[arg(short, long, value_enum)]
    pub(crate) log: Option<LogFormat>,

    /// Cache max age in seconds.
    #[arg(short = 'a', long = "age")]
    max_age: Option<u64>,

    /// Send `Access-Control-Allow-Origin: *`.
    #[arg(short, long)]
    cors: bool,

    /// Poll interval in milliseconds.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Disable live reload.
    #[arg(short = 'R', long)]
    no_reload: bool,

    /// Do not open the browser.
    #[arg(short = 'O', long)]
    no_open: bool,

    /// Disable caching.
    #[arg(short = 'N', long)]
    no_cache: bool,

    /// Space-separated index file names.
    #[arg(short = 'I', long, value_delimiter = ' ')]
    index: Option<Vec<String>>,

    /// Serve and watch dot-prefixed files.
    #[arg(short = 'H', long)]
    hidden: bool,

    /// Gzip responses.
    #[arg(short = 'C', long)]
    compression: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        let server_config = server_config_from_config(&config, self.log.is_some());
        let live_reload = server_config.live_reload.is_some();

        let server = Server::bind(server_config).await?;
        let url = server.url();
        tracing::info!(
            root = %config.serve_resolved.root.display(),
            url = %url,
            live_reload,
            "Server bound"
        );

        output.success(&format!(
            "Serving {} at {url}",
            config.serve_resolved.root.display()
        ));
        if live_reload {
            output.info(&format!("Watching {}", config.watch_root().display()));
        } else {
            output.info("Live reload: disabled");
        }

        if config.server.open {
            tracing::debug!(url = %url, "Opening browser");
            if let Err(e) = browser::open(&url) {
                output.warning(&format!("Failed to open browser: {e}"));
            }
        }

        server.run().await?;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Collect the flags that override configuration file values.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.address.clone(),
            port: self.port,
            open: self.no_open.then_some(false),
            root: self.directory.clone(),
            index: self.index.clone(),
            max_age_secs: self.max_age,
            cache_enabled: self.no_cache.then_some(false),
            cors: self.cors.then_some(true),
            hidden: self.hidden.then_some(true),
            compression: self.compression.then_some(true),
            live_reload_enabled: self.no_reload.then_some(false),
            watch_dir: self.watch.clone(),
            poll_interval_ms: self.interval,
        }
    }
}
