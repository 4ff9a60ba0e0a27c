//! Configuration management for hotdir.
//!
//! Parses `hotdir.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `serve.root`
//! - `live_reload.watch_dir`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override browser opening.
    pub open: Option<bool>,
    /// Override served root directory.
    pub root: Option<PathBuf>,
    /// Override index file names.
    pub index: Option<Vec<String>>,
    /// Override `Cache-Control` max age in seconds.
    pub max_age_secs: Option<u64>,
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override CORS header flag.
    pub cors: Option<bool>,
    /// Override hidden file serving and watching.
    pub hidden: Option<bool>,
    /// Override gzip compression flag.
    pub compression: Option<bool>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
    /// Override watched directory.
    pub watch_dir: Option<PathBuf>,
    /// Override watch polling interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "hotdir.toml";

/// Default index page.
const DEFAULT_INDEX: &str = "index.html";

/// Default `Cache-Control` max age (one hour).
const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Default watch polling interval.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Upper bound for the watch polling interval.
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Static serving configuration (paths are relative strings from TOML).
    serve: ServeConfigRaw,
    /// Live reload configuration (paths are relative strings from TOML).
    live_reload: LiveReloadConfigRaw,

    /// Resolved static serving configuration (set after loading).
    #[serde(skip)]
    pub serve_resolved: ServeConfig,
    /// Resolved live reload configuration (set after loading).
    #[serde(skip)]
    pub live_reload_resolved: LiveReloadConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Fixed port. When unset the first free port from `base_port` is used.
    pub port: Option<u16>,
    /// First port tried when searching for a free one.
    pub base_port: u16,
    /// Open the system browser once the server is listening.
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: None,
            base_port: 8080,
            open: true,
        }
    }
}

/// Raw static serving configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ServeConfigRaw {
    root: Option<String>,
    index: Option<Vec<String>>,
    max_age_secs: Option<u64>,
    cache: Option<bool>,
    cors: Option<bool>,
    hidden: Option<bool>,
    compression: Option<bool>,
}

/// Resolved static serving configuration with absolute paths.
#[derive(Debug)]
pub struct ServeConfig {
    /// Directory served over HTTP.
    pub root: PathBuf,
    /// Index file names tried, in order, for directory requests.
    pub index: Vec<String>,
    /// `Cache-Control` max age in seconds when caching is enabled.
    pub max_age_secs: u64,
    /// Whether responses may be cached.
    pub cache_enabled: bool,
    /// Send `Access-Control-Allow-Origin: *`.
    pub cors: bool,
    /// Serve (and watch) dot-prefixed entries.
    pub hidden: bool,
    /// Gzip responses.
    pub compression: bool,
}

impl ServeConfig {
    /// Effective max age, or `None` when caching is disabled.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.cache_enabled
            .then(|| Duration::from_secs(self.max_age_secs))
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index: vec![DEFAULT_INDEX.to_owned()],
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            cache_enabled: true,
            cors: false,
            hidden: false,
            compression: false,
        }
    }
}

/// Filesystem watch mechanism used for live reload.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Periodic metadata polling, honoring the poll interval.
    #[default]
    Poll,
    /// Native OS notifications (inotify, `FSEvents`, ...).
    Native,
}

/// Raw live reload configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LiveReloadConfigRaw {
    enabled: Option<bool>,
    watch_dir: Option<String>,
    poll_interval_ms: Option<u64>,
    backend: Option<WatchBackend>,
}

/// Resolved live reload configuration.
#[derive(Debug)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Watched directory; `None` watches the served root.
    pub watch_dir: Option<PathBuf>,
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Watch mechanism.
    pub backend: WatchBackend,
}

impl LiveReloadConfig {
    /// Polling interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backend: WatchBackend::Poll,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`HOTDIR_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `hotdir.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated again.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Directory watched for live reload.
    #[must_use]
    pub fn watch_root(&self) -> &Path {
        self.live_reload_resolved
            .watch_dir
            .as_deref()
            .unwrap_or(&self.serve_resolved.root)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = Some(port);
        }
        if let Some(open) = settings.open {
            self.server.open = open;
        }

        let serve = &mut self.serve_resolved;
        if let Some(root) = &settings.root {
            serve.root.clone_from(root);
        }
        if let Some(index) = &settings.index {
            serve.index.clone_from(index);
        }
        if let Some(max_age_secs) = settings.max_age_secs {
            serve.max_age_secs = max_age_secs;
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            serve.cache_enabled = cache_enabled;
        }
        if let Some(cors) = settings.cors {
            serve.cors = cors;
        }
        if let Some(hidden) = settings.hidden {
            serve.hidden = hidden;
        }
        if let Some(compression) = settings.compression {
            serve.compression = compression;
        }

        let live_reload = &mut self.live_reload_resolved;
        if let Some(enabled) = settings.live_reload_enabled {
            live_reload.enabled = enabled;
        }
        if let Some(watch_dir) = &settings.watch_dir {
            live_reload.watch_dir = Some(watch_dir.clone());
        }
        if let Some(poll_interval_ms) = settings.poll_interval_ms {
            live_reload.poll_interval_ms = poll_interval_ms;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            serve: ServeConfigRaw::default(),
            live_reload: LiveReloadConfigRaw::default(),
            serve_resolved: ServeConfig {
                root: base.to_path_buf(),
                ..ServeConfig::default()
            },
            live_reload_resolved: LiveReloadConfig::default(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_serve()?;
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        if self.server.port == Some(0) {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        if self.server.base_port == 0 {
            return Err(ConfigError::Validation(
                "server.base_port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate static serving configuration.
    fn validate_serve(&self) -> Result<(), ConfigError> {
        for name in &self.serve_resolved.index {
            require_non_empty(name, "serve.index")?;
            if name.contains(['/', '\\']) || name == ".." {
                return Err(ConfigError::Validation(format!(
                    "serve.index entry '{name}' must be a plain file name"
                )));
            }
        }
        Ok(())
    }

    /// Validate live reload configuration.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let interval = self.live_reload_resolved.poll_interval_ms;
        if interval == 0 {
            return Err(ConfigError::Validation(
                "live_reload.poll_interval_ms must be greater than 0".to_owned(),
            ));
        }
        if interval > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "live_reload.poll_interval_ms cannot exceed {MAX_POLL_INTERVAL_MS}"
            )));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref root) = self.serve.root {
            self.serve.root = Some(expand::expand_env(root, "serve.root")?);
        }
        if let Some(ref watch_dir) = self.live_reload.watch_dir {
            self.live_reload.watch_dir =
                Some(expand::expand_env(watch_dir, "live_reload.watch_dir")?);
        }

        Ok(())
    }

    /// Resolve raw sections against the config directory.
    fn resolve(&mut self, config_dir: &Path) {
        let defaults = ServeConfig::default();
        let serve = &self.serve;
        self.serve_resolved = ServeConfig {
            root: serve
                .root
                .as_deref()
                .map_or_else(|| config_dir.to_path_buf(), |p| config_dir.join(p)),
            index: serve.index.clone().unwrap_or(defaults.index),
            max_age_secs: serve.max_age_secs.unwrap_or(defaults.max_age_secs),
            cache_enabled: serve.cache.unwrap_or(defaults.cache_enabled),
            cors: serve.cors.unwrap_or(defaults.cors),
            hidden: serve.hidden.unwrap_or(defaults.hidden),
            compression: serve.compression.unwrap_or(defaults.compression),
        };

        let defaults = LiveReloadConfig::default();
        let live_reload = &self.live_reload;
        self.live_reload_resolved = LiveReloadConfig {
            enabled: live_reload.enabled.unwrap_or(defaults.enabled),
            watch_dir: live_reload.watch_dir.as_deref().map(|p| config_dir.join(p)),
            poll_interval_ms: live_reload
                .poll_interval_ms
                .unwrap_or(defaults.poll_interval_ms),
            backend: live_reload.backend.unwrap_or(defaults.backend),
        };
    }
}
