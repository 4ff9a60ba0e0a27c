//! Static file server with live reload.
//!
//! Serves a directory over HTTP and, when live reload is on, injects a small
//! client script into every HTML page. The script holds a WebSocket open and
//! reloads the page whenever a file under the watch root really changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use hotdir_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hotdir_server::ServerError> {
//!     let config = ServerConfig {
//!         root: PathBuf::from("public"),
//!         ..ServerConfig::default()
//!     };
//!     let server = Server::bind(config).await?;
//!     println!("Serving on {}", server.url());
//!     server.run().await
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum router
//!                        │
//!                        ├─► /__hotdir/ws ──► ReloadHub ──► Watcher (notify)
//!                        │
//!                        ├─► /__hotdir/livereload.js
//!                        │
//!                        └─► static files (ServeDir) ──► snippet injection
//! ```

mod app;
mod error;
pub mod live_reload;
mod middleware;
mod port;
mod state;
mod static_files;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

pub use error::ServerError;
pub use live_reload::{ReloadHub, WatchConfig};

use state::AppState;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on; `None` picks the first free port from `base_port`.
    pub port: Option<u16>,
    /// First port tried when `port` is `None`.
    pub base_port: u16,
    /// Directory to serve.
    pub root: PathBuf,
    /// Index file names tried, in order, for directory requests.
    pub index: Vec<String>,
    /// `Cache-Control` max age; `None` disables caching.
    pub max_age: Option<Duration>,
    /// Send `Access-Control-Allow-Origin: *`.
    pub cors: bool,
    /// Serve dot-prefixed entries.
    pub hidden: bool,
    /// Gzip responses.
    pub compression: bool,
    /// Log every request.
    pub request_logging: bool,
    /// Live reload settings (`None` disables live reload).
    pub live_reload: Option<LiveReloadSettings>,
}

/// Live reload part of [`ServerConfig`].
#[derive(Clone, Debug)]
pub struct LiveReloadSettings {
    /// Directory whose changes trigger reloads.
    pub watch_root: PathBuf,
    pub watch: WatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: None,
            base_port: 8080,
            root: PathBuf::from("."),
            index: vec!["index.html".to_owned()],
            max_age: Some(Duration::from_secs(3600)),
            cors: false,
            hidden: false,
            compression: false,
            request_logging: false,
            live_reload: Some(LiveReloadSettings {
                watch_root: PathBuf::from("."),
                watch: WatchConfig::default(),
            }),
        }
    }
}

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    router: Router,
    hub: Option<Arc<ReloadHub>>,
    local_addr: SocketAddr,
}

impl Server {
    /// Resolve the served root, build the router and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is inaccessible or no address can be
    /// bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let root = tokio::fs::canonicalize(&config.root)
            .await
            .map_err(|source| ServerError::Root {
                path: config.root.clone(),
                source,
            })?;

        let hub = config
            .live_reload
            .map(|settings| ReloadHub::new(settings.watch_root, settings.watch));

        let state = Arc::new(AppState::new(
            root,
            config.index,
            config.hidden,
            hub.clone(),
        ));
        let router = app::create_router(
            state,
            app::Layers {
                max_age: config.max_age,
                cors: config.cors,
                compression: config.compression,
                request_logging: config.request_logging,
            },
        );

        let listener = port::bind_listener(&config.host, config.port, config.base_port).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            router,
            hub,
            local_addr,
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL a browser can open to reach the server.
    ///
    /// Wildcard binds are reported as loopback.
    #[must_use]
    pub fn url(&self) -> String {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        format!("http://{addr}")
    }

    /// Serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then stop the watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(address = %self.local_addr, "Starting server");

        let served = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await;

        if let Some(hub) = self.hub {
            hub.stop();
        }
        served?;
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from hotdir config.
///
/// # Arguments
///
/// * `config` - Loaded hotdir configuration
/// * `request_logging` - Log every request
#[must_use]
pub fn server_config_from_config(
    config: &hotdir_config::Config,
    request_logging: bool,
) -> ServerConfig {
    let serve = &config.serve_resolved;
    let live_reload = &config.live_reload_resolved;

    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        base_port: config.server.base_port,
        root: serve.root.clone(),
        index: serve.index.clone(),
        max_age: serve.max_age(),
        cors: serve.cors,
        hidden: serve.hidden,
        compression: serve.compression,
        request_logging,
        live_reload: live_reload.enabled.then(|| LiveReloadSettings {
            watch_root: config.watch_root().to_path_buf(),
            watch: WatchConfig {
                include_hidden: serve.hidden,
                poll_interval: live_reload.poll_interval(),
                backend: live_reload.backend,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    use super::*;
    use crate::live_reload::{SCRIPT_PATH, SNIPPET, WS_PATH, WatcherState};

    const PAGE: &str = "<html><head></head><body>hi</body></html>";

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), PAGE).unwrap();
        fs::write(dir.path().join("data.json"), r#"{"a":1}"#).unwrap();
        fs::write(dir.path().join(".secret"), "token").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    fn config(root: &Path) -> ServerConfig {
        ServerConfig {
            port: Some(0),
            root: root.to_path_buf(),
            live_reload: Some(LiveReloadSettings {
                watch_root: root.to_path_buf(),
                watch: WatchConfig::default(),
            }),
            ..ServerConfig::default()
        }
    }

    struct Fetched {
        status: StatusCode,
        headers: axum::http::HeaderMap,
        body: Vec<u8>,
    }

    impl Fetched {
        fn text(&self) -> &str {
            std::str::from_utf8(&self.body).unwrap()
        }

        fn header(&self, name: header::HeaderName) -> Option<&str> {
            self.headers.get(name).map(|v| v.to_str().unwrap())
        }
    }

    async fn fetch(server: &Server, request: Request<Body>) -> Fetched {
        let response = server.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        Fetched {
            status,
            headers,
            body,
        }
    }

    async fn get(server: &Server, uri: &str) -> Fetched {
        fetch(server, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    #[tokio::test]
    async fn test_index_page_gets_snippet_once() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();

        let page = get(&server, "/").await;

        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.text().matches(SNIPPET).count(), 1);
        assert!(page.text().starts_with("<html><head></head><body>hi"));
        assert_eq!(
            page.header(header::CACHE_CONTROL),
            Some("public, max-age=3600")
        );
    }

    #[tokio::test]
    async fn test_json_is_byte_identical() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();

        let data = get(&server, "/data.json").await;

        assert_eq!(data.status, StatusCode::OK);
        assert_eq!(data.text(), r#"{"a":1}"#);
        assert_eq!(data.header(header::CONTENT_TYPE), Some("application/json"));
    }

    #[tokio::test]
    async fn test_live_reload_disabled_serves_plain_html() {
        let dir = site();
        let server = Server::bind(ServerConfig {
            live_reload: None,
            ..config(dir.path())
        })
        .await
        .unwrap();

        assert_eq!(get(&server, "/index.html").await.text(), PAGE);
        assert_eq!(
            get(&server, SCRIPT_PATH).await.status,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_client_script_served() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();

        let script = get(&server, SCRIPT_PATH).await;

        assert_eq!(script.status, StatusCode::OK);
        assert!(script.text().contains("location.reload()"));
        assert_eq!(script.header(header::CACHE_CONTROL), Some("no-cache"));
    }

    #[tokio::test]
    async fn test_hidden_files() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();
        assert_eq!(get(&server, "/.secret").await.status, StatusCode::NOT_FOUND);

        let server = Server::bind(ServerConfig {
            hidden: true,
            ..config(dir.path())
        })
        .await
        .unwrap();
        assert_eq!(get(&server, "/.secret").await.text(), "token");
    }

    #[tokio::test]
    async fn test_directory_redirect_and_missing_index() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();

        let redirect = get(&server, "/empty?x=1").await;
        assert_eq!(redirect.status, StatusCode::PERMANENT_REDIRECT);
        assert_eq!(redirect.header(header::LOCATION), Some("/empty/?x=1"));

        assert_eq!(get(&server, "/empty/").await.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_names_tried_in_order() {
        let dir = site();
        fs::write(dir.path().join("home.htm"), "<p>home</p>").unwrap();
        let server = Server::bind(ServerConfig {
            index: vec!["missing.html".to_owned(), "home.htm".to_owned()],
            live_reload: None,
            ..config(dir.path())
        })
        .await
        .unwrap();

        assert_eq!(get(&server, "/").await.text(), "<p>home</p>");
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();

        assert_eq!(
            get(&server, "/%2e%2e/etc/passwd").await.status,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_no_cache_and_cors_headers() {
        let dir = site();
        let server = Server::bind(ServerConfig {
            max_age: None,
            cors: true,
            ..config(dir.path())
        })
        .await
        .unwrap();

        let data = get(&server, "/data.json").await;

        assert_eq!(
            data.header(header::CACHE_CONTROL),
            Some("no-cache, no-store, must-revalidate, max-age=0")
        );
        assert_eq!(data.header(header::ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
        assert_eq!(data.header(header::HeaderName::from_static("x-powered-by")), None);
    }

    #[tokio::test]
    async fn test_compression_after_injection() {
        let dir = site();
        let long = format!("<html><body>{}</body></html>", "hello ".repeat(200));
        fs::write(dir.path().join("long.html"), &long).unwrap();
        let server = Server::bind(ServerConfig {
            compression: true,
            ..config(dir.path())
        })
        .await
        .unwrap();

        let request = Request::get("/long.html")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();
        let page = fetch(&server, request).await;

        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.header(header::CONTENT_ENCODING), Some("gzip"));
        assert!(page.body.len() < long.len());
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Server::bind(config(&dir.path().join("nope"))).await;
        assert!(matches!(result, Err(ServerError::Root { .. })));
    }

    #[tokio::test]
    async fn test_run_until_serves_over_tcp() {
        let dir = site();
        let server = Server::bind(config(dir.path())).await.unwrap();
        let addr = server.local_addr();
        assert_eq!(server.url(), format!("http://{addr}"));

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /data.json HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with(r#"{"a":1}"#));

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_websocket_session_lifecycle() {
        let dir = site();
        let page = dir.path().join("index.html");
        let server = Server::bind(ServerConfig {
            live_reload: Some(LiveReloadSettings {
                watch_root: dir.path().to_path_buf(),
                watch: WatchConfig {
                    poll_interval: Duration::from_millis(20),
                    ..WatchConfig::default()
                },
            }),
            ..config(dir.path())
        })
        .await
        .unwrap();
        let addr = server.local_addr();
        let hub = server.hub.clone().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{WS_PATH}"))
            .await
            .unwrap();
        // The session is registered before the watcher finishes starting
        wait_for(|| hub.watcher_state() == WatcherState::Running { failed: false }).await;
        assert_eq!(hub.session_count(), 1);

        let mut file = fs::OpenOptions::new().append(true).open(&page).unwrap();
        file.write_all(b"<p>edited</p>").unwrap();
        drop(file);

        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no reload frame")
            .unwrap()
            .unwrap();
        assert_eq!(message.to_text().unwrap(), r#"{"type":"reload"}"#);

        socket.close(None).await.unwrap();
        wait_for(|| hub.session_count() == 0).await;

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_websocket_route_absent_without_live_reload() {
        let dir = site();
        let server = Server::bind(ServerConfig {
            live_reload: None,
            ..config(dir.path())
        })
        .await
        .unwrap();

        assert_eq!(get(&server, WS_PATH).await.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_config_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let cli = hotdir_config::CliSettings {
            port: Some(9000),
            cors: Some(true),
            hidden: Some(true),
            cache_enabled: Some(false),
            poll_interval_ms: Some(100),
            ..hotdir_config::CliSettings::default()
        };
        let toml_path = dir.path().join("hotdir.toml");
        fs::write(&toml_path, "").unwrap();
        let loaded = hotdir_config::Config::load(Some(&toml_path), Some(&cli)).unwrap();

        let config = server_config_from_config(&loaded, true);

        assert_eq!(config.port, Some(9000));
        assert!(config.cors);
        assert!(config.hidden);
        assert_eq!(config.max_age, None);
        assert!(config.request_logging);
        let live_reload = config.live_reload.unwrap();
        assert_eq!(live_reload.watch_root, config.root);
        assert!(live_reload.watch.include_hidden);
        assert_eq!(live_reload.watch.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_server_config_live_reload_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let cli = hotdir_config::CliSettings {
            live_reload_enabled: Some(false),
            ..hotdir_config::CliSettings::default()
        };
        let toml_path = dir.path().join("hotdir.toml");
        fs::write(&toml_path, "").unwrap();
        let loaded = hotdir_config::Config::load(Some(&toml_path), Some(&cli)).unwrap();

        assert!(server_config_from_config(&loaded, false).live_reload.is_none());
    }
}
