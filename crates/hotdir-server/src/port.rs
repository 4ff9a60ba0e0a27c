//! Listener binding with automatic port selection.

use std::io;

use tokio::net::TcpListener;

use crate::error::ServerError;

/// Bind a TCP listener on `host`.
///
/// An explicit `port` is bound as-is. Without one, ports are tried from
/// `base_port` upward and the first one not already in use wins.
pub(crate) async fn bind_listener(
    host: &str,
    port: Option<u16>,
    base_port: u16,
) -> Result<TcpListener, ServerError> {
    if let Some(port) = port {
        return TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind {
                address: format!("{host}:{port}"),
                source,
            });
    }

    for candidate in base_port..=u16::MAX {
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if candidate != base_port {
                    tracing::debug!(
                        base_port,
                        port = candidate,
                        "Base port busy, using next free port"
                    );
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {}
            Err(source) => {
                return Err(ServerError::Bind {
                    address: format!("{host}:{candidate}"),
                    source,
                });
            }
        }
    }

    Err(ServerError::NoFreePort {
        host: host.to_owned(),
        base_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_port_in_use_fails() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = bind_listener("127.0.0.1", Some(port), 8080).await;

        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_auto_port_skips_busy_base() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let busy = taken.local_addr().unwrap().port();

        let listener = bind_listener("127.0.0.1", None, busy).await.unwrap();

        assert!(listener.local_addr().unwrap().port() > busy);
    }
}
