//! WebSocket transport for live reload.
//!
//! Each socket owns one [`Session`](super::Session) registered with the
//! hub for as long as the connection stays open.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::ReloadHub;
use crate::state::AppState;

const CLIENT_JS: &str = include_str!("client.js");

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(hub) = state.live_reload.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Serve the browser side of live reload.
pub(crate) async fn client_script(State(state): State<Arc<AppState>>) -> Response {
    if state.live_reload.is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_JS,
    )
        .into_response()
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<ReloadHub>) {
    // The first connection starts the watcher, which scans the tree
    let connecting = Arc::clone(&hub);
    let mut session = match tokio::task::spawn_blocking(move || connecting.connect()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Live reload session setup failed");
            return;
        }
    };
    let id = session.id();

    loop {
        tokio::select! {
            message = session.recv() => {
                let Some(message) = message else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode reload message");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    hub.disconnect(id);
}
