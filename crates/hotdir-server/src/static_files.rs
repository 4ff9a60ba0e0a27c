//! Static file serving.
//!
//! Maps request paths onto the served root, resolves directory index files,
//! and hands the final file lookup to [`ServeDir`](tower_http::services::ServeDir).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tower::ServiceExt;

use crate::state::AppState;

/// Characters escaped when an index file name is appended to a URL path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Fallback handler serving files from the root directory.
pub(crate) async fn serve(State(state): State<Arc<AppState>>, mut request: Request) -> Response {
    let Some(relative) = decode_path(request.uri().path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !state.hidden && is_hidden(&relative) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let target = state.root.join(&relative);
    let is_dir = tokio::fs::metadata(&target)
        .await
        .is_ok_and(|metadata| metadata.is_dir());

    if is_dir {
        let path = request.uri().path();
        if !path.ends_with('/') {
            let location = match request.uri().query() {
                Some(query) => format!("{path}/?{query}"),
                None => format!("{path}/"),
            };
            return Redirect::permanent(&location).into_response();
        }

        let Some(name) = find_index(&target, &state.index).await else {
            return StatusCode::NOT_FOUND.into_response();
        };
        match index_uri(request.uri(), name) {
            Ok(uri) => *request.uri_mut() = uri,
            Err(e) => {
                tracing::warn!(error = %e, index = name, "Invalid index URI");
                return StatusCode::NOT_FOUND.into_response();
            }
        }
    }

    let response = match state.files.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    response.map(Body::new)
}

/// Decode a URL path into a path relative to the root.
///
/// Returns `None` for paths that escape the root or are not valid UTF-8.
fn decode_path(path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => relative.push(s),
        }
    }
    Some(relative)
}

fn is_hidden(relative: &Path) -> bool {
    relative
        .components()
        .any(|component| component.as_os_str().to_string_lossy().starts_with('.'))
}

/// First configured index file that exists in `dir`.
async fn find_index<'a>(dir: &Path, names: &'a [String]) -> Option<&'a str> {
    for name in names {
        let is_file = tokio::fs::metadata(dir.join(name))
            .await
            .is_ok_and(|metadata| metadata.is_file());
        if is_file {
            return Some(name);
        }
    }
    None
}

/// Rewrite a directory URI to point at its index file, keeping the query.
fn index_uri(uri: &Uri, name: &str) -> Result<Uri, axum::http::uri::InvalidUri> {
    let name = utf8_percent_encode(name, PATH_SEGMENT);
    let rewritten = match uri.query() {
        Some(query) => format!("{}{name}?{query}", uri.path()),
        None => format!("{}{name}", uri.path()),
    };
    rewritten.parse()
}
