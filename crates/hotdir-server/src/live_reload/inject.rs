//! Live reload snippet injection.
//!
//! Rewrites complete HTML response bodies so every served page loads the
//! live reload client script.

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Markup inserted into every HTML page.
pub const SNIPPET: &str = concat!(
    "<script src=\"",
    "/__hotdir/livereload.js",
    "\"></script>"
);

/// Middleware that injects [`SNIPPET`] into HTML responses.
///
/// Buffers the whole body before rewriting, so it must run inside any
/// compression layer.
pub(crate) async fn inject_snippet(request: Request, next: Next) -> Response {
    let is_head = request.method() == Method::HEAD;
    let response = next.run(request).await;
    if is_head || !is_injectable(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Some(rewritten) = std::str::from_utf8(&bytes).ok().and_then(inject_into) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    // Length, validators and ranges described the original body
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::ETAG);
    parts.headers.remove(header::ACCEPT_RANGES);

    Response::from_parts(parts, Body::from(rewritten))
}

/// Whether the response is a complete, uncompressed HTML page.
fn is_injectable(response: &Response) -> bool {
    let headers = response.headers();
    response.status() == StatusCode::OK
        && !headers.contains_key(header::CONTENT_ENCODING)
        && headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim_start().starts_with("text/html"))
}

/// Insert the snippet into an HTML document.
///
/// The snippet goes before the last `</body>`, else before `</html>`, else
/// at the end. Returns `None` if the document already carries it.
pub fn inject_into(html: &str) -> Option<String> {
    if html.contains(SNIPPET) {
        return None;
    }

    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let at = lower
        .rfind("</body>")
        .or_else(|| lower.rfind("</html>"))
        .unwrap_or(html.len());

    let mut out = String::with_capacity(html.len() + SNIPPET.len());
    out.push_str(&html[..at]);
    out.push_str(SNIPPET);
    out.push_str(&html[at..]);
    Some(out)
}
