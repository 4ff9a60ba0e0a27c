//! Caching and CORS headers.

use std::time::Duration;

use axum::http::HeaderValue;
use axum::http::header;
use tower_http::set_header::SetResponseHeaderLayer;

/// `Cache-Control` value sent when caching is disabled.
pub(crate) const NO_CACHE: &str = "no-cache, no-store, must-revalidate, max-age=0";

/// Cache-Control layer for the configured cache policy.
///
/// With a max age, handlers that set their own `Cache-Control` keep it.
/// Without one, every response is marked uncacheable.
pub(crate) fn cache_control_layer(max_age: Option<Duration>) -> SetResponseHeaderLayer<HeaderValue> {
    match max_age {
        Some(age) => {
            let value = HeaderValue::try_from(format!("public, max-age={}", age.as_secs()))
                .unwrap_or_else(|_| HeaderValue::from_static("public"));
            SetResponseHeaderLayer::if_not_present(header::CACHE_CONTROL, value)
        }
        None => SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ),
    }
}

/// Layer that allows cross-origin requests from anywhere.
pub(crate) fn cors_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    )
}
