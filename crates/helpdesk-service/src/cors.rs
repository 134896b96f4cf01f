//! Origin allow-list and the CORS headers attached to every response.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue};

const ALLOWED_REQUEST_HEADERS: &str = "Content-Type, Authorization";

/// Exact-match origin allow-list. A wildcard entry is ignored because
/// responses carry credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<String>);

impl AllowedOrigins {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut origins: Vec<String> = Vec::new();
        for entry in raw.split(',').map(str::trim) {
            if entry.is_empty() || entry == "*" || origins.iter().any(|known| known == entry) {
                continue;
            }
            origins.push(entry.to_string());
        }
        Self(origins)
    }

    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        self.0.iter().any(|known| known == origin)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds the CORS headers for one response.
///
/// The request origin is echoed back, with credentials allowed, only when it
/// is on the allow-list. `Vary`, allowed headers and allowed methods are set
/// regardless so caches never mix responses across origins.
#[must_use]
pub fn cors_headers(allowed: &AllowedOrigins, request: &HeaderMap, methods: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let origin = request
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|origin| allowed.allows(origin))
        .and_then(|origin| HeaderValue::from_str(origin).ok());
    if let Some(origin) = origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }

    headers.insert(VARY, HeaderValue::from_static("Origin"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_REQUEST_HEADERS));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(methods));
    headers
}
