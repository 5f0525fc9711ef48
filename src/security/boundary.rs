//! Catch-all for requests no capability module claimed.
//!
//! Registered after every module has mounted, both as the router fallback and
//! for methods no module serves on a claimed path, so it only ever sees
//! unmatched requests.

use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::http::response::ApiError;
use crate::observability::metrics;

/// Where traversal probes are sent instead of getting an error body.
pub const TRAVERSAL_REDIRECT: &str = "https://youtu.be/dQw4w9WgXcQ";

#[derive(Debug, Clone, Copy)]
pub struct BoundaryGuard {
    local_port: u16,
}

impl BoundaryGuard {
    pub fn new(local_port: u16) -> Self {
        Self { local_port }
    }

    /// Install the guard on `router`. Routes added afterwards keep the
    /// default method-not-allowed response.
    pub fn attach(self, router: Router) -> Router {
        router
            .method_not_allowed_fallback(move |method: Method, uri: Uri| async move { self.respond(&method, &uri) })
            .fallback(move |method: Method, uri: Uri| async move { self.respond(&method, &uri) })
    }

    pub fn respond(&self, method: &Method, uri: &Uri) -> Response {
        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or_else(|| uri.path());

        tracing::debug!(
            target: "backend",
            method = %method,
            path = %target,
            port = self.local_port,
            "Missing endpoint"
        );

        if contains_traversal(target) {
            metrics::record_unmatched("redirect");
            return (StatusCode::FOUND, [(header::LOCATION, TRAVERSAL_REDIRECT)]).into_response();
        }

        metrics::record_unmatched("not_found");
        ApiError::not_found().into_response()
    }
}

/// True when the raw request target holds a parent-directory sequence,
/// literal or percent-encoded.
pub fn contains_traversal(target: &str) -> bool {
    if target.contains("..") {
        return true;
    }
    let lowered = target.to_ascii_lowercase();
    lowered.contains("%2e%2e") || lowered.contains(".%2e") || lowered.contains("%2e.")
}
