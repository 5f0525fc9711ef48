//! Per-client fixed-window rate limiting.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Requests seen from one client in the current window.
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { started: now, count: 0 }
    }

    fn try_acquire(&mut self, now: Instant, length: Duration, max: u32) -> bool {
        if now.duration_since(self.started) >= length {
            self.started = now;
            self.count = 0;
        }

        if self.count < max {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state, one window per client IP.
pub struct RateLimiterState {
    windows: DashMap<Option<IpAddr>, Window>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
        }
    }

    /// Count one request from `client`; false once the window is exhausted.
    pub fn check(&self, client: Option<IpAddr>) -> bool {
        let now = Instant::now();
        let mut window = self.windows.entry(client).or_insert_with(|| Window::new(now));
        window.try_acquire(now, self.window, self.max_requests)
    }

    /// Forget clients whose window has lapsed.
    pub fn evict_idle(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }
}

/// Middleware function for rate limiting.
///
/// Requests without connection info (in-process tests) share one bucket.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if state.check(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = ?client, "Rate limit exceeded");
        metrics::record_rate_limited();
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests, please try again later.",
        )
            .into_response()
    }
}
