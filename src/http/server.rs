//! HTTP server setup.
//!
//! # Responsibilities
//! - Compose the application router: capability routes, boundary fallback,
//!   rate limiting, request tracing
//! - Serve it on an already-bound socket, plain or TLS
//! - Stop accepting and drain on the shutdown broadcast, for a bounded time

use std::net::SocketAddr;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};

use crate::http::request::with_request_tracing;
use crate::security::boundary::BoundaryGuard;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiterState};

/// How long in-flight connections get to finish after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A fully composed application, ready to be served.
pub struct HttpServer {
    router: Router,
    drain: Duration,
}

impl HttpServer {
    /// The primary service app.
    pub fn primary(routes: Router, rate_limit: Option<Arc<RateLimiterState>>, local_port: u16) -> Self {
        let mut router = BoundaryGuard::new(local_port).attach(routes);
        if let Some(state) = rate_limit {
            router = router.layer(middleware::from_fn_with_state(state, rate_limit_middleware));
        }
        Self {
            router: with_request_tracing(router),
            drain: DRAIN_TIMEOUT,
        }
    }

    /// The companion website app. No rate limiting.
    pub fn website(routes: Router, local_port: u16) -> Self {
        Self {
            router: with_request_tracing(BoundaryGuard::new(local_port).attach(routes)),
            drain: DRAIN_TIMEOUT,
        }
    }

    /// Apply an outer layer, e.g. the protocol upgrade.
    pub fn wrap(self, f: impl FnOnce(Router) -> Router) -> Self {
        Self {
            router: f(self.router),
            drain: self.drain,
        }
    }

    /// Bound the drain after shutdown to `drain` instead of [`DRAIN_TIMEOUT`].
    pub fn with_drain_timeout(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve over plain TCP until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::debug!(address = %addr, "HTTP server starting");

        let (draining_tx, draining_rx) = oneshot::channel();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                let _ = draining_tx.send(());
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            Ok(()) = draining_rx => match tokio::time::timeout(self.drain, &mut serve).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!(
                    address = %addr,
                    timeout_secs = self.drain.as_secs_f64(),
                    "Drain timed out, abandoning open connections"
                ),
            },
        }

        tracing::debug!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    /// Serve over TLS until `shutdown` fires.
    pub async fn run_tls(
        self,
        listener: TcpListener,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::debug!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let drain_timeout = self.drain;
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            drain.graceful_shutdown(Some(drain_timeout));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::from_tcp_rustls(listener.into_std()?, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::debug!(address = %addr, "HTTPS server stopped");
        Ok(())
    }
}
