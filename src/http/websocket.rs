//! Protocol-upgrade layer for the push/presence protocol.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests on the primary listener, on any path
//! - Complete the upgrade handshake
//! - Hand the socket to the push protocol collaborator
//!
//! # Design Decisions
//! - Runs outside the capability routes, so modules never see upgrades
//! - Shares the listener's socket and lifecycle; no separate port

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, FromRequestParts, State,
    },
    http::{header, HeaderMap, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::future::BoxFuture;

/// The protocol spoken over upgraded connections.
pub trait PushProtocol: Send + Sync + 'static {
    fn serve(&self, socket: WebSocket, peer: Option<SocketAddr>) -> BoxFuture<'static, ()>;
}

/// Diverts upgrade requests to a [`PushProtocol`]; everything else passes through.
#[derive(Clone)]
pub struct UpgradeLayer {
    protocol: Arc<dyn PushProtocol>,
}

impl UpgradeLayer {
    pub fn new(protocol: Arc<dyn PushProtocol>) -> Self {
        Self { protocol }
    }

    /// Wrap `router`, fallback included.
    pub fn attach(self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(self, upgrade_middleware))
    }
}

pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

async fn upgrade_middleware(
    State(layer): State<UpgradeLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(request.headers()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (mut parts, _body) = request.into_parts();

    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => {
            let protocol = Arc::clone(&layer.protocol);
            upgrade.on_upgrade(move |socket| protocol.serve(socket, peer))
        }
        Err(rejection) => {
            tracing::debug!(target: "xmpp", peer = ?peer, error = %rejection, "Upgrade rejected");
            rejection.into_response()
        }
    }
}

/// Holds push sessions open until the client closes them.
#[derive(Debug, Default, Clone)]
pub struct KeepAliveSessions {
    active: Arc<AtomicUsize>,
}

impl KeepAliveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl PushProtocol for KeepAliveSessions {
    fn serve(&self, mut socket: WebSocket, peer: Option<SocketAddr>) -> BoxFuture<'static, ()> {
        let active = Arc::clone(&self.active);
        Box::pin(async move {
            let open = active.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(target: "xmpp", peer = ?peer, open, "Session opened");

            while let Some(message) = socket.recv().await {
                match message {
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(target: "xmpp", peer = ?peer, error = %e, "Session error");
                        break;
                    }
                }
            }

            active.fetch_sub(1, Ordering::SeqCst);
            tracing::info!(target: "xmpp", peer = ?peer, "Session closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn detects_upgrade_header() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[tokio::test]
    async fn plain_requests_pass_through() {
        let router = Router::new().route("/", get(|| async { "http" }));
        let app = UpgradeLayer::new(Arc::new(KeepAliveSessions::new())).attach(router);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn incomplete_handshake_is_rejected() {
        let app = UpgradeLayer::new(Arc::new(KeepAliveSessions::new())).attach(Router::new());

        // No Sec-WebSocket-Key and no connection to upgrade.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::UPGRADE, "websocket")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error() || response.status().is_server_error());
    }
}
