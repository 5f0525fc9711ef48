//! Listener management.
//!
//! # Responsibilities
//! - Decide the primary transport once (plain or TLS, never both)
//! - Bind the primary and website sockets
//! - Classify bind failures: port conflicts vs. everything else
//! - Attach the protocol-upgrade layer to the primary listener

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::BackendConfig;
use crate::http::server::HttpServer;
use crate::http::websocket::{PushProtocol, UpgradeLayer};
use crate::net::tls::load_tls_config;

/// Delay between reporting a port conflict and exiting.
pub const BIND_CONFLICT_GRACE: Duration = Duration::from_secs(3);

/// Which listener a socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    Primary,
    Website,
}

impl ListenerRole {
    /// Process exit status after a port conflict on this listener.
    pub fn conflict_exit_code(self) -> i32 {
        match self {
            ListenerRole::Primary => 0,
            ListenerRole::Website => 1,
        }
    }
}

impl std::fmt::Display for ListenerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerRole::Primary => write!(f, "backend"),
            ListenerRole::Website => write!(f, "website"),
        }
    }
}

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The port is already held by another socket.
    PortInUse { role: ListenerRole, port: u16 },
    /// Failed to bind for any other reason.
    Bind { role: ListenerRole, port: u16, source: std::io::Error },
    /// TLS material missing or unusable.
    Tls(std::io::Error),
}

impl ListenerError {
    /// Exit status for a controlled exit, `None` when the error is simply fatal.
    pub fn conflict_exit_code(&self) -> Option<i32> {
        match self {
            ListenerError::PortInUse { role, .. } => Some(role.conflict_exit_code()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::PortInUse { role, port } => {
                write!(f, "{} port {} is already in use", role, port)
            }
            ListenerError::Bind { role, port, source } => {
                write!(f, "Failed to bind {} port {}: {}", role, port, source)
            }
            ListenerError::Tls(e) => write!(f, "Failed to load TLS material: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } => Some(source),
            ListenerError::Tls(e) => Some(e),
            ListenerError::PortInUse { .. } => None,
        }
    }
}

/// Transport of the primary listener.
#[derive(Clone)]
pub enum Transport {
    Plain,
    Secured(RustlsConfig),
}

impl Transport {
    pub fn is_secured(&self) -> bool {
        matches!(self, Transport::Secured(_))
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain => write!(f, "Plain"),
            Transport::Secured(_) => write!(f, "Secured"),
        }
    }
}

/// A socket bound for one listener, not yet serving.
#[derive(Debug)]
pub struct BoundSocket {
    role: ListenerRole,
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl BoundSocket {
    pub fn role(&self) -> ListenerRole {
        self.role
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Binds listeners and hands them to the HTTP server.
#[derive(Debug)]
pub struct ListenerManager {
    transport: Transport,
    host: IpAddr,
}

impl ListenerManager {
    /// Decide the primary transport. With HTTPS enabled the certificate and
    /// key are loaded here, before any socket is opened.
    pub async fn from_config(config: &BackendConfig) -> Result<Self, ListenerError> {
        let transport = if config.enable_https {
            let tls = load_tls_config(
                Path::new(&config.ssl.cert),
                Path::new(&config.ssl.key),
                config.ssl.ca.as_deref().map(Path::new),
            )
            .await
            .map_err(ListenerError::Tls)?;
            Transport::Secured(tls)
        } else {
            Transport::Plain
        };

        tracing::debug!(transport = ?transport, "Primary transport selected");
        Ok(Self::new(transport))
    }

    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Bind on a specific interface instead of all of them.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Bind a socket for `role` on `port`.
    pub async fn bind(&self, role: ListenerRole, port: u16) -> Result<BoundSocket, ListenerError> {
        let addr = SocketAddr::new(self.host, port);
        let inner = TcpListener::bind(addr).await.map_err(|source| classify(role, port, source))?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| ListenerError::Bind { role, port, source })?;

        tracing::debug!(role = %role, address = %local_addr, "Socket bound");
        Ok(BoundSocket {
            role,
            inner,
            local_addr,
        })
    }

    /// Turn the bound primary socket into a listener serving `server`, with
    /// the upgrade layer attached to the same socket.
    pub fn primary(&self, socket: BoundSocket, server: HttpServer, push: Arc<dyn PushProtocol>) -> PrimaryListener {
        PrimaryListener {
            socket,
            server,
            transport: self.transport.clone(),
            upgrade: UpgradeLayer::new(push),
        }
    }
}

fn classify(role: ListenerRole, port: u16, source: std::io::Error) -> ListenerError {
    if source.kind() == std::io::ErrorKind::AddrInUse {
        ListenerError::PortInUse { role, port }
    } else {
        ListenerError::Bind { role, port, source }
    }
}

/// The primary listener: socket, transport and upgrade layer, owned together.
pub struct PrimaryListener {
    socket: BoundSocket,
    server: HttpServer,
    transport: Transport,
    upgrade: UpgradeLayer,
}

impl PrimaryListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Start serving in the background.
    pub fn serve(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<(), std::io::Error>> {
        let upgrade = self.upgrade;
        let server = self.server.wrap(|router| upgrade.attach(router));
        let listener = self.socket.inner;

        tracing::info!(
            target: "backend",
            address = %self.socket.local_addr,
            secured = self.transport.is_secured(),
            "Backend started listening on port {}",
            self.socket.local_addr.port()
        );

        match self.transport {
            Transport::Plain => tokio::spawn(server.run(listener, shutdown)),
            Transport::Secured(tls) => tokio::spawn(server.run_tls(listener, tls, shutdown)),
        }
    }
}

/// Start serving the website app on its own plain socket.
pub fn serve_website(
    socket: BoundSocket,
    server: HttpServer,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<Result<(), std::io::Error>> {
    tracing::info!(
        target: "website",
        address = %socket.local_addr,
        "Website started listening on port {}",
        socket.local_addr.port()
    );
    tokio::spawn(server.run(socket.inner, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_manager() -> ListenerManager {
        ListenerManager::new(Transport::Plain).with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn exit_codes_distinguish_listeners() {
        assert_eq!(ListenerRole::Primary.conflict_exit_code(), 0);
        assert_eq!(ListenerRole::Website.conflict_exit_code(), 1);
    }

    #[tokio::test]
    async fn occupied_port_is_a_conflict() {
        let manager = local_manager();
        let first = manager.bind(ListenerRole::Primary, 0).await.unwrap();
        let port = first.local_addr().port();

        let err = manager.bind(ListenerRole::Website, port).await.unwrap_err();
        assert!(matches!(err, ListenerError::PortInUse { role: ListenerRole::Website, port: p } if p == port));
        assert_eq!(err.conflict_exit_code(), Some(1));
    }

    #[tokio::test]
    async fn other_bind_failures_are_not_conflicts() {
        // TEST-NET-1 is never assigned to a local interface.
        let manager = ListenerManager::new(Transport::Plain).with_host("192.0.2.1".parse().unwrap());
        let err = manager.bind(ListenerRole::Primary, 0).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert_eq!(err.conflict_exit_code(), None);
    }

    #[tokio::test]
    async fn plain_config_selects_plain_transport() {
        let manager = ListenerManager::from_config(&BackendConfig::default()).await.unwrap();
        assert!(!manager.transport().is_secured());
    }

    #[tokio::test]
    async fn https_without_material_fails_before_binding() {
        let mut config = BackendConfig::default();
        config.enable_https = true;
        config.ssl.cert = "/nonexistent/cert.pem".into();
        config.ssl.key = "/nonexistent/key.pem".into();

        let err = ListenerManager::from_config(&config).await.unwrap_err();
        assert!(matches!(err, ListenerError::Tls(_)));
    }
}
