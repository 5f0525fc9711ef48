//! Startup orchestration.
//!
//! # Responsibilities
//! - Prepare the environment: client settings directory, database probe
//! - Sweep expired tokens before anything can read them
//! - Mount capability modules, bind listeners, then arm maintenance tasks
//! - Translate port conflicts into controlled exits
//!
//! # Design Decisions
//! - Fail fast: every error before the primary listener is up is fatal
//! - Stages run in order, never concurrently
//! - The boundary guard is given the port actually bound, so binding happens
//!   before the primary app is composed

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capabilities::builtin::{LandingPage, StatusMessage};
use crate::capabilities::{CapabilityContext, CapabilityLoader, CapabilitySet, ModuleDescriptor};
use crate::config::BackendConfig;
use crate::http::{HttpServer, KeepAliveSessions, PushProtocol};
use crate::lifecycle::database::{self, DatabaseError};
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::lifecycle::signals::shutdown_signal;
use crate::maintenance::{
    Companion, Dormant, HttpVersionSource, MaintenancePlan, MaintenanceScheduler, RestartHook, RestartScheduleError,
    SupervisedRestart, UpdateError, VersionSource,
};
use crate::net::{serve_website, ListenerError, ListenerManager, ListenerRole, BIND_CONFLICT_GRACE};
use crate::security::rate_limit::RateLimiterState;
use crate::tokens::{TokenError, TokenStore};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to create client settings directory {path}: {source}")]
    ClientSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Tokens(#[from] TokenError),

    #[error("invalid restart schedule: {0}")]
    RestartSchedule(#[from] RestartScheduleError),

    #[error("failed to build version source: {0}")]
    VersionSource(#[from] UpdateError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stopped by a signal.
    Shutdown,
    /// The process should exit with this status.
    Exit(i32),
}

/// Everything the orchestrator wires together but does not implement.
pub struct Collaborators {
    /// Primary app modules, in registration order.
    pub capabilities: Vec<CapabilitySet>,
    /// Website app modules.
    pub website: Vec<CapabilitySet>,
    pub push: Arc<dyn PushProtocol>,
    /// Overrides the URL from `update_check.url`.
    pub version_source: Option<Arc<dyn VersionSource>>,
    /// `None` uses [`SupervisedRestart`].
    pub restart_hook: Option<Arc<dyn RestartHook>>,
    pub rotation: Arc<dyn Companion>,
    pub chat_bot: Arc<dyn Companion>,
}

impl Collaborators {
    /// The modules and companions that ship with the backend.
    pub fn builtin() -> Self {
        Self {
            capabilities: vec![CapabilitySet::new("routes").with(StatusMessage)],
            website: vec![CapabilitySet::new("website").with(LandingPage)],
            push: Arc::new(KeepAliveSessions::new()),
            version_source: None,
            restart_hook: None,
            rotation: Arc::new(Dormant::Rotation),
            chat_bot: Arc::new(Dormant::ChatBot),
        }
    }
}

pub struct Orchestrator {
    config: Arc<BackendConfig>,
    collaborators: Collaborators,
    shutdown: Shutdown,
    host: IpAddr,
}

impl Orchestrator {
    pub fn new(config: BackendConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
            shutdown: Shutdown::new(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Bind listeners on a specific interface.
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Start, serve until a signal or a restart request, then drain.
    pub async fn run(self) -> Result<Outcome, StartupError> {
        self.run_until(shutdown_signal()).await
    }

    /// Like [`run`](Self::run) with a caller-supplied stop signal.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<Outcome, StartupError> {
        match self.start().await {
            Ok(running) => Ok(running.wait(signal).await),
            Err(StartupError::Listener(e)) => match e.conflict_exit_code() {
                Some(code) => {
                    tracing::error!(target: "backend", error = %e, "Port is already in use, exiting");
                    tokio::time::sleep(BIND_CONFLICT_GRACE).await;
                    Ok(Outcome::Exit(code))
                }
                None => Err(StartupError::Listener(e)),
            },
            Err(e) => Err(e),
        }
    }

    pub async fn start(self) -> Result<Running, StartupError> {
        let Orchestrator {
            config,
            collaborators,
            shutdown,
            host,
        } = self;

        tracing::info!(target: "backend", version = VERSION, "Reload Backend starting");

        let settings_dir = &config.client_settings_dir;
        tokio::fs::create_dir_all(settings_dir)
            .await
            .map_err(|source| StartupError::ClientSettings {
                path: settings_dir.clone(),
                source,
            })?;

        database::probe(&config.mongodb).await?;

        let tokens = Arc::new(TokenStore::open(&config.tokens_path, Utc::now())?);

        let context = CapabilityContext {
            config: Arc::clone(&config),
            tokens: Arc::clone(&tokens),
            signing_secret: Arc::from(uuid::Uuid::new_v4().simple().to_string()),
            version: VERSION,
        };

        let loader = CapabilityLoader::new(&context);
        let primary_modules = loader.load_all(&collaborators.capabilities);

        let (restart_tx, restart_rx) = mpsc::channel(1);
        let restart_hook = collaborators
            .restart_hook
            .unwrap_or_else(|| Arc::new(SupervisedRestart::new(restart_tx)));
        let version_source = match collaborators.version_source {
            Some(source) => Some(source),
            None => match &config.update_check.url {
                Some(url) => Some(Arc::new(HttpVersionSource::new(url.as_str())?) as Arc<dyn VersionSource>),
                None => None,
            },
        };
        let plan = MaintenancePlan::from_config(
            &config,
            VERSION,
            version_source,
            restart_hook,
            collaborators.rotation,
        )?;

        let manager = ListenerManager::from_config(&config).await?.with_host(host);
        let secured = manager.transport().is_secured();

        let socket = manager.bind(ListenerRole::Primary, config.port).await?;
        let primary_addr = socket.local_addr();

        let mut background = Vec::new();
        let limiter = if config.rate_limit.enabled {
            let state = Arc::new(RateLimiterState::new(&config.rate_limit));
            background.push(spawn_eviction(
                Arc::clone(&state),
                Duration::from_secs(config.rate_limit.window_secs),
                &shutdown,
            ));
            Some(state)
        } else {
            None
        };

        let server = HttpServer::primary(primary_modules.router, limiter, primary_addr.port());
        let mut servers = vec![manager
            .primary(socket, server, collaborators.push)
            .serve(shutdown.subscribe())];

        let scheduler = MaintenanceScheduler::start_all(plan, &shutdown);

        if config.discord.enabled {
            background.push(tokio::spawn(collaborators.chat_bot.start(shutdown.subscribe())));
        }

        let mut running = Running {
            primary_addr,
            website_addr: None,
            secured,
            modules: primary_modules.modules,
            website_modules: Vec::new(),
            tokens,
            shutdown,
            servers: Vec::new(),
            background,
            scheduler,
            restart_rx,
        };

        if config.website.enabled {
            let website_modules = loader.load_all(&collaborators.website);
            let socket = match manager.bind(ListenerRole::Website, config.website.port).await {
                Ok(socket) => socket,
                Err(e) => {
                    running.servers = servers;
                    running.finish(ShutdownReason::StartupAborted).await;
                    return Err(e.into());
                }
            };
            let website_addr = socket.local_addr();
            let server = HttpServer::website(website_modules.router, website_addr.port());
            servers.push(serve_website(socket, server, running.shutdown.subscribe()));

            running.website_addr = Some(website_addr);
            running.website_modules = website_modules.modules;
        }

        running.servers = servers;
        Ok(running)
    }
}

fn spawn_eviction(state: Arc<RateLimiterState>, every: Duration, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => state.evict_idle(),
                _ = shutdown.recv() => break,
            }
        }
    })
}

/// A started backend.
pub struct Running {
    primary_addr: SocketAddr,
    website_addr: Option<SocketAddr>,
    secured: bool,
    modules: Vec<ModuleDescriptor>,
    website_modules: Vec<ModuleDescriptor>,
    tokens: Arc<TokenStore>,
    shutdown: Shutdown,
    servers: Vec<JoinHandle<Result<(), std::io::Error>>>,
    background: Vec<JoinHandle<()>>,
    scheduler: MaintenanceScheduler,
    restart_rx: mpsc::Receiver<()>,
}

impl Running {
    pub fn primary_addr(&self) -> SocketAddr {
        self.primary_addr
    }

    pub fn website_addr(&self) -> Option<SocketAddr> {
        self.website_addr
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn website_modules(&self) -> &[ModuleDescriptor] {
        &self.website_modules
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn scheduler(&self) -> &MaintenanceScheduler {
        &self.scheduler
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until `signal` resolves, a restart is requested or the
    /// shutdown handle fires, then stop.
    pub async fn wait(mut self, signal: impl Future<Output = ()>) -> Outcome {
        let shutdown = self.shutdown.clone();
        let restart_rx = &mut self.restart_rx;
        let restart = async move {
            match restart_rx.recv().await {
                Some(()) => (),
                None => std::future::pending().await,
            }
        };

        let reason = tokio::select! {
            _ = signal => ShutdownReason::Signal,
            reason = shutdown.triggered() => reason,
            _ = restart => ShutdownReason::Restart,
        };

        let outcome = match reason {
            ShutdownReason::Restart => {
                tracing::info!(target: "backend", "Restarting backend");
                Outcome::Exit(0)
            }
            _ => Outcome::Shutdown,
        };

        self.finish(reason).await;
        outcome
    }

    /// Trigger shutdown and wait for listeners and tasks to finish.
    pub async fn stop(self) {
        self.finish(ShutdownReason::Requested).await
    }

    async fn finish(self, reason: ShutdownReason) {
        self.shutdown.trigger(reason);
        let reason = self.shutdown.reason().unwrap_or(reason);
        tracing::info!(target: "backend", reason = %reason, "Shutting down");

        for server in self.servers {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Server stopped with error"),
                Err(e) => tracing::error!(error = %e, "Server task failed"),
            }
        }
        for task in self.background {
            let _ = task.await;
        }
        self.scheduler.join().await;
        tracing::info!(target: "backend", "Shutdown complete");
    }
}
