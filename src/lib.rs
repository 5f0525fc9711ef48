//! Reload Backend: startup and lifecycle orchestration for the game backend
//! service.

pub mod capabilities;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod maintenance;
pub mod net;
pub mod observability;
pub mod security;
pub mod tokens;

pub use config::schema::BackendConfig;
pub use http::HttpServer;
pub use lifecycle::{Collaborators, Orchestrator, Outcome, Shutdown, ShutdownReason};
pub use tokens::TokenStore;
