//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → websocket.rs (upgrade requests diverted to the push protocol)
//!     → request.rs (request ID, trace span)
//!     → security (rate limit)
//!     → capability routes
//!     → boundary fallback / response.rs (structured errors)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::HttpServer;
pub use websocket::{KeepAliveSessions, PushProtocol, UpgradeLayer};
