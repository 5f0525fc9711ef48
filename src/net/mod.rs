//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! BackendConfig
//!     → listener.rs (choose transport, bind primary and website sockets)
//!     → tls.rs (load certificate, key and optional CA chain when secured)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The transport decision is made once, before anything binds
//! - A port conflict is a controlled exit, not a crash

pub mod listener;
pub mod tls;

pub use listener::{
    serve_website, BoundSocket, ListenerError, ListenerManager, ListenerRole, PrimaryListener, Transport,
    BIND_CONFLICT_GRACE,
};
