//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Client settings dir → Database probe → Token sweep → Mount modules
//!     → Bind primary → Serve → Maintenance tasks → Chat bot → Website
//!
//! Shutdown (shutdown.rs):
//!     First trigger (signal, restart, handle) wins → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing is served until tokens are swept and modules mounted
//! - Port conflicts exit after a fixed grace period with a per-listener status
//! - In-flight connections get a bounded drain window on shutdown

pub mod database;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownReason};
pub use startup::{Collaborators, Orchestrator, Outcome, Running, StartupError, VERSION};
