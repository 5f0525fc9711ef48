//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Map the service's log categories onto tracing targets
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level
//! - Categories (`backend`, `website`, `xmpp`, `bot`) are targets, so they can
//!   be filtered independently, e.g. `RUST_LOG=xmpp=warn,info`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
