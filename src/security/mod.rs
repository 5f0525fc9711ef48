//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP fixed window)
//!     → capability routes
//!     → boundary.rs (unmatched: traversal redirect or structured 404)
//! ```
//!
//! # Design Decisions
//! - Traversal probes get no error signal, only a redirect
//! - No trust in client input

pub mod boundary;
pub mod rate_limit;

pub use boundary::BoundaryGuard;
pub use rate_limit::RateLimiterState;
