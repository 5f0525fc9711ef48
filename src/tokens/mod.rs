//! Persisted authentication tokens.
//!
//! # Data Flow
//! ```text
//! tokens.json
//!     → collection.rs (load, reject corrupt documents)
//!     → prune at startup time (per token, order preserved)
//!     → persist (always rewritten)
//!     → store.rs (read-only lookups, shared via Arc)
//! ```
//!
//! # Design Decisions
//! - One sweep per process, before any listener accepts traffic
//! - Lookups are handed to modules explicitly, never through globals
//! - Unknown fields survive the rewrite

pub mod collection;
pub mod model;
pub mod store;

pub use collection::{PruneReport, TokenCollection, TokenError};
pub use model::{Lifetime, Token, TokenKind, TOKEN_PREFIX};
pub use store::TokenStore;
