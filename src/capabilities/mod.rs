//! Request-handling capability modules.
//!
//! # Data Flow
//! ```text
//! CapabilitySet[] (explicit registry, ordered)
//!     → loader.rs (mount each module on a staging area)
//!     → commit staged routes (earlier module wins conflicts)
//!     → Router + ModuleDescriptor[]
//! ```
//!
//! # Design Decisions
//! - Mounted once at startup, never reloaded
//! - Registration order is the documented tie-break for overlapping routes
//! - A failing module is logged and skipped; startup continues

pub mod builtin;
pub mod loader;
pub mod registry;

pub use loader::{CapabilityLoader, LoadStatus, LoadedCapabilities, ModuleDescriptor};
pub use registry::{Capability, CapabilityContext, CapabilityError, CapabilitySet, Mount};
