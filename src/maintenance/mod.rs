//! Background maintenance subsystem.
//!
//! # Data Flow
//! ```text
//! BackendConfig
//!     → scheduler.rs (MaintenancePlan: which tasks are enabled)
//!     → started only after the primary listener is up
//!         ├─ update.rs   (poll a VersionSource, one-shot latch)
//!         ├─ restart.rs  (fire a RestartHook at bRestartTime)
//!         └─ companion.rs (rotation collaborator)
//!     → all tasks stop on the shutdown broadcast
//! ```

pub mod companion;
pub mod restart;
pub mod scheduler;
pub mod update;

pub use companion::{Companion, Dormant};
pub use restart::{RestartHook, RestartSchedule, RestartScheduleError, RestartTask, SupervisedRestart};
pub use scheduler::{MaintenancePlan, MaintenanceScheduler, TaskKind};
pub use update::{is_newer, CheckOutcome, HttpVersionSource, UpdateCheckTask, UpdateError, VersionSource};
