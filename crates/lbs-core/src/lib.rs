//! Reference arbitration for a shared location provider.
//!
//! Clients add and remove references to resource classes; after every change
//! the [`SessionManager`] recomputes which classes nobody needs any more and
//! hands that [`ShutdownVector`] to the provider. The [`CrashMonitor`] reclaims
//! references of clients that vanished without releasing them.

pub mod config;
pub mod crash_monitor;
pub mod error;
pub mod interval_arbiter;
pub mod reference_table;
pub mod session_manager;
pub mod shutdown;

pub use crash_monitor::{CrashMonitor, MonitorState, NameOwnerChanged};
pub use error::{ArbiterError, CoreError};
pub use interval_arbiter::{IntervalArbiter, IntervalListener};
pub use reference_table::{ClientEntry, ReferenceTable};
pub use session_manager::SessionManager;
pub use shutdown::{ShutdownListener, ShutdownVector};
