//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (service.rs):
//!     Resolve endpoint → Connect → Bind contract → Start session worker
//!
//! Supervision (supervisor.rs, optional):
//!     Probe connection → failures >= threshold → rebuild session atomically
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → stop supervisor → stop session worker → exit
//! ```

pub mod session;
pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use session::Session;
pub use shutdown::Shutdown;
pub use supervisor::{ConnectionSupervisor, SupervisorAction};
