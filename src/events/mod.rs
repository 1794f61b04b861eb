//! Chain notification subsystem.
//!
//! # Data Flow
//! ```text
//! subscriber.rs worker (one per connection)
//!     → transport: head + logs for the new range
//!     → block handlers (height, ascending)
//!     → normalize.rs (log → ContractEvent with decimal strings)
//!     → event handlers for that EventKind
//! ```
//!
//! Handler failures are contained per invocation (handler.rs); the worker
//! keeps running.

pub mod handler;
pub mod normalize;
pub mod subscriber;
pub mod types;

pub use handler::{HandlerError, HandlerResult};
pub use normalize::{format_amount, normalize_log};
pub use subscriber::{EventSubscriber, PollOutcome, SubscriptionRegistry};
pub use types::{
    ContractEvent, DataListedRecord, DataPurchasedRecord, EventKind, EventOrigin,
};
