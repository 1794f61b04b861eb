//! Chain orchestration library.
//!
//! Connects to an EVM JSON-RPC endpoint, binds the health data marketplace
//! contract, retries calls with pluggable backoff and delivers block and
//! contract-event notifications to registered handlers.

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod service;

pub use chain::{Connection, ConnectionManager, ContractBinding, ContractCall, ContractInterface};
pub use config::OrchestratorConfig;
pub use error::{ErrorCode, ServiceError, ServiceResult};
pub use events::{ContractEvent, EventKind, EventSubscriber};
pub use lifecycle::Shutdown;
pub use resilience::{BackoffFn, IdempotencyKey, RetryExecutor, RetryPolicy};
pub use service::ChainService;
