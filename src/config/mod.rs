//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → OrchestratorConfig (validated, immutable)
//!
//! At initialization:
//!     env.rs snapshot (<NETWORK>_RPC_URL, CONTRACT_ADDRESS)
//!     → schema.rs resolve_endpoint (environment wins over the network table)
//!     → Endpoint handed to the connection manager
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::EnvSnapshot;
pub use loader::{load_config, ConfigError};
pub use schema::{
    BackoffStrategy, ConnectionConfig, ContractConfig, Endpoint, LogFormat, NetworkConfig,
    ObservabilityConfig, OrchestratorConfig, RetryConfig, SubscriberConfig, SupervisorConfig,
};
