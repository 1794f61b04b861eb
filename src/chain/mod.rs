//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (<NETWORK>_RPC_URL, CONTRACT_ADDRESS) + network table
//!     → connection.rs (resolve endpoint, build transport, readiness)
//!     → transport.rs (JSON-RPC calls with timeouts)
//!     → interface.rs (versioned JSON ABI)
//!     → contract.rs (address + interface + connection → call handles)
//! ```
//!
//! # Constraints
//! - No signing keys: writes go through `eth_sendTransaction` on the endpoint
//! - All RPC calls have configurable timeouts
//! - Every transport failure surfaces as a `ServiceError`

pub mod connection;
pub mod contract;
pub mod interface;
pub mod transport;

pub use connection::{Connection, ConnectionManager};
pub use contract::{parse_address, ContractBinding, ContractCall};
pub use interface::ContractInterface;
pub use transport::{ChainTransport, HttpTransportFactory, RpcTransport, TransportFactory};
