//! Service error type shared by every subsystem.
//!
//! Every failure raised by this crate is a [`ServiceError`]: a stable
//! machine-readable [`ErrorCode`], a human message, the UTC time the error was
//! raised, an optional JSON detail payload and, when one exists, the wrapped
//! underlying error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No RPC endpoint resolved from the environment or the network table.
    MissingRpcUrl,
    /// The transport could not be constructed from the resolved endpoint.
    ProviderInitializationError,
    /// Any other failure of the startup sequence.
    InitializationError,
    MissingContractAddress,
    InvalidContractAddress,
    /// The contract interface description could not be loaded or parsed.
    InvalidInterface,
    UnknownFunction,
    /// Subscription requested for an event the binding does not know.
    UnknownEvent,
    EncodingError,
    DecodingError,
    /// The RPC endpoint returned an error.
    RpcError,
    /// An operation exceeded its deadline.
    Timeout,
    /// A write with the same idempotency key is already in flight.
    DuplicateSubmission,
    ConfigError,
    /// Generic transaction failure.
    TransactionError,
}

impl ErrorCode {
    /// The stable wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingRpcUrl => "MISSING_RPC_URL",
            ErrorCode::ProviderInitializationError => "PROVIDER_INITIALIZATION_ERROR",
            ErrorCode::InitializationError => "INITIALIZATION_ERROR",
            ErrorCode::MissingContractAddress => "MISSING_CONTRACT_ADDRESS",
            ErrorCode::InvalidContractAddress => "INVALID_CONTRACT_ADDRESS",
            ErrorCode::InvalidInterface => "INVALID_INTERFACE",
            ErrorCode::UnknownFunction => "UNKNOWN_FUNCTION",
            ErrorCode::UnknownEvent => "UNKNOWN_EVENT",
            ErrorCode::EncodingError => "ENCODING_ERROR",
            ErrorCode::DecodingError => "DECODING_ERROR",
            ErrorCode::RpcError => "RPC_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::DuplicateSubmission => "DUPLICATE_SUBMISSION",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::TransactionError => "TRANSACTION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tagged error raised by the orchestrator.
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct ServiceError {
    code: ErrorCode,
    message: String,
    timestamp: DateTime<Utc>,
    details: Option<Value>,
    #[source]
    source: Option<BoxError>,
}

impl ServiceError {
    /// Create an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: Utc::now(),
            details: None,
            source: None,
        }
    }

    /// Attach a JSON detail payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the underlying error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Wrap a failure of the startup sequence as `INITIALIZATION_ERROR`.
    ///
    /// The original code and message are kept in `details` and the original
    /// error becomes the source.
    pub fn initialization(cause: ServiceError) -> Self {
        let details = serde_json::json!({
            "originalCode": cause.code.as_str(),
            "originalError": cause.message,
        });
        Self::new(ErrorCode::InitializationError, "Failed to initialize provider")
            .with_details(details)
            .with_source(cause)
    }

    /// Map a transport failure to `RPC_ERROR`.
    pub fn rpc<E>(operation: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(ErrorCode::RpcError, format!("{} failed: {}", operation, source))
            .with_details(serde_json::json!({ "operation": operation }))
            .with_source(source)
    }

    /// An operation exceeded its deadline.
    pub fn timeout(operation: &str, after: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("{} timed out after {}ms", operation, after.as_millis()),
        )
        .with_details(serde_json::json!({
            "operation": operation,
            "timeoutMs": after.as_millis() as u64,
        }))
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

/// Result alias used throughout the crate.
pub type ServiceResult<T> = Result<T, ServiceError>;
