//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. All errors are
//! collected rather than stopping at the first one.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{BackoffStrategy, OrchestratorConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("network name must not be empty")]
    EmptyNetwork,

    #[error("retry.max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("retry.max_delay_ms ({max}) must not be below retry.base_delay_ms ({base})")]
    MaxDelayBelowBase { base: u64, max: u64 },

    #[error("retry.completed_write_ttl_secs must be greater than 0")]
    ZeroWriteRetention,

    #[error("connection.rpc_timeout_secs must be greater than 0")]
    ZeroRpcTimeout,

    #[error("subscriber.poll_interval_ms must be greater than 0")]
    ZeroPollInterval,

    #[error("subscriber.max_block_range must be greater than 0")]
    ZeroBlockRange,

    #[error("contract.value_decimals must be at most 77, got {0}")]
    TooManyDecimals(u8),

    #[error("supervisor.failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("supervisor.check_interval_secs must be greater than 0")]
    ZeroCheckInterval,

    #[error("invalid observability.metrics_address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.network.trim().is_empty() {
        errors.push(ValidationError::EmptyNetwork);
    }

    if config.retry.max_attempts == 0 {
        errors.push(ValidationError::ZeroMaxAttempts);
    }
    if config.retry.strategy == BackoffStrategy::Exponential
        && config.retry.max_delay_ms < config.retry.base_delay_ms
    {
        errors.push(ValidationError::MaxDelayBelowBase {
            base: config.retry.base_delay_ms,
            max: config.retry.max_delay_ms,
        });
    }

    if config.retry.completed_write_ttl_secs == 0 {
        errors.push(ValidationError::ZeroWriteRetention);
    }

    if config.connection.rpc_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRpcTimeout);
    }

    if config.subscriber.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }
    if config.subscriber.max_block_range == 0 {
        errors.push(ValidationError::ZeroBlockRange);
    }

    if config.contract.value_decimals > 77 {
        errors.push(ValidationError::TooManyDecimals(config.contract.value_decimals));
    }

    if config.supervisor.enabled {
        if config.supervisor.failure_threshold == 0 {
            errors.push(ValidationError::ZeroFailureThreshold);
        }
        if config.supervisor.check_interval_secs == 0 {
            errors.push(ValidationError::ZeroCheckInterval);
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
