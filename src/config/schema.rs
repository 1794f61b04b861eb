//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! orchestrator. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::env::EnvSnapshot;
use crate::error::{ErrorCode, ServiceError, ServiceResult};

/// Environment variable holding the contract address.
pub const CONTRACT_ADDRESS_ENV_VAR: &str = "CONTRACT_ADDRESS";

/// Root configuration for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Name of the network entry to use (e.g., "sepolia").
    pub network: String,

    /// Network table keyed by network name.
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Connection settings.
    pub connection: ConnectionConfig,

    /// Contract interface settings.
    pub contract: ContractConfig,

    /// Retry policy defaults.
    pub retry: RetryConfig,

    /// Event subscriber settings.
    pub subscriber: SubscriberConfig,

    /// Reconnect supervisor settings.
    pub supervisor: SupervisorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                rpc_url: None,
                chain_id: Some(11_155_111),
                contract_address: None,
            },
        );

        Self {
            network: "sepolia".to_string(),
            networks,
            connection: ConnectionConfig::default(),
            contract: ContractConfig::default(),
            retry: RetryConfig::default(),
            subscriber: SubscriberConfig::default(),
            supervisor: SupervisorConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Name of the environment variable that overrides the RPC URL of the
    /// selected network, e.g. `SEPOLIA_RPC_URL`.
    pub fn rpc_url_env_var(&self) -> String {
        format!("{}_RPC_URL", self.network.to_uppercase().replace('-', "_"))
    }

    /// Resolve the endpoint for the selected network.
    ///
    /// Environment values take precedence over the network table. Empty
    /// values count as absent.
    pub fn resolve_endpoint(&self, env: &EnvSnapshot) -> ServiceResult<Endpoint> {
        let table = self.networks.get(&self.network);
        let env_var = self.rpc_url_env_var();

        let rpc_url = env
            .get(&env_var)
            .or_else(|| table.and_then(|n| non_empty(n.rpc_url.as_deref())))
            .ok_or_else(|| {
                ServiceError::new(
                    ErrorCode::MissingRpcUrl,
                    format!(
                        "RPC URL is missing. Set {} or networks.{}.rpc_url",
                        env_var, self.network
                    ),
                )
                .with_details(serde_json::json!({ "network": self.network }))
            })?;

        let contract_address = env
            .get(CONTRACT_ADDRESS_ENV_VAR)
            .or_else(|| table.and_then(|n| non_empty(n.contract_address.as_deref())));

        Ok(Endpoint {
            network: self.network.clone(),
            rpc_url,
            chain_id: table.and_then(|n| n.chain_id),
            contract_address,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// An endpoint resolved from config and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub network: String,
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    pub contract_address: Option<String>,
}

/// Per-network entry of the network table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: Option<String>,

    /// Expected chain ID (e.g., 11155111 for Sepolia).
    pub chain_id: Option<u64>,

    /// Address of the marketplace contract on this network.
    pub contract_address: Option<String>,
}

/// Connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Compare the endpoint's chain ID with the configured one at startup.
    pub verify_chain_id: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_secs: 10,
            verify_chain_id: true,
        }
    }
}

/// Contract interface settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Path to a JSON artifact (`{"abi": [...]}`) or a bare ABI array.
    /// The built-in marketplace interface is used when unset.
    pub artifact_path: Option<String>,

    /// Decimals of monetary amounts emitted by the contract.
    pub value_decimals: u8,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            artifact_path: None,
            value_decimals: 18,
        }
    }
}

/// Backoff strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Delay growth between attempts.
    pub strategy: BackoffStrategy,

    /// Cap for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% jitter to exponential delays.
    pub jitter: bool,

    /// How long a completed write is remembered for deduplication, in seconds.
    pub completed_write_ttl_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            strategy: BackoffStrategy::Linear,
            max_delay_ms: 30_000,
            jitter: true,
            completed_write_ttl_secs: 86_400,
        }
    }
}

/// Event subscriber configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Maximum number of blocks processed in one poll.
    pub max_block_range: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4000,
            max_block_range: 1000,
        }
    }
}

/// Reconnect supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Enable the supervisor.
    pub enabled: bool,

    /// Health probe interval in seconds.
    pub check_interval_secs: u64,

    /// Consecutive failed probes before the session is rebuilt.
    pub failure_threshold: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_secs: 15,
            failure_threshold: 3,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_table_url(url: Option<&str>) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                rpc_url: url.map(str::to_string),
                chain_id: Some(11_155_111),
                contract_address: Some("0x00000000000000000000000000000000000000aa".to_string()),
            },
        );
        config
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.network, "sepolia");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
        assert!(!config.supervisor.enabled);
    }

    #[test]
    fn test_env_var_name() {
        let mut config = OrchestratorConfig::default();
        assert_eq!(config.rpc_url_env_var(), "SEPOLIA_RPC_URL");
        config.network = "base-sepolia".to_string();
        assert_eq!(config.rpc_url_env_var(), "BASE_SEPOLIA_RPC_URL");
    }

    #[test]
    fn test_env_takes_precedence() {
        let config = config_with_table_url(Some("http://table:8545"));
        let env = EnvSnapshot::from_pairs([("SEPOLIA_RPC_URL", "http://env:8545")]);

        let endpoint = config.resolve_endpoint(&env).unwrap();
        assert_eq!(endpoint.rpc_url, "http://env:8545");
        assert_eq!(endpoint.chain_id, Some(11_155_111));
    }

    #[test]
    fn test_table_used_without_env() {
        let config = config_with_table_url(Some("http://table:8545"));
        let endpoint = config.resolve_endpoint(&EnvSnapshot::empty()).unwrap();
        assert_eq!(endpoint.rpc_url, "http://table:8545");
        assert_eq!(
            endpoint.contract_address.as_deref(),
            Some("0x00000000000000000000000000000000000000aa")
        );
    }

    #[test]
    fn test_missing_rpc_url() {
        let config = config_with_table_url(None);
        let err = config.resolve_endpoint(&EnvSnapshot::empty()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRpcUrl);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let config = config_with_table_url(Some("   "));
        let env = EnvSnapshot::from_pairs([("SEPOLIA_RPC_URL", "")]);
        let err = config.resolve_endpoint(&env).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRpcUrl);
    }

    #[test]
    fn test_contract_address_env_override() {
        let config = config_with_table_url(Some("http://table:8545"));
        let env = EnvSnapshot::from_pairs([(
            CONTRACT_ADDRESS_ENV_VAR,
            "0x00000000000000000000000000000000000000bb",
        )]);
        let endpoint = config.resolve_endpoint(&env).unwrap();
        assert_eq!(
            endpoint.contract_address.as_deref(),
            Some("0x00000000000000000000000000000000000000bb")
        );
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            network = "local"

            [networks.local]
            rpc_url = "http://localhost:8545"
            chain_id = 31337

            [retry]
            max_attempts = 5
            strategy = "exponential"

            [observability]
            log_format = "json"
        "#;
        let config: OrchestratorConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.network, "local");
        assert_eq!(config.networks["local"].chain_id, Some(31337));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
