//! JSON-RPC transport with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to a JSON-RPC endpoint
//! - Query chain state (chain id, block number, logs)
//! - Execute contract reads and submit contract writes
//! - Map every transport failure to a `ServiceError`

use alloy::primitives::{Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{ErrorCode, ServiceError, ServiceResult};

/// Operations the orchestrator needs from a chain endpoint.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// Chain ID reported by the endpoint.
    async fn chain_id(&self) -> ServiceResult<u64>;

    /// Latest block number.
    async fn block_number(&self) -> ServiceResult<u64>;

    /// Logs matching a filter.
    async fn logs(&self, filter: &Filter) -> ServiceResult<Vec<Log>>;

    /// Execute a read-only call (`eth_call`).
    async fn call(&self, tx: TransactionRequest) -> ServiceResult<Bytes>;

    /// Submit a transaction signed by the endpoint (`eth_sendTransaction`).
    async fn send_transaction(&self, tx: TransactionRequest) -> ServiceResult<TxHash>;
}

/// Builds transports for an endpoint.
pub trait TransportFactory: Send + Sync {
    fn connect(
        &self,
        endpoint: &Url,
        settings: &ConnectionConfig,
    ) -> ServiceResult<Arc<dyn ChainTransport>>;
}

/// Factory for [`RpcTransport`] over HTTP.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn connect(
        &self,
        endpoint: &Url,
        settings: &ConnectionConfig,
    ) -> ServiceResult<Arc<dyn ChainTransport>> {
        match endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ServiceError::new(
                    ErrorCode::ProviderInitializationError,
                    format!("Unsupported RPC URL scheme '{}'", other),
                ))
            }
        }

        let provider = ProviderBuilder::new().connect_http(endpoint.clone());
        Ok(Arc::new(RpcTransport::new(
            Arc::new(provider),
            Duration::from_secs(settings.rpc_timeout_secs),
        )))
    }
}

/// Alloy provider wrapper enforcing a per-call timeout.
#[derive(Clone)]
pub struct RpcTransport {
    provider: Arc<dyn Provider + Send + Sync>,
    timeout_duration: Duration,
}

impl RpcTransport {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>, timeout_duration: Duration) -> Self {
        Self {
            provider,
            timeout_duration,
        }
    }

    /// Get the underlying provider.
    pub fn provider(&self) -> &(dyn Provider + Send + Sync) {
        self.provider.as_ref()
    }

    async fn guarded<T, E, F>(&self, operation: &str, fut: F) -> ServiceResult<T>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                tracing::warn!(operation, error = %e, "RPC error");
                Err(ServiceError::rpc(operation, e))
            }
            Err(_) => {
                tracing::warn!(operation, "RPC timeout");
                Err(ServiceError::timeout(operation, self.timeout_duration))
            }
        }
    }
}

#[async_trait]
impl ChainTransport for RpcTransport {
    async fn chain_id(&self) -> ServiceResult<u64> {
        self.guarded("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn block_number(&self) -> ServiceResult<u64> {
        self.guarded("eth_blockNumber", self.provider.get_block_number()).await
    }

    async fn logs(&self, filter: &Filter) -> ServiceResult<Vec<Log>> {
        self.guarded("eth_getLogs", self.provider.get_logs(filter)).await
    }

    async fn call(&self, tx: TransactionRequest) -> ServiceResult<Bytes> {
        self.guarded("eth_call", self.provider.call(tx)).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> ServiceResult<TxHash> {
        let pending = self
            .guarded("eth_sendTransaction", self.provider.send_transaction(tx))
            .await?;
        Ok(*pending.tx_hash())
    }
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("timeout", &self.timeout_duration)
            .finish()
    }
}
