//! Connection lifecycle.
//!
//! # Responsibilities
//! - Resolve the RPC endpoint (environment first, then the network table)
//! - Construct the transport and fail fast on unusable configuration
//! - Optionally verify the chain ID (warning only, never fatal)
//! - Track readiness of the live link

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::chain::transport::{ChainTransport, HttpTransportFactory, TransportFactory};
use crate::config::{ConnectionConfig, Endpoint, EnvSnapshot, OrchestratorConfig};
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::observability::metrics;

/// A live link to one RPC endpoint.
///
/// Cloning is cheap; clones share the transport and the readiness flag.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    endpoint: Url,
    chain_id: Option<u64>,
    ready: AtomicBool,
    transport: Arc<dyn ChainTransport>,
}

impl Connection {
    /// Wrap an existing transport. The connection starts ready.
    pub fn new(endpoint: Url, chain_id: Option<u64>, transport: Arc<dyn ChainTransport>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                endpoint,
                chain_id,
                ready: AtomicBool::new(true),
                transport,
            }),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Chain ID the connection was configured for, if any.
    pub fn chain_id(&self) -> Option<u64> {
        self.inner.chain_id
    }

    pub fn transport(&self) -> &dyn ChainTransport {
        self.inner.transport.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Mark the connection as unusable. It is never marked ready again;
    /// recovery builds a new connection.
    pub fn mark_unready(&self) {
        if self.inner.ready.swap(false, Ordering::SeqCst) {
            tracing::warn!(rpc_url = %self.inner.endpoint, "Connection marked unready");
            metrics::record_connection_ready(false);
        }
    }

    /// Whether two handles share the same underlying link.
    pub fn same_link(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("rpc_url", &self.inner.endpoint.as_str())
            .field("chain_id", &self.inner.chain_id)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Builds connections from configuration.
#[derive(Clone)]
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    settings: ConnectionConfig,
}

impl ConnectionManager {
    /// Manager using the HTTP transport.
    pub fn new(settings: ConnectionConfig) -> Self {
        Self::with_factory(settings, Arc::new(HttpTransportFactory))
    }

    pub fn with_factory(settings: ConnectionConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self { factory, settings }
    }

    pub fn settings(&self) -> &ConnectionConfig {
        &self.settings
    }

    /// Resolve the endpoint from `config` and `env`, then connect.
    ///
    /// Fails with `MISSING_RPC_URL` before any transport is built when no
    /// endpoint resolves.
    pub async fn initialize(
        &self,
        config: &OrchestratorConfig,
        env: &EnvSnapshot,
    ) -> ServiceResult<Connection> {
        let endpoint = config.resolve_endpoint(env)?;
        self.connect(&endpoint).await
    }

    /// Connect to an already resolved endpoint.
    pub async fn connect(&self, endpoint: &Endpoint) -> ServiceResult<Connection> {
        let url: Url = endpoint.rpc_url.parse().map_err(|e: url::ParseError| {
            ServiceError::new(
                ErrorCode::ProviderInitializationError,
                format!("Invalid RPC URL '{}': {}", endpoint.rpc_url, e),
            )
            .with_source(e)
        })?;

        let transport = self.factory.connect(&url, &self.settings).map_err(|e| {
            if e.code() == ErrorCode::ProviderInitializationError {
                e
            } else {
                ServiceError::new(
                    ErrorCode::ProviderInitializationError,
                    "Failed to initialize JSON-RPC provider",
                )
                .with_source(e)
            }
        })?;

        let connection = Connection::new(url, endpoint.chain_id, transport);

        if self.settings.verify_chain_id {
            self.verify_chain_id(&connection).await;
        }

        metrics::record_connection_ready(true);
        tracing::info!(
            network = %endpoint.network,
            rpc_url = %connection.endpoint(),
            "Provider successfully initialized"
        );

        Ok(connection)
    }

    /// Compare the endpoint's chain ID with the configured one.
    ///
    /// Never fails initialization; an unreachable endpoint or a mismatch is
    /// only logged.
    async fn verify_chain_id(&self, connection: &Connection) {
        let Some(expected) = connection.chain_id() else {
            return;
        };

        match connection.transport().chain_id().await {
            Ok(actual) if actual == expected => {
                tracing::debug!(chain_id = actual, "Chain ID verified");
            }
            Ok(actual) => {
                tracing::warn!(expected, actual, "Chain ID mismatch");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Provider initialized but chain verification failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.settings)
            .finish()
    }
}
