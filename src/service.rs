//! Service facade.
//!
//! [`ChainService`] owns everything a process needs to talk to the
//! marketplace contract: the active session (connection, binding and
//! subscriber worker), the subscription registry, the retry executor and,
//! when enabled, the reconnect supervisor.
//!
//! # Startup Sequence
//! ```text
//! 1. Resolve endpoint          (MISSING_RPC_URL)
//! 2. Connect                   (PROVIDER_INITIALIZATION_ERROR)
//! 3. Resolve contract address  ┐
//! 4. Load interface            │ wrapped as INITIALIZATION_ERROR
//! 5. Bind contract             ┘
//! 6. Register startup subscriptions
//! 7. Start subscriber worker
//! 8. Spawn supervisor (optional)
//! ```

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{TxHash, U256};
use arc_swap::ArcSwap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::chain::connection::{Connection, ConnectionManager};
use crate::chain::contract::{parse_address, ContractBinding};
use crate::chain::interface::ContractInterface;
use crate::config::{EnvSnapshot, Endpoint, OrchestratorConfig};
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::events::handler::HandlerResult;
use crate::events::subscriber::{EventSubscriber, SubscriptionRegistry};
use crate::events::types::ContractEvent;
use crate::lifecycle::session::Session;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::supervisor::ConnectionSupervisor;
use crate::resilience::idempotency::{IdempotencyKey, WriteLedger};
use crate::resilience::retries::{RetryExecutor, RetryPolicy};

/// Handle to a running orchestrator.
pub struct ChainService {
    config: OrchestratorConfig,
    session: Arc<ArcSwap<Session>>,
    registry: Arc<SubscriptionRegistry>,
    executor: RetryExecutor,
    shutdown: Shutdown,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ChainService {
    /// Start the service over HTTP.
    pub async fn initialize(config: OrchestratorConfig, env: &EnvSnapshot) -> ServiceResult<Self> {
        let manager = ConnectionManager::new(config.connection.clone());
        Self::initialize_with(config, env, manager).await
    }

    /// Start the service with an explicit connection manager.
    pub async fn initialize_with(
        config: OrchestratorConfig,
        env: &EnvSnapshot,
        manager: ConnectionManager,
    ) -> ServiceResult<Self> {
        Self::initialize_with_subscriptions(config, env, manager, |_| Ok(())).await
    }

    /// Start the service, registering handlers before the first poll.
    ///
    /// Handlers added through `subscribe` see the head observed by the
    /// worker's first tick; handlers added after startup may miss it.
    pub async fn initialize_with_subscriptions<S>(
        config: OrchestratorConfig,
        env: &EnvSnapshot,
        manager: ConnectionManager,
        subscribe: S,
    ) -> ServiceResult<Self>
    where
        S: FnOnce(&SubscriptionRegistry) -> ServiceResult<()>,
    {
        let endpoint = config.resolve_endpoint(env).inspect_err(log_init_error)?;
        let connection = manager
            .connect(&endpoint)
            .await
            .inspect_err(log_init_error)?;

        let contract = bind_contract(&config, &endpoint, connection).map_err(|e| {
            let wrapped = ServiceError::initialization(e);
            log_init_error(&wrapped);
            wrapped
        })?;

        let subscriber = EventSubscriber::new(
            contract.clone(),
            config.subscriber.clone(),
            config.contract.value_decimals,
        );
        let registry = subscriber.registry().clone();
        subscribe(registry.as_ref())?;
        let session = Arc::new(ArcSwap::from_pointee(Session::start(subscriber)));
        let shutdown = Shutdown::new();

        let supervisor = if config.supervisor.enabled {
            let supervisor = ConnectionSupervisor::new(
                manager,
                endpoint.clone(),
                contract.address(),
                registry.clone(),
                config.subscriber.clone(),
                config.contract.value_decimals,
                config.supervisor.clone(),
                session.clone(),
            );
            Some(tokio::spawn(supervisor.run(shutdown.subscribe())))
        } else {
            None
        };

        tracing::info!(
            network = %endpoint.network,
            contract = %contract.address(),
            interface = contract.interface().name(),
            supervised = supervisor.is_some(),
            "Chain service initialized"
        );

        Ok(Self {
            executor: RetryExecutor::new(RetryPolicy::from(&config.retry)).with_ledger(
                WriteLedger::with_retention(Duration::from_secs(config.retry.completed_write_ttl_secs)),
            ),
            config,
            session,
            registry,
            shutdown,
            supervisor: Mutex::new(supervisor),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The active session. Replaced wholesale on reconnect.
    pub fn session(&self) -> Arc<Session> {
        self.session.load_full()
    }

    pub fn connection(&self) -> Connection {
        self.session.load().connection().clone()
    }

    pub fn contract(&self) -> ContractBinding {
        self.session.load().contract().clone()
    }

    pub fn subscriber(&self) -> EventSubscriber {
        self.session.load().subscriber().clone()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Register a handler for new block heights.
    pub fn subscribe_blocks<F, Fut>(&self, handler: F)
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.subscribe_blocks(handler)
    }

    /// Register a handler for the contract event `name`.
    pub fn subscribe_contract_event<F, Fut>(&self, name: &str, handler: F) -> ServiceResult<()>
    where
        F: Fn(ContractEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.subscribe_contract_event(name, handler)
    }

    /// Current head, retried under the configured policy.
    pub async fn block_number(&self) -> ServiceResult<u64> {
        let connection = self.connection();
        self.executor
            .execute(|| {
                let connection = connection.clone();
                async move { connection.transport().block_number().await }
            })
            .await
    }

    /// Read-only call, retried under the configured policy.
    pub async fn read(&self, function: &str, args: &[DynSolValue]) -> ServiceResult<Vec<DynSolValue>> {
        let call = self.contract().function(function, args)?;
        self.executor
            .execute(|| {
                let call = call.clone();
                async move { call.call().await }
            })
            .await
    }

    /// State-changing call submitted at most once per `key`.
    pub async fn submit(
        &self,
        key: IdempotencyKey,
        function: &str,
        args: &[DynSolValue],
        value: U256,
    ) -> ServiceResult<TxHash> {
        let call = self.contract().function(function, args)?.value(value);
        self.executor
            .execute_write(key, || {
                let call = call.clone();
                async move { call.send().await }
            })
            .await
    }

    /// Stop the supervisor, then the active subscriber worker.
    pub async fn shutdown(&self) {
        tracing::info!("Chain service shutting down");
        self.shutdown.trigger();

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Supervisor task ended abnormally");
            }
        }

        self.session.load_full().stop().await;
        tracing::info!("Chain service stopped");
    }
}

impl std::fmt::Debug for ChainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainService")
            .field("network", &self.config.network)
            .field("session", &self.session.load_full())
            .field("registry", &self.registry)
            .finish()
    }
}

fn bind_contract(
    config: &OrchestratorConfig,
    endpoint: &Endpoint,
    connection: Connection,
) -> ServiceResult<ContractBinding> {
    let raw = endpoint.contract_address.as_deref().ok_or_else(|| {
        ServiceError::new(
            ErrorCode::MissingContractAddress,
            format!(
                "Contract address is missing. Set CONTRACT_ADDRESS or networks.{}.contract_address",
                endpoint.network
            ),
        )
    })?;
    let address = parse_address(raw)?;
    let interface = ContractInterface::load(config.contract.artifact_path.as_deref())?;
    ContractBinding::bind(connection, address, Arc::new(interface))
}

fn log_init_error(e: &ServiceError) {
    tracing::error!(code = %e.code(), error = %e, "Provider initialization error");
}
