//! Reconnect supervisor.
//!
//! # State Transitions
//! ```text
//! Healthy → Degraded: probe fails (failures < threshold)
//! Degraded → Healthy: probe succeeds
//! Degraded → Rebuilding: failures >= threshold
//! Rebuilding → Healthy: new connection, binding and worker swapped in
//! Rebuilding → Degraded: rebuild failed, retried on the next tick
//! ```
//!
//! A rebuild connects first, binds the contract, stops the old worker, then
//! starts a new worker over the same subscription registry resuming from the
//! old cursor, and finally swaps the session in one store.

use alloy::primitives::Address;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::chain::connection::ConnectionManager;
use crate::chain::contract::ContractBinding;
use crate::config::{Endpoint, SubscriberConfig, SupervisorConfig};
use crate::error::ServiceResult;
use crate::events::subscriber::{EventSubscriber, SubscriptionRegistry};
use crate::lifecycle::session::Session;
use crate::observability::metrics;

/// Result of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    Healthy,
    Degraded { failures: u32 },
    Reconnected,
    ReconnectFailed { failures: u32 },
}

/// Monitors the active session and rebuilds it on transport loss.
pub struct ConnectionSupervisor {
    manager: ConnectionManager,
    endpoint: Endpoint,
    address: Address,
    registry: Arc<SubscriptionRegistry>,
    subscriber_config: SubscriberConfig,
    value_decimals: u8,
    config: SupervisorConfig,
    session: Arc<ArcSwap<Session>>,
    failures: AtomicU32,
}

impl ConnectionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: ConnectionManager,
        endpoint: Endpoint,
        address: Address,
        registry: Arc<SubscriptionRegistry>,
        subscriber_config: SubscriberConfig,
        value_decimals: u8,
        config: SupervisorConfig,
        session: Arc<ArcSwap<Session>>,
    ) -> Self {
        Self {
            manager,
            endpoint,
            address,
            registry,
            subscriber_config,
            value_decimals,
            config,
            session,
            failures: AtomicU32::new(0),
        }
    }

    /// Probe the active connection once and rebuild if the threshold is hit.
    pub async fn check_once(&self) -> SupervisorAction {
        let current = self.session.load_full();

        match current.connection().transport().block_number().await {
            Ok(_) => {
                let previous = self.failures.swap(0, Ordering::SeqCst);
                if previous > 0 {
                    tracing::info!(previous_failures = previous, "Connection recovered");
                }
                return SupervisorAction::Healthy;
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    failures,
                    threshold = self.config.failure_threshold,
                    error = %e,
                    "Connection health probe failed"
                );
                if failures < self.config.failure_threshold.max(1) {
                    return SupervisorAction::Degraded { failures };
                }
            }
        }

        current.connection().mark_unready();

        match self.rebuild(&current).await {
            Ok(()) => {
                self.failures.store(0, Ordering::SeqCst);
                metrics::record_reconnect();
                SupervisorAction::Reconnected
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconnect failed, retrying on next check");
                SupervisorAction::ReconnectFailed {
                    failures: self.failures.load(Ordering::SeqCst),
                }
            }
        }
    }

    async fn rebuild(&self, current: &Session) -> ServiceResult<()> {
        let connection = self.manager.connect(&self.endpoint).await?;
        let contract = ContractBinding::bind(
            connection,
            self.address,
            self.registry.interface().clone(),
        )?;

        current.stop().await;
        let cursor = current.subscriber().cursor();

        let subscriber = EventSubscriber::with_registry(
            contract,
            self.registry.clone(),
            self.subscriber_config.clone(),
            self.value_decimals,
        )
        .resume_from(cursor);

        self.session.store(Arc::new(Session::start(subscriber)));
        tracing::info!(
            rpc_url = %self.endpoint.rpc_url,
            resume_after = ?cursor,
            "Session rebuilt"
        );
        Ok(())
    }

    /// Run health checks until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.config.check_interval_secs.max(1));
        tracing::info!(
            interval_secs = interval.as_secs(),
            threshold = self.config.failure_threshold,
            "Connection supervisor starting"
        );

        let mut ticker = time::interval(interval);
        // The first tick completes immediately; the session was just built.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Connection supervisor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("rpc_url", &self.endpoint.rpc_url)
            .field("failures", &self.failures.load(Ordering::SeqCst))
            .field("config", &self.config)
            .finish()
    }
}
