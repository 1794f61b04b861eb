//! Block and contract-event subscriptions.
//!
//! # State
//! ```text
//! Unregistered
//!     → subscribe_blocks            → block subscription active
//!     → subscribe_contract_event(n) → event subscription active for n
//! ```
//! Both kinds may be active at once. There is no unsubscribe; subscriptions
//! end when the worker is shut down with its connection.
//!
//! # Polling
//! One worker per connection polls the head. The first poll delivers the
//! current head only; later polls deliver every height in `(cursor, head]`
//! in ascending order, capped at `max_block_range` heights per poll. Logs
//! for the same range are fetched before anything is dispatched, so a failed
//! fetch leaves the cursor untouched and the range is retried on the next
//! tick.

use alloy::rpc::types::Log;
use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time;

use crate::chain::contract::ContractBinding;
use crate::chain::interface::ContractInterface;
use crate::config::SubscriberConfig;
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::events::handler::{
    block_handler, event_handler, invoke_isolated, BlockHandler, EventHandler, HandlerResult,
};
use crate::events::normalize::normalize_log;
use crate::events::types::{ContractEvent, EventKind};
use crate::observability::metrics;

/// Registered handlers, independent of any connection.
///
/// The registry outlives individual subscribers so a rebuilt connection can
/// pick up every existing subscription.
pub struct SubscriptionRegistry {
    interface: Arc<ContractInterface>,
    blocks: RwLock<Vec<BlockHandler>>,
    events: DashMap<EventKind, Vec<EventHandler>>,
}

impl SubscriptionRegistry {
    pub fn new(interface: Arc<ContractInterface>) -> Self {
        Self {
            interface,
            blocks: RwLock::new(Vec::new()),
            events: DashMap::new(),
        }
    }

    /// Register a handler for new block heights.
    pub fn subscribe_blocks<F, Fut>(&self, handler: F)
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let mut blocks = self.blocks.write().unwrap_or_else(|e| e.into_inner());
        blocks.push(block_handler(handler));
        tracing::info!(handlers = blocks.len(), "Block subscription registered");
    }

    /// Register a handler for the contract event `name`.
    ///
    /// Fails with `UNKNOWN_EVENT` if the name is not a decodable event or the
    /// bound interface does not declare it with the decodable signature.
    pub fn subscribe_contract_event<F, Fut>(&self, name: &str, handler: F) -> ServiceResult<()>
    where
        F: Fn(ContractEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let kind = EventKind::from_name(name)?;
        self.subscribe_event(kind, handler)
    }

    /// Register a handler for a known event kind.
    pub fn subscribe_event<F, Fut>(&self, kind: EventKind, handler: F) -> ServiceResult<()>
    where
        F: Fn(ContractEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if !self.interface.declares_event(kind.name(), kind.signature_hash()) {
            let reason = if self.interface.has_event(kind.name()) {
                "is declared with a different signature by"
            } else {
                "is not declared by"
            };
            return Err(ServiceError::new(
                ErrorCode::UnknownEvent,
                format!("Event '{}' {} interface '{}'", kind, reason, self.interface.name()),
            )
            .with_details(serde_json::json!({ "event": kind.name() })));
        }

        self.events
            .entry(kind)
            .or_default()
            .push(event_handler(handler));
        tracing::info!(event = kind.name(), "Contract event subscription registered");
        Ok(())
    }

    /// Interface used to validate event names.
    pub fn interface(&self) -> &Arc<ContractInterface> {
        &self.interface
    }

    fn block_handlers(&self) -> Vec<BlockHandler> {
        self.blocks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn event_handlers(&self, kind: EventKind) -> Vec<EventHandler> {
        self.events
            .get(&kind)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Whether any contract event subscription exists.
    pub fn has_event_subscriptions(&self) -> bool {
        self.events.iter().any(|r| !r.value().is_empty())
    }

    pub fn block_subscription_count(&self) -> usize {
        self.blocks.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("interface", &self.interface.name())
            .field("block_handlers", &self.block_subscription_count())
            .field("event_kinds", &self.events.len())
            .finish()
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    /// Block heights dispatched.
    pub blocks: usize,
    /// Contract events dispatched.
    pub events: usize,
    /// Handler invocations that failed.
    pub handler_failures: usize,
}

/// Polling subscriber for one contract binding.
#[derive(Clone)]
pub struct EventSubscriber {
    binding: ContractBinding,
    registry: Arc<SubscriptionRegistry>,
    config: SubscriberConfig,
    value_decimals: u8,
    cursor: Arc<Mutex<Option<u64>>>,
    polling: Arc<AsyncMutex<()>>,
}

impl EventSubscriber {
    /// Subscriber with a fresh registry.
    pub fn new(binding: ContractBinding, config: SubscriberConfig, value_decimals: u8) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(binding.interface().clone()));
        Self::with_registry(binding, registry, config, value_decimals)
    }

    /// Subscriber sharing an existing registry.
    pub fn with_registry(
        binding: ContractBinding,
        registry: Arc<SubscriptionRegistry>,
        config: SubscriberConfig,
        value_decimals: u8,
    ) -> Self {
        Self {
            binding,
            registry,
            config,
            value_decimals,
            cursor: Arc::new(Mutex::new(None)),
            polling: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Continue from `last_block` instead of the current head.
    pub fn resume_from(self, last_block: Option<u64>) -> Self {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = last_block;
        self
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn binding(&self) -> &ContractBinding {
        &self.binding
    }

    /// Last block height processed, if any.
    pub fn cursor(&self) -> Option<u64> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// See [`SubscriptionRegistry::subscribe_blocks`].
    pub fn subscribe_blocks<F, Fut>(&self, handler: F)
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.subscribe_blocks(handler)
    }

    /// See [`SubscriptionRegistry::subscribe_contract_event`].
    pub fn subscribe_contract_event<F, Fut>(&self, name: &str, handler: F) -> ServiceResult<()>
    where
        F: Fn(ContractEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.subscribe_contract_event(name, handler)
    }

    /// Run one poll step.
    ///
    /// Polls on clones of the same subscriber run one at a time, so a manual
    /// poll alongside the worker never delivers a range twice.
    pub async fn poll(&self) -> ServiceResult<PollOutcome> {
        let _polling = self.polling.lock().await;
        let transport = self.binding.connection().transport();
        let head = transport.block_number().await?;

        let from = match self.cursor() {
            None => head,
            Some(last) if head <= last => {
                if head < last {
                    tracing::debug!(head, last, "Head behind cursor, waiting");
                }
                return Ok(PollOutcome::default());
            }
            Some(last) => last + 1,
        };
        let to = head.min(from.saturating_add(self.config.max_block_range.max(1) - 1));

        let mut logs = if self.registry.has_event_subscriptions() {
            transport
                .logs(&self.binding.log_filter(from, to))
                .await?
        } else {
            Vec::new()
        };
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut outcome = PollOutcome::default();

        let block_handlers = self.registry.block_handlers();
        for height in from..=to {
            tracing::debug!(block = height, "New block");
            metrics::record_block_delivered();
            outcome.blocks += 1;
            for handler in &block_handlers {
                if !invoke_isolated("block", || handler(height)).await {
                    outcome.handler_failures += 1;
                }
            }
        }

        for log in &logs {
            self.dispatch_log(log, &mut outcome).await;
        }

        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = Some(to);
        Ok(outcome)
    }

    async fn dispatch_log(&self, log: &Log, outcome: &mut PollOutcome) {
        let event = match normalize_log(log, self.value_decimals) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    tx_hash = ?log.transaction_hash,
                    error = %e,
                    "Skipping undecodable log"
                );
                return;
            }
        };

        let kind = event.kind();
        let handlers = self.registry.event_handlers(kind);
        if handlers.is_empty() {
            return;
        }

        tracing::info!(
            event = kind.name(),
            tx_hash = %event.origin().transaction_hash,
            block = ?event.origin().block_number,
            "Contract event received"
        );
        metrics::record_event_delivered(kind.name());
        outcome.events += 1;

        for handler in &handlers {
            let event = event.clone();
            if !invoke_isolated(kind.name(), || handler(event)).await {
                outcome.handler_failures += 1;
            }
        }
    }

    /// Spawn the polling worker. It stops when `shutdown` fires.
    pub fn spawn(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let subscriber = self.clone();
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        tokio::spawn(async move {
            tracing::info!(
                contract = %subscriber.binding.address(),
                interval_ms = interval.as_millis() as u64,
                "Event subscriber starting"
            );

            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = subscriber.poll().await {
                            tracing::error!(error = %e, "Error polling chain notifications");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Event subscriber received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("contract", &self.binding.address())
            .field("cursor", &self.cursor())
            .field("registry", &self.registry)
            .finish()
    }
}
