//! A running connection together with its binding and subscriber worker.

use std::sync::Mutex;
use tokio::task::JoinHandle;

use crate::chain::connection::Connection;
use crate::chain::contract::ContractBinding;
use crate::events::subscriber::EventSubscriber;
use crate::lifecycle::shutdown::Shutdown;

/// Connection, contract binding and the subscriber worker driving them.
///
/// Replaced as a whole when the supervisor reconnects.
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    contract: ContractBinding,
    subscriber: EventSubscriber,
    stop: Shutdown,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Spawn the subscriber worker and return the running session.
    pub fn start(subscriber: EventSubscriber) -> Self {
        let contract = subscriber.binding().clone();
        let connection = contract.connection().clone();
        let stop = Shutdown::new();
        let worker = subscriber.spawn(stop.subscribe());

        Self {
            connection,
            contract,
            subscriber,
            stop,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn contract(&self) -> &ContractBinding {
        &self.contract
    }

    pub fn subscriber(&self) -> &EventSubscriber {
        &self.subscriber
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        self.stop.trigger();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Subscriber worker ended abnormally");
            }
        }
    }
}
