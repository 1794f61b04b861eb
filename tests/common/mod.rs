//! Shared utilities for integration tests.
#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, LogData, TxHash, B256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use chain_orchestrator::chain::transport::{ChainTransport, TransportFactory};
use chain_orchestrator::chain::{Connection, ContractBinding, ContractInterface};
use chain_orchestrator::config::ConnectionConfig;
use chain_orchestrator::{ErrorCode, ServiceError, ServiceResult};

pub const CONTRACT: Address = Address::new([0x11; 20]);
pub const CHAIN_ID: u64 = 11_155_111;

/// Scripted in-memory chain endpoint.
///
/// Block heights are served from a queue; once drained the last height is
/// repeated. Logs are filtered by the requested block range.
#[derive(Default)]
pub struct MockChain {
    heads: Mutex<VecDeque<u64>>,
    last_head: AtomicU64,
    logs: Mutex<Vec<Log>>,
    call_output: Mutex<Bytes>,
    fail_blocks: AtomicBool,
    fail_logs: AtomicBool,
    fail_sends: AtomicBool,
    block_calls: AtomicU32,
    log_calls: AtomicU32,
    eth_calls: AtomicU32,
    sends: AtomicU32,
}

impl MockChain {
    pub fn with_heads(heads: impl IntoIterator<Item = u64>) -> Arc<Self> {
        let chain = Self::default();
        *chain.heads.lock().unwrap() = heads.into_iter().collect();
        Arc::new(chain)
    }

    pub fn push_head(&self, head: u64) {
        self.heads.lock().unwrap().push_back(head);
    }

    pub fn push_log(&self, data: LogData, block: u64, log_index: u64) {
        self.logs.lock().unwrap().push(Log {
            inner: alloy::primitives::Log {
                address: CONTRACT,
                data,
            },
            block_number: Some(block),
            transaction_hash: Some(B256::with_last_byte(block as u8)),
            log_index: Some(log_index),
            ..Default::default()
        });
    }

    pub fn set_call_output(&self, output: Vec<u8>) {
        *self.call_output.lock().unwrap() = Bytes::from(output);
    }

    pub fn set_fail_blocks(&self, fail: bool) {
        self.fail_blocks.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn block_calls(&self) -> u32 {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> u32 {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn eth_calls(&self) -> u32 {
        self.eth_calls.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

fn unavailable(operation: &str) -> ServiceError {
    ServiceError::new(ErrorCode::RpcError, format!("{} failed: connection refused", operation))
}

#[async_trait]
impl ChainTransport for MockChain {
    async fn chain_id(&self) -> ServiceResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn block_number(&self) -> ServiceResult<u64> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_blocks.load(Ordering::SeqCst) {
            return Err(unavailable("eth_blockNumber"));
        }
        if let Some(head) = self.heads.lock().unwrap().pop_front() {
            self.last_head.store(head, Ordering::SeqCst);
        }
        Ok(self.last_head.load(Ordering::SeqCst))
    }

    async fn logs(&self, filter: &Filter) -> ServiceResult<Vec<Log>> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(unavailable("eth_getLogs"));
        }
        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.block_number
                    .map(|b| b >= from && b <= to)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn call(&self, _tx: TransactionRequest) -> ServiceResult<Bytes> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.call_output.lock().unwrap().clone())
    }

    async fn send_transaction(&self, _tx: TransactionRequest) -> ServiceResult<TxHash> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(unavailable("eth_sendTransaction"));
        }
        Ok(TxHash::with_last_byte(n as u8))
    }
}

/// Factory handing out scripted chains in order.
///
/// The last chain is reused once the list is exhausted.
pub struct MockFactory {
    chains: Vec<Arc<MockChain>>,
    connects: AtomicU32,
    endpoints: Mutex<Vec<Url>>,
    refuse: AtomicBool,
}

impl MockFactory {
    pub fn new(chains: Vec<Arc<MockChain>>) -> Arc<Self> {
        Arc::new(Self {
            chains,
            connects: AtomicU32::new(0),
            endpoints: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
        })
    }

    pub fn refusing() -> Arc<Self> {
        let factory = Self::new(vec![MockChain::with_heads([1])]);
        factory.refuse.store(true, Ordering::SeqCst);
        factory
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<Url> {
        self.endpoints.lock().unwrap().clone()
    }
}

impl TransportFactory for MockFactory {
    fn connect(
        &self,
        endpoint: &Url,
        _settings: &ConnectionConfig,
    ) -> ServiceResult<Arc<dyn ChainTransport>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ServiceError::new(
                ErrorCode::RpcError,
                "transport construction refused",
            ));
        }
        let n = self.connects.fetch_add(1, Ordering::SeqCst) as usize;
        self.endpoints.lock().unwrap().push(endpoint.clone());
        let chain: Arc<dyn ChainTransport> = self.chains[n.min(self.chains.len() - 1)].clone();
        Ok(chain)
    }
}

/// Bind the built-in interface at [`CONTRACT`] over `chain`.
pub fn bind(chain: Arc<MockChain>) -> ContractBinding {
    let url: Url = "http://mock.local".parse().unwrap();
    let transport: Arc<dyn ChainTransport> = chain;
    let connection = Connection::new(url, Some(CHAIN_ID), transport);
    let interface = Arc::new(ContractInterface::marketplace().unwrap());
    ContractBinding::bind(connection, CONTRACT, interface).unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `fut` with a hard test deadline.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test deadline exceeded")
}
