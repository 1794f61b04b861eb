//! Deduplication ledger for retried writes.
//!
//! A write is identified by an [`IdempotencyKey`]. The ledger remembers
//! which keys are in flight and which have completed with a transaction
//! hash, so a retried or repeated submission never reaches the chain twice.
//! Completed entries are kept for the ledger's retention window and then
//! evicted; an evicted key may be submitted again.

use alloy::primitives::TxHash;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default retention for completed writes.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Caller-chosen identity of a state-changing submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    InFlight,
    Completed { tx_hash: TxHash, at: Instant },
}

/// Outcome of claiming a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the key and must submit.
    Acquired,
    /// Another caller is submitting under this key.
    InFlight,
    /// The key already completed with this hash.
    Completed(TxHash),
}

/// Thread-safe record of write submissions.
#[derive(Clone)]
pub struct WriteLedger {
    inner: Arc<DashMap<IdempotencyKey, WriteState>>,
    retention: Duration,
}

impl Default for WriteLedger {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl WriteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that forgets completed writes after `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Claim `key` for submission.
    pub fn claim(&self, key: &IdempotencyKey) -> Claim {
        let now = Instant::now();
        match self.inner.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let state = *entry.get();
                match state {
                    WriteState::InFlight => Claim::InFlight,
                    WriteState::Completed { tx_hash, at } if !self.expired(at, now) => {
                        Claim::Completed(tx_hash)
                    }
                    WriteState::Completed { .. } => {
                        entry.insert(WriteState::InFlight);
                        Claim::Acquired
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(WriteState::InFlight);
                Claim::Acquired
            }
        }
    }

    /// Claim `key` and hold it until the returned guard is dropped.
    ///
    /// Dropping the guard without [`ClaimGuard::complete`] releases the key,
    /// including when the owning future is cancelled mid-submission.
    pub fn acquire(&self, key: &IdempotencyKey) -> Result<ClaimGuard<'_>, Claim> {
        match self.claim(key) {
            Claim::Acquired => Ok(ClaimGuard {
                ledger: self,
                key: key.clone(),
                done: false,
            }),
            other => Err(other),
        }
    }

    /// Record a successful submission.
    pub fn complete(&self, key: &IdempotencyKey, tx_hash: TxHash) {
        let now = Instant::now();
        self.inner.insert(key.clone(), WriteState::Completed { tx_hash, at: now });
        self.evict_expired(now);
    }

    /// Release a claim after the submission failed for good.
    pub fn release(&self, key: &IdempotencyKey) {
        self.inner
            .remove_if(key, |_, state| *state == WriteState::InFlight);
    }

    /// Hash recorded for a completed key still within retention.
    pub fn completed(&self, key: &IdempotencyKey) -> Option<TxHash> {
        match self.inner.get(key).map(|r| *r.value()) {
            Some(WriteState::Completed { tx_hash, at }) if !self.expired(at, Instant::now()) => {
                Some(tx_hash)
            }
            _ => None,
        }
    }

    /// Drop completed entries older than the retention window.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, state| match *state {
            WriteState::InFlight => true,
            WriteState::Completed { at, .. } => !self.expired(at, now),
        });
        let evicted = before.saturating_sub(self.inner.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired write records");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn expired(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) >= self.retention
    }
}

/// Exclusive hold on an in-flight key.
pub struct ClaimGuard<'a> {
    ledger: &'a WriteLedger,
    key: IdempotencyKey,
    done: bool,
}

impl ClaimGuard<'_> {
    /// Record the hash and keep the key as completed.
    pub fn complete(mut self, tx_hash: TxHash) {
        self.ledger.complete(&self.key, tx_hash);
        self.done = true;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.ledger.release(&self.key);
        }
    }
}

impl fmt::Debug for WriteLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLedger")
            .field("entries", &self.inner.len())
            .field("retention", &self.retention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_lifecycle() {
        let ledger = WriteLedger::new();
        let key = IdempotencyKey::from("purchase-42");

        assert_eq!(ledger.claim(&key), Claim::Acquired);
        assert_eq!(ledger.claim(&key), Claim::InFlight);

        let hash = TxHash::repeat_byte(1);
        ledger.complete(&key, hash);
        assert_eq!(ledger.claim(&key), Claim::Completed(hash));
        assert_eq!(ledger.completed(&key), Some(hash));
    }

    #[test]
    fn test_release_only_drops_in_flight() {
        let ledger = WriteLedger::new();
        let pending = IdempotencyKey::from("a");
        let done = IdempotencyKey::from("b");

        ledger.claim(&pending);
        ledger.claim(&done);
        ledger.complete(&done, TxHash::repeat_byte(2));

        ledger.release(&pending);
        ledger.release(&done);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.claim(&pending), Claim::Acquired);
        assert!(ledger.completed(&done).is_some());
    }

    #[test]
    fn test_dropped_guard_releases_key() {
        let ledger = WriteLedger::new();
        let key = IdempotencyKey::from("purchase-7");

        let guard = ledger.acquire(&key).unwrap();
        assert_eq!(ledger.acquire(&key).err(), Some(Claim::InFlight));
        drop(guard);
        assert!(ledger.is_empty());

        let hash = TxHash::repeat_byte(4);
        ledger.acquire(&key).unwrap().complete(hash);
        assert_eq!(ledger.acquire(&key).err(), Some(Claim::Completed(hash)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_entries_expire() {
        let ledger = WriteLedger::with_retention(Duration::from_secs(60));
        let old = IdempotencyKey::from("old");
        let fresh = IdempotencyKey::from("fresh");

        ledger.claim(&old);
        ledger.complete(&old, TxHash::repeat_byte(1));
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(ledger.completed(&old), None);
        ledger.claim(&fresh);
        ledger.complete(&fresh, TxHash::repeat_byte(2));

        // Completing `fresh` swept the expired entry.
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.claim(&old), Claim::Acquired);
        assert_eq!(ledger.completed(&fresh), Some(TxHash::repeat_byte(2)));
    }
}
