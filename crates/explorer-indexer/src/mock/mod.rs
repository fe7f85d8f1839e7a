use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use explorer_chain::BlockNumber;

use crate::{Error, TransactionLocator};

/// In-memory transaction index
#[derive(Debug, Default)]
pub struct MockTransactionLocator {
    transactions: Mutex<HashMap<String, BlockNumber>>,
    unavailable: bool,
    latency: Duration,
    calls: AtomicUsize,
}

impl MockTransactionLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator whose every lookup fails with [`Error::IndexerUnavailable`]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_transaction(self, tx_hash: &str, block: BlockNumber) -> Self {
        self.transactions.lock().unwrap().insert(tx_hash.to_string(), block);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionLocator for MockTransactionLocator {
    async fn locate(&self, tx_hash: &str) -> Result<BlockNumber, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.unavailable {
            return Err(Error::IndexerUnavailable("mock indexer is down".to_string()));
        }

        self.transactions
            .lock()
            .unwrap()
            .get(tx_hash)
            .copied()
            .ok_or_else(|| Error::TransactionNotFound(tx_hash.to_string()))
    }
}
