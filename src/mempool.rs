//! Pool of unconfirmed transactions

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::constants::DEFAULT_MEMPOOL_CAPACITY;
use crate::error::Result;
use crate::logging::Logger;
use crate::transaction::validate_transaction_structure;
use crate::types::*;

/// Mempool admission result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolResult {
    Accepted,
    Rejected(String),
}

#[derive(Debug)]
pub struct Mempool {
    transactions: RwLock<BTreeMap<Hash, Transaction>>,
    capacity: usize,
    logger: Logger,
}

impl Default for Mempool {
    fn default() -> Self {
        Mempool::new(DEFAULT_MEMPOOL_CAPACITY, Logger::default())
    }
}

impl Mempool {
    pub fn new(capacity: usize, logger: Logger) -> Self {
        Mempool {
            transactions: RwLock::new(BTreeMap::new()),
            capacity,
            logger,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Hash, Transaction>> {
        self.transactions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Hash, Transaction>> {
        self.transactions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// AcceptToMemoryPool: 𝒯𝒳 → {accepted, rejected}
    ///
    /// 1. Validate transaction structure
    /// 2. If already pooled: accepted, nothing changes
    /// 3. If the pool is full: rejected
    /// 4. Store under txid(tx)
    pub fn add(&self, tx: Transaction) -> Result<MempoolResult> {
        let txid = tx.txid();

        // 1. Structure
        if let ValidationResult::Invalid(reason) = validate_transaction_structure(&tx)? {
            self.logger.debug(format_args!(
                "Rejected transaction {}: {}",
                hex::encode(txid),
                reason
            ));
            return Ok(MempoolResult::Rejected(reason));
        }

        let mut pool = self.write();

        // 2. Idempotent re-add
        if pool.contains_key(&txid) {
            return Ok(MempoolResult::Accepted);
        }

        // 3. Capacity; there is no eviction
        if pool.len() >= self.capacity {
            self.logger.warn(format_args!(
                "Mempool full ({} transactions), rejected {}",
                pool.len(),
                hex::encode(txid)
            ));
            return Ok(MempoolResult::Rejected("Mempool full".to_string()));
        }

        // 4. Store
        pool.insert(txid, tx);
        self.logger.debug(format_args!("Accepted transaction {}", hex::encode(txid)));
        Ok(MempoolResult::Accepted)
    }

    pub fn remove(&self, txid: &Hash) -> Option<Transaction> {
        self.write().remove(txid)
    }

    /// Drop every pooled transaction that `block` confirmed
    pub fn remove_confirmed(&self, block: &Block) -> usize {
        let mut pool = self.write();
        block
            .transactions
            .iter()
            .filter(|tx| pool.remove(&tx.txid()).is_some())
            .count()
    }

    pub fn get(&self, txid: &Hash) -> Option<Transaction> {
        self.read().get(txid).cloned()
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.read().contains_key(txid)
    }

    /// Snapshot of every pooled transaction, ordered by txid
    pub fn get_block_template(&self) -> Vec<Transaction> {
        self.read().values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}
