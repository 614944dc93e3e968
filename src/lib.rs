//! # Powledger
//!
//! Single-node engine for a proof-of-work ledger.
//!
//! The crate defines the canonical wire encoding of transactions and blocks,
//! the rules a block must pass to extend the chain, the set of spendable
//! outputs, and the difficulty schedule. Everything else (networking, request
//! parsing, wallets) talks to it through the [`Node`] context object.
//!
//! ## Architecture
//!
//! Leaves first:
//! - Wire types and codec ([`types`], [`serialize`])
//! - Merkle commitment ([`merkle`])
//! - Compact targets, proof of work and retargeting ([`pow`])
//! - Unspent output set ([`utxo`])
//! - Block and transaction validation ([`block`], [`transaction`], [`economic`])
//! - Chain state ([`chain`]) over a pluggable store ([`storage`])
//! - Admission pool ([`mempool`]) and block production ([`mining`])
//!
//! ## Design Principles
//!
//! 1. **Validation outcomes are values**: rule violations come back as
//!    [`ValidationResult::Invalid`]; `Err` is reserved for fatal conditions
//!    such as a failing store
//! 2. **Single writer**: blocks are connected one at a time and the UTXO set
//!    changes are committed all-or-nothing
//! 3. **Exact version pinning** for consensus-critical cryptography
//! 4. **Injected logging**: every component logs through the [`Logger`] it
//!    was built with
//!
//! ## Usage
//!
//! ```rust
//! use powledger::{Node, NodeConfig};
//! use powledger::block::current_timestamp;
//!
//! let node = Node::new(NodeConfig::default()).unwrap();
//! assert_eq!(node.chain_info().height, 0);
//!
//! let block = node.miner().mine_one(current_timestamp(), 1_000_000).unwrap();
//! assert!(block.is_some());
//! assert_eq!(node.chain_info().height, 1);
//! ```

pub mod address;
pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod economic;
pub mod error;
pub mod logging;
pub mod mempool;
pub mod merkle;
pub mod mining;
pub mod pow;
pub mod script;
pub mod serialize;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utxo;

// Re-export commonly used types
pub use chain::ChainState;
pub use config::{MinerConfig, NodeConfig};
pub use constants::*;
pub use error::{ConsensusError, Result};
pub use logging::Logger;
pub use mempool::{Mempool, MempoolResult};
pub use mining::Miner;
pub use types::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::storage::{ChainStore, KvChainStore};

/// Snapshot of the chain for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainInfo {
    pub height: u64,
    pub best_block_hash: String,
    pub bits: u32,
    pub difficulty: f64,
    pub next_bits: u32,
    pub utxo_count: usize,
    pub mempool_size: usize,
    pub issued_supply: u64,
}

/// Context object shared by the outer surfaces of a node
///
/// Holds the chain state, the mempool and the miner, and exposes the reads
/// and submissions an RPC layer needs.
///
/// # Examples
///
/// ```
/// use powledger::{Node, NodeConfig, MempoolResult, COIN};
/// use powledger::types::*;
/// use powledger::script::pay_to_pubkey_hash;
///
/// let node = Node::new(NodeConfig::default()).unwrap();
///
/// // A payment with one pay-to-pubkey-hash output of 1 coin
/// let tx = Transaction::new(
///     1,
///     vec![TxInput {
///         prevout: OutPoint::new([1u8; 32], 0),
///         signature: vec![],
///         pubkey: vec![],
///     }],
///     vec![TxOutput {
///         amount: COIN,
///         script_pubkey: pay_to_pubkey_hash(&[7u8; 20]),
///     }],
///     0,
/// );
///
/// assert_eq!(node.submit_transaction(tx.clone()).unwrap(), MempoolResult::Accepted);
/// assert!(node.mempool().contains(&tx.txid()));
/// ```
pub struct Node {
    config: NodeConfig,
    chain: Arc<ChainState>,
    mempool: Arc<Mempool>,
    miner: Miner,
    logger: Logger,
}

impl Node {
    /// Node over an in-memory store, logging to the global backend
    ///
    /// # Examples
    ///
    /// ```
    /// use powledger::{Node, NodeConfig};
    /// use powledger::block::genesis_block;
    ///
    /// let node = Node::new(NodeConfig::default()).unwrap();
    /// assert_eq!(node.chain().best_block_hash(), genesis_block().hash());
    /// ```
    pub fn new(config: NodeConfig) -> Result<Self> {
        let logger = Logger::new(&config.log_target);
        Self::open(config, Arc::new(KvChainStore::in_memory()), logger)
    }

    /// Node over `store`, replaying whatever chain it already holds
    pub fn open(config: NodeConfig, store: Arc<dyn ChainStore>, logger: Logger) -> Result<Self> {
        config.validate()?;
        let chain = Arc::new(ChainState::open(store, logger.clone())?);
        let mempool = Arc::new(Mempool::new(config.mempool_capacity, logger.clone()));
        let miner = Miner::new(
            Arc::clone(&chain),
            Arc::clone(&mempool),
            &config.miner,
            logger.clone(),
        )?;
        Ok(Node {
            config,
            chain,
            mempool,
            miner,
            logger,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<ChainState> {
        &self.chain
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// Start background mining with the configured number of workers
    pub fn start_mining(&self) -> bool {
        self.miner.start(self.config.miner.threads)
    }

    pub fn stop_mining(&self) {
        self.miner.stop();
    }

    pub fn chain_info(&self) -> ChainInfo {
        let header = self.chain.best_header();
        let height = self.chain.height();
        ChainInfo {
            height,
            best_block_hash: hex::encode(self.chain.best_block_hash()),
            bits: header.bits,
            difficulty: pow::difficulty(header.bits),
            next_bits: self
                .chain
                .next_bits(self.config.miner.bootstrap_bits)
                .unwrap_or(header.bits),
            utxo_count: self.chain.utxo().size(),
            mempool_size: self.mempool.size(),
            issued_supply: economic::total_supply(height),
        }
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Option<Block> {
        self.chain.block(hash)
    }

    pub fn block_by_height(&self, height: u64) -> Option<Block> {
        self.chain.block_at_height(height)
    }

    pub fn utxo_snapshot(&self) -> BTreeMap<OutPoint, UtxoEntry> {
        self.chain.utxo().snapshot()
    }

    /// Spendable outputs locked to `pubkey_hash`
    pub fn utxos_for(&self, pubkey_hash: &PubKeyHash) -> Vec<(OutPoint, UtxoEntry)> {
        self.utxo_snapshot()
            .into_iter()
            .filter(|(_, entry)| {
                script::extract_pubkey_hash(&entry.script_pubkey).as_ref() == Some(pubkey_hash)
            })
            .collect()
    }

    /// Sum of spendable outputs locked to `pubkey_hash`
    pub fn balance(&self, pubkey_hash: &PubKeyHash) -> u64 {
        self.utxos_for(pubkey_hash)
            .iter()
            .fold(0u64, |total, (_, entry)| total.saturating_add(entry.amount))
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<MempoolResult> {
        self.mempool.add(tx)
    }

    /// Decode and submit a transaction; undecodable bytes are rejected
    pub fn submit_raw_transaction(&self, bytes: &[u8]) -> Result<MempoolResult> {
        match serialize::deserialize_transaction(bytes) {
            Ok(tx) => self.submit_transaction(tx),
            Err(e) => Ok(MempoolResult::Rejected(e.to_string())),
        }
    }

    /// Submit a block for the next height
    ///
    /// Transactions it confirms leave the mempool.
    pub fn submit_block(&self, block: Block) -> Result<ValidationResult> {
        let height = self.chain.height() + 1;
        let result = self.chain.add_block(block.clone(), height)?;
        if result.is_valid() {
            let removed = self.mempool.remove_confirmed(&block);
            self.logger.debug(format_args!(
                "Block {} confirmed {} pooled transactions",
                hex::encode(block.hash()),
                removed
            ));
        }
        Ok(result)
    }

    /// Decode and submit a block; undecodable bytes are rejected
    pub fn submit_raw_block(&self, bytes: &[u8]) -> Result<ValidationResult> {
        match serialize::deserialize_block(bytes) {
            Ok(block) => self.submit_block(block),
            Err(e) => Ok(ValidationResult::Invalid(e.to_string())),
        }
    }
}
