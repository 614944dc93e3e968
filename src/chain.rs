//! Chain state: best block, height index, block cache and the UTXO set
//!
//! Blocks are connected one at a time behind a single writer lock, so the
//! linkage check, validation, UTXO commit and index update for one block never
//! interleave with another. Readers take the index lock only briefly and never
//! wait on a block being validated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::block::{
    check_block_values, check_difficulty, connect_block_utxo, genesis_block,
    validate_block_structure,
};
use crate::error::{ConsensusError, Result};
use crate::logging::Logger;
use crate::pow::{expected_bits, ChainView};
use crate::storage::ChainStore;
use crate::transaction::validate_transaction_structure;
use crate::types::*;
use crate::utxo::UtxoSet;

#[derive(Debug)]
struct ChainIndex {
    best_hash: Hash,
    by_height: Vec<Hash>,
    blocks: HashMap<Hash, Block>,
}

impl ChainIndex {
    fn height(&self) -> u64 {
        self.by_height.len().saturating_sub(1) as u64
    }

    fn block_at_height(&self, height: u64) -> Option<&Block> {
        let hash = self.by_height.get(usize::try_from(height).ok()?)?;
        self.blocks.get(hash)
    }

    fn push(&mut self, block: Block) {
        let hash = block.hash();
        self.by_height.push(hash);
        self.blocks.insert(hash, block);
        self.best_hash = hash;
    }
}

pub struct ChainState {
    index: RwLock<ChainIndex>,
    utxo: UtxoSet,
    store: Arc<dyn ChainStore>,
    writer: Mutex<()>,
    logger: Logger,
}

impl std::fmt::Debug for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainState")
            .field("height", &self.height())
            .field("best_hash", &hex::encode(self.best_block_hash()))
            .field("utxos", &self.utxo.size())
            .finish()
    }
}

impl ChainState {
    /// Open the chain over `store`
    ///
    /// An empty store is initialized with the genesis block. Otherwise every
    /// stored block from genesis to the stored best block is revalidated and
    /// reapplied in order.
    pub fn open(store: Arc<dyn ChainStore>, logger: Logger) -> Result<Self> {
        let genesis = genesis_block();
        let genesis_hash = genesis.hash();

        let chain = ChainState {
            index: RwLock::new(ChainIndex {
                best_hash: genesis_hash,
                by_height: Vec::new(),
                blocks: HashMap::new(),
            }),
            utxo: UtxoSet::new(),
            store,
            writer: Mutex::new(()),
            logger,
        };

        let stored = chain.stored_chain(genesis_hash)?;

        if let ValidationResult::Invalid(reason) = connect_block_utxo(&genesis, &chain.utxo) {
            return Err(ConsensusError::BlockValidation(format!("genesis: {}", reason)));
        }
        chain.write_index().push(genesis.clone());

        if stored.is_empty() {
            chain.store.put_block(&genesis)?;
            chain.store.set_best_block(&genesis_hash)?;
            chain.logger.info(format_args!(
                "Initialized chain with genesis {}",
                hex::encode(genesis_hash)
            ));
            return Ok(chain);
        }

        for (height, block) in stored.into_iter().enumerate().skip(1) {
            let hash = block.hash();
            if let ValidationResult::Invalid(reason) = chain.connect_block(block, height as u64, false)? {
                return Err(ConsensusError::Storage(format!(
                    "stored block {} at height {} no longer validates: {}",
                    hex::encode(hash),
                    height,
                    reason
                )));
            }
        }
        chain.logger.info(format_args!(
            "Loaded chain at height {} with best block {}",
            chain.height(),
            hex::encode(chain.best_block_hash())
        ));
        Ok(chain)
    }

    /// Stored blocks from genesis to the stored best block, empty for a new store
    fn stored_chain(&self, genesis_hash: Hash) -> Result<Vec<Block>> {
        let mut hash = match self.store.best_block()? {
            Some(hash) => hash,
            None => return Ok(Vec::new()),
        };

        let mut blocks = Vec::new();
        loop {
            let block = self.store.block(&hash)?.ok_or_else(|| {
                ConsensusError::Storage(format!("missing stored block {}", hex::encode(hash)))
            })?;
            let prev = block.header.prev_block_hash;
            blocks.push(block);
            if hash == genesis_hash {
                break;
            }
            if prev == [0u8; 32] {
                return Err(ConsensusError::Storage(
                    "stored chain does not start at genesis".to_string(),
                ));
            }
            hash = prev;
        }
        blocks.reverse();
        Ok(blocks)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, ChainIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, ChainIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// AddBlock: ℬ × ℕ → {valid, invalid}
    ///
    /// 1. The block must be unknown
    /// 2. height = current height + 1
    /// 3. block.prev_block_hash = best block hash
    /// 4. ConnectBlock(block, height)
    ///
    /// Storage failures are returned as errors; every other rejection is an
    /// `Invalid` result and leaves the chain unchanged.
    pub fn add_block(&self, block: Block, height: u64) -> Result<ValidationResult> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let hash = block.hash();

        let linkage = {
            let index = self.read_index();
            if index.blocks.contains_key(&hash) {
                Some("Block already known".to_string())
            } else if height != index.height() + 1 {
                Some(format!(
                    "Height {} does not extend current height {}",
                    height,
                    index.height()
                ))
            } else if block.header.prev_block_hash != index.best_hash {
                Some("Previous hash is not the best block".to_string())
            } else {
                None
            }
        };
        if let Some(reason) = linkage {
            self.logger.debug(format_args!(
                "Rejected block {}: {}",
                hex::encode(hash),
                reason
            ));
            return Ok(ValidationResult::Invalid(reason));
        }

        let result = self.connect_block(block, height, true);
        match &result {
            Ok(ValidationResult::Valid) => self.logger.info(format_args!(
                "Accepted block {} at height {}",
                hex::encode(hash),
                height
            )),
            Ok(ValidationResult::Invalid(reason)) => self.logger.warn(format_args!(
                "Rejected block {} at height {}: {}",
                hex::encode(hash),
                height,
                reason
            )),
            Err(e) => self.logger.error(format_args!(
                "Failed to connect block {}: {}",
                hex::encode(hash),
                e
            )),
        }
        result
    }

    /// ConnectBlock: full validation, then persistence, then the in-memory commit
    ///
    /// 1. ValidateBlockStructure(block)
    /// 2. CheckDifficulty(chain, block.header)
    /// 3. ValidateTransactionStructure(tx) for every tx
    /// 4. Inputs exist and values balance against the UTXO set
    /// 5. Persist the block and best pointer
    /// 6. ConnectBlockUTXO, then advance the index
    ///
    /// Callers hold the writer lock (or own the chain exclusively during open).
    fn connect_block(&self, block: Block, height: u64, persist: bool) -> Result<ValidationResult> {
        // 1. Structure and proof of work
        let structure = validate_block_structure(&block)?;
        if !structure.is_valid() {
            return Ok(structure);
        }

        // 2. Difficulty schedule
        let difficulty = check_difficulty(self, &block.header)?;
        if !difficulty.is_valid() {
            return Ok(difficulty);
        }

        // 3. Transaction structure
        for (i, tx) in block.transactions.iter().enumerate() {
            if let ValidationResult::Invalid(reason) = validate_transaction_structure(tx)? {
                return Ok(ValidationResult::Invalid(format!(
                    "Invalid transaction at index {}: {}",
                    i, reason
                )));
            }
        }

        // 4. Input existence and value conservation
        let values = check_block_values(&block, &self.utxo, height)?;
        if !values.is_valid() {
            return Ok(values);
        }

        // 5. Persist before touching memory
        let hash = block.hash();
        let previous_best = self.best_block_hash();
        if persist {
            self.store.put_block(&block)?;
            self.store.set_best_block(&hash)?;
        }

        // 6. Apply
        let applied = connect_block_utxo(&block, &self.utxo);
        if !applied.is_valid() {
            if persist {
                self.store.set_best_block(&previous_best)?;
            }
            return Ok(applied);
        }
        self.write_index().push(block);
        Ok(ValidationResult::Valid)
    }

    /// Height and hash of the best block, read together
    pub fn tip(&self) -> (u64, Hash) {
        let index = self.read_index();
        (index.height(), index.best_hash)
    }

    pub fn best_block_hash(&self) -> Hash {
        self.read_index().best_hash
    }

    pub fn height(&self) -> u64 {
        self.read_index().height()
    }

    pub fn best_header(&self) -> BlockHeader {
        let index = self.read_index();
        index
            .blocks
            .get(&index.best_hash)
            .map(|block| block.header.clone())
            .unwrap_or_else(|| genesis_block().header)
    }

    pub fn contains_block(&self, hash: &Hash) -> bool {
        self.read_index().blocks.contains_key(hash)
    }

    pub fn block(&self, hash: &Hash) -> Option<Block> {
        self.read_index().blocks.get(hash).cloned()
    }

    pub fn block_at_height(&self, height: u64) -> Option<Block> {
        self.read_index().block_at_height(height).cloned()
    }

    pub fn utxo(&self) -> &UtxoSet {
        &self.utxo
    }

    /// Target the next block must carry; `bootstrap` when any target is accepted
    pub fn next_bits(&self, bootstrap: u32) -> Result<u32> {
        Ok(expected_bits(self)?.unwrap_or(bootstrap))
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl ChainView for ChainState {
    fn height(&self) -> u64 {
        ChainState::height(self)
    }

    fn header_at(&self, height: u64) -> Option<BlockHeader> {
        self.read_index()
            .block_at_height(height)
            .map(|block| block.header.clone())
    }
}
