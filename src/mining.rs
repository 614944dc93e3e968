//! Block assembly and the proof-of-work search

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::block::current_timestamp;
use crate::chain::ChainState;
use crate::config::MinerConfig;
use crate::economic::{calculate_fee, get_block_subsidy};
use crate::error::Result;
use crate::logging::Logger;
use crate::mempool::Mempool;
use crate::merkle::compute_merkle_root;
use crate::pow::check_proof_of_work;
use crate::script::pay_to_pubkey_hash;
use crate::transaction::validate_transaction_structure;
use crate::types::*;
use crate::utxo::UtxoSet;

/// Result of mining attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningResult {
    Success,
    Failure,
}

/// Nonces tried between checks of the chain tip
const TIP_CHECK_INTERVAL: u32 = 4096;

/// Coinbase paying `reward` to `payout`
///
/// The height goes into both the input's signature field and the lock time,
/// so coinbases at different heights never share an id.
pub fn create_coinbase(height: u64, reward: u64, payout: &PubKeyHash) -> Transaction {
    Transaction::new(
        1,
        vec![TxInput {
            prevout: OutPoint::null(),
            signature: height.to_le_bytes().to_vec(),
            pubkey: Vec::new(),
        }],
        vec![TxOutput {
            amount: reward,
            script_pubkey: pay_to_pubkey_hash(payout),
        }],
        height as u32,
    )
}

/// SelectTransactions: 𝒯𝒳* × 𝒰𝒮 → 𝒯𝒳* × ℕ
///
/// Takes candidates in order, keeping each one that is structurally valid,
/// spends only existing outputs no earlier pick already spends, and pays a
/// non-negative fee. Returns the picks and their total fee.
pub fn select_transactions(candidates: &[Transaction], utxo_set: &UtxoSet) -> (Vec<Transaction>, u64) {
    let mut picked = Vec::new();
    let mut consumed = BTreeSet::new();
    let mut total_fees = 0u64;

    for tx in candidates {
        if tx.is_coinbase() || !matches!(validate_transaction_structure(tx), Ok(ValidationResult::Valid)) {
            continue;
        }
        if tx.inputs().iter().any(|input| consumed.contains(&input.prevout)) {
            continue;
        }
        let unique: BTreeSet<OutPoint> = tx.inputs().iter().map(|input| input.prevout).collect();
        if unique.len() != tx.inputs().len() {
            continue;
        }
        let fee = match calculate_fee(tx, |outpoint| utxo_set.get(outpoint).map(|e| e.amount)) {
            Ok(fee) => fee,
            Err(_) => continue,
        };
        let fees = match total_fees.checked_add(fee) {
            Some(fees) => fees,
            None => continue,
        };

        total_fees = fees;
        consumed.extend(unique);
        picked.push(tx.clone());
    }

    (picked, total_fees)
}

/// CreateBlockTemplate: 𝒞 × 𝒯𝒳* → ℬ × ℕ
///
/// 1. Read the tip once: height = tip height + 1
/// 2. Select candidates against the chain's UTXO set
/// 3. Coinbase pays GetBlockSubsidy(height) + fees
/// 4. Header links to the tip with the expected target
///
/// Returns the block with the height it must be submitted at.
pub fn create_block_template(
    chain: &ChainState,
    candidates: &[Transaction],
    payout: &PubKeyHash,
    bootstrap_bits: u32,
    timestamp: u64,
) -> Result<(Block, u64)> {
    let (tip_height, tip_hash) = chain.tip();
    let height = tip_height + 1;
    let (selected, fees) = select_transactions(candidates, chain.utxo());
    let reward = get_block_subsidy(height).saturating_add(fees);

    let mut transactions = Vec::with_capacity(selected.len() + 1);
    transactions.push(create_coinbase(height, reward, payout));
    transactions.extend(selected);

    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: tip_hash,
            merkle_root: compute_merkle_root(&transactions),
            timestamp,
            bits: chain.next_bits(bootstrap_bits)?,
            nonce: 0,
        },
        transactions,
    };
    Ok((block, height))
}

/// CreateNewBlock: the template block without its height
pub fn create_new_block(
    chain: &ChainState,
    candidates: &[Transaction],
    payout: &PubKeyHash,
    bootstrap_bits: u32,
    timestamp: u64,
) -> Result<Block> {
    create_block_template(chain, candidates, payout, bootstrap_bits, timestamp).map(|(block, _)| block)
}

/// MineBlock: ℬ × ℕ → ℬ × {success, failure}
///
/// Tries up to `max_attempts` nonces, starting from the header's current one.
pub fn mine_block(mut block: Block, max_attempts: u64) -> Result<(Block, MiningResult)> {
    for _ in 0..max_attempts {
        if check_proof_of_work(&block.header)? {
            return Ok((block, MiningResult::Success));
        }
        block.header.nonce = block.header.nonce.wrapping_add(1);
    }
    Ok((block, MiningResult::Failure))
}

struct MinerShared {
    chain: Arc<ChainState>,
    mempool: Arc<Mempool>,
    payout: PubKeyHash,
    bootstrap_bits: u32,
    running: AtomicBool,
    blocks_mined: AtomicU64,
    hashes: AtomicU64,
    logger: Logger,
}

/// Background miner
///
/// Workers rebuild their template whenever the tip moves, check the running
/// flag between nonce attempts, and are joined by [`Miner::stop`] or on drop.
pub struct Miner {
    shared: Arc<MinerShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Miner {
    pub fn new(
        chain: Arc<ChainState>,
        mempool: Arc<Mempool>,
        config: &MinerConfig,
        logger: Logger,
    ) -> Result<Self> {
        Ok(Miner {
            shared: Arc::new(MinerShared {
                chain,
                mempool,
                payout: config.payout_pubkey_hash()?,
                bootstrap_bits: config.bootstrap_bits,
                running: AtomicBool::new(false),
                blocks_mined: AtomicU64::new(0),
                hashes: AtomicU64::new(0),
                logger,
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn `threads` workers; false if already mining
    pub fn start(&self, threads: usize) -> bool {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let threads = threads.max(1);
        let stride = u32::MAX / threads as u32;
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in 0..threads {
            let shared = Arc::clone(&self.shared);
            let first_nonce = stride.wrapping_mul(worker as u32);
            workers.push(thread::spawn(move || shared.run(first_nonce)));
        }
        self.shared.logger.info(format_args!("Miner started with {} threads", threads));
        true
    }

    /// Clear the running flag and join every worker
    pub fn stop(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                self.shared.logger.error(format_args!("Miner worker panicked"));
            }
        }
        if was_running {
            self.shared.logger.info(format_args!(
                "Miner stopped after {} blocks",
                self.blocks_mined()
            ));
        }
    }

    pub fn is_mining(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn blocks_mined(&self) -> u64 {
        self.shared.blocks_mined.load(Ordering::Relaxed)
    }

    pub fn hash_count(&self) -> u64 {
        self.shared.hashes.load(Ordering::Relaxed)
    }

    /// Assemble, mine and submit one block on the calling thread
    ///
    /// Returns the accepted block, or `None` when no nonce within
    /// `max_attempts` worked or the chain rejected the block.
    pub fn mine_one(&self, timestamp: u64, max_attempts: u64) -> Result<Option<Block>> {
        let shared = &self.shared;
        let (template, height) = shared.template(timestamp)?;
        let (block, result) = mine_block(template, max_attempts)?;
        shared.hashes.fetch_add(u64::from(block.header.nonce) + 1, Ordering::Relaxed);
        if result == MiningResult::Failure {
            return Ok(None);
        }
        shared.submit(block, height)
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MinerShared {
    fn template(&self, timestamp: u64) -> Result<(Block, u64)> {
        create_block_template(
            &self.chain,
            &self.mempool.get_block_template(),
            &self.payout,
            self.bootstrap_bits,
            timestamp,
        )
    }

    fn submit(&self, block: Block, height: u64) -> Result<Option<Block>> {
        match self.chain.add_block(block.clone(), height)? {
            ValidationResult::Valid => {
                self.mempool.remove_confirmed(&block);
                self.blocks_mined.fetch_add(1, Ordering::Relaxed);
                self.logger.info(format_args!(
                    "Mined block {} at height {} with {} transactions",
                    hex::encode(block.hash()),
                    height,
                    block.transactions.len()
                ));
                Ok(Some(block))
            }
            ValidationResult::Invalid(reason) => {
                self.logger.debug(format_args!("Mined block not accepted: {}", reason));
                Ok(None)
            }
        }
    }

    fn run(&self, first_nonce: u32) {
        while self.running.load(Ordering::SeqCst) {
            let (mut block, height) = match self.template(current_timestamp()) {
                Ok(template) => template,
                Err(e) => {
                    self.logger.error(format_args!("Cannot build block template: {}", e));
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            };
            block.header.nonce = first_nonce;

            let mut tried = 0u32;
            let found = loop {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                if tried % TIP_CHECK_INTERVAL == 0
                    && tried > 0
                    && self.chain.best_block_hash() != block.header.prev_block_hash
                {
                    break false;
                }
                match check_proof_of_work(&block.header) {
                    Ok(true) => break true,
                    Ok(false) => {}
                    Err(e) => {
                        self.logger.error(format_args!("Invalid template target: {}", e));
                        self.running.store(false, Ordering::SeqCst);
                        return;
                    }
                }
                self.hashes.fetch_add(1, Ordering::Relaxed);
                block.header.nonce = block.header.nonce.wrapping_add(1);
                tried = tried.wrapping_add(1);
                if tried == 0 {
                    // Nonce space exhausted
                    break false;
                }
            };

            if found {
                if let Err(e) = self.submit(block, height) {
                    self.logger.error(format_args!("Stopping miner: {}", e));
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}
