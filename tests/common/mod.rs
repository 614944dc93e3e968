//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use powledger::merkle::compute_merkle_root;
use powledger::pow::check_proof_of_work;
use powledger::script::pay_to_pubkey_hash;
use powledger::storage::{ChainStore, KvChainStore, MemoryKeyValueStore};
use powledger::*;

pub const MINER_HASH: PubKeyHash = [0x11; 20];
pub const ALICE_HASH: PubKeyHash = [0x22; 20];
pub const BOB_HASH: PubKeyHash = [0x33; 20];

pub fn new_chain() -> Arc<ChainState> {
    Arc::new(ChainState::open(Arc::new(KvChainStore::in_memory()), Logger::default()).unwrap())
}

/// Timestamp placing `height` exactly on the ideal schedule
pub fn scheduled_time(height: u64) -> u64 {
    GENESIS_TIMESTAMP + TARGET_TIME_PER_BLOCK * height
}

pub fn coinbase(height: u64, amount: u64, payout: &PubKeyHash) -> Transaction {
    Transaction::new(
        1,
        vec![TxInput {
            prevout: OutPoint::null(),
            signature: height.to_le_bytes().to_vec(),
            pubkey: vec![],
        }],
        vec![TxOutput { amount, script_pubkey: pay_to_pubkey_hash(payout) }],
        height as u32,
    )
}

/// Unsigned payment spending `prevouts` into one output per (amount, recipient)
pub fn payment(prevouts: &[OutPoint], outputs: &[(u64, PubKeyHash)]) -> Transaction {
    Transaction::new(
        1,
        prevouts
            .iter()
            .map(|&prevout| TxInput { prevout, signature: vec![], pubkey: vec![] })
            .collect(),
        outputs
            .iter()
            .map(|(amount, hash)| TxOutput { amount: *amount, script_pubkey: pay_to_pubkey_hash(hash) })
            .collect(),
        0,
    )
}

pub fn solve(mut block: Block) -> Block {
    while !check_proof_of_work(&block.header).unwrap() {
        block.header.nonce += 1;
    }
    block
}

/// Mined block extending `chain` with `transactions` after a coinbase of `reward`
pub fn block_with(chain: &ChainState, transactions: Vec<Transaction>, reward: u64, timestamp: u64) -> Block {
    let height = chain.height() + 1;
    let mut all = vec![coinbase(height, reward, &MINER_HASH)];
    all.extend(transactions);
    solve(Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: chain.best_block_hash(),
            merkle_root: compute_merkle_root(&all),
            timestamp,
            bits: chain.next_bits(BOOTSTRAP_BITS).unwrap(),
            nonce: 0,
        },
        transactions: all,
    })
}

/// Mined empty block on the ideal schedule paying the full subsidy
pub fn next_block(chain: &ChainState) -> Block {
    let height = chain.height() + 1;
    block_with(chain, vec![], economic::get_block_subsidy(height), scheduled_time(height))
}

/// Extend `chain` by `count` empty blocks
pub fn extend(chain: &ChainState, count: u64) {
    for _ in 0..count {
        let height = chain.height() + 1;
        let block = next_block(chain);
        assert_eq!(chain.add_block(block, height).unwrap(), ValidationResult::Valid);
    }
}

pub fn coinbase_outpoint(block: &Block) -> OutPoint {
    OutPoint::new(block.transactions[0].txid(), 0)
}

/// Chain store that starts refusing writes once `fail` is set
pub struct FlakyStore {
    inner: KvChainStore<MemoryKeyValueStore>,
    pub fail: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        FlakyStore { inner: KvChainStore::in_memory(), fail: AtomicBool::new(false) }
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(ConsensusError::Storage("disk unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl ChainStore for FlakyStore {
    fn best_block(&self) -> Result<Option<Hash>> {
        self.inner.best_block()
    }

    fn set_best_block(&self, hash: &Hash) -> Result<()> {
        self.check()?;
        self.inner.set_best_block(hash)
    }

    fn block(&self, hash: &Hash) -> Result<Option<Block>> {
        self.inner.block(hash)
    }

    fn put_block(&self, block: &Block) -> Result<()> {
        self.check()?;
        self.inner.put_block(block)
    }
}
