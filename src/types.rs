//! Core ledger types

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::constants::{BLOCK_HEADER_SIZE, COINBASE_INDEX};
use crate::serialize::write_varint;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// 20-byte public key hash carried by pay-to-pubkey-hash outputs
pub type PubKeyHash = [u8; 20];

/// Double SHA-256 over `data`
pub fn double_sha256(data: &[u8]) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(data);
    sha256d::Hash::from_engine(engine).into_inner()
}

/// OutPoint: (transaction hash, output index)
///
/// Ordering is lexicographic by hash, then index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// The sentinel outpoint spent by a coinbase input
    pub fn null() -> Self {
        OutPoint { hash: [0u8; 32], index: COINBASE_INDEX }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == COINBASE_INDEX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.hash), self.index)
    }
}

/// Transaction input: outpoint being spent, signature, public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
    pub signature: ByteString,
    pub pubkey: ByteString,
}

/// Transaction output: amount in base units and locking script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub script_pubkey: ByteString,
}

/// Transaction
///
/// Fields are private so the memoized id can never go stale: every mutator
/// clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    #[serde(skip)]
    txid: OnceLock<Hash>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.lock_time == other.lock_time
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn new(version: u32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, lock_time: u32) -> Self {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            txid: OnceLock::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn set_version(&mut self, version: u32) {
        self.txid = OnceLock::new();
        self.version = version;
    }

    pub fn set_lock_time(&mut self, lock_time: u32) {
        self.txid = OnceLock::new();
        self.lock_time = lock_time;
    }

    /// Mutable access to the inputs; clears the cached id
    pub fn inputs_mut(&mut self) -> &mut Vec<TxInput> {
        self.txid = OnceLock::new();
        &mut self.inputs
    }

    /// Mutable access to the outputs; clears the cached id
    pub fn outputs_mut(&mut self) -> &mut Vec<TxOutput> {
        self.txid = OnceLock::new();
        &mut self.outputs
    }

    /// Transaction id: double SHA-256 of version, input outpoints, outputs and lock time
    ///
    /// Signatures and public keys are excluded, so signing an input does not
    /// change the id it commits to.
    pub fn txid(&self) -> Hash {
        *self.txid.get_or_init(|| double_sha256(&self.id_preimage()))
    }

    fn id_preimage(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut bytes, self.inputs.len());
        for input in &self.inputs {
            bytes.extend_from_slice(&input.prevout.hash);
            bytes.extend_from_slice(&input.prevout.index.to_le_bytes());
        }
        write_varint(&mut bytes, self.outputs.len());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.amount.to_le_bytes());
            write_varint(&mut bytes, output.script_pubkey.len());
            bytes.extend_from_slice(&output.script_pubkey);
        }
        bytes.extend_from_slice(&self.lock_time.to_le_bytes());
        bytes
    }

    /// A coinbase has exactly one input, spending the null outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Sum of output amounts, `None` on overflow
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.amount))
    }
}

/// Block header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u64,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Fixed 80-byte encoding used for hashing and proof of work
    ///
    /// The timestamp is truncated to its low 32 bits here; the full block
    /// encoding keeps all 64.
    pub fn hash_preimage(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut bytes = [0u8; BLOCK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.prev_block_hash);
        bytes[36..68].copy_from_slice(&self.merkle_root);
        bytes[68..72].copy_from_slice(&(self.timestamp as u32).to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        double_sha256(&self.hash_preimage())
    }
}

/// Block: header plus ordered transactions, coinbase first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

/// Spendable output as recorded in the UTXO set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub amount: u64,
    pub script_pubkey: ByteString,
}

impl From<&TxOutput> for UtxoEntry {
    fn from(output: &TxOutput) -> Self {
        UtxoEntry {
            amount: output.amount,
            script_pubkey: output.script_pubkey.clone(),
        }
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}
