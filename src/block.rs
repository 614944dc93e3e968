//! Block validation and UTXO application

use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::*;
use crate::economic::{calculate_fee, get_block_subsidy};
use crate::error::Result;
use crate::merkle::compute_merkle_root;
use crate::pow::{check_proof_of_work, expected_bits, ChainView};
use crate::script::pay_to_pubkey_hash;
use crate::types::*;
use crate::utxo::{UtxoBatch, UtxoSet};

/// Seconds since the Unix epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The deterministic first block
///
/// A single coinbase pays the height-0 subsidy to a pay-to-pubkey-hash script
/// over twenty zero bytes. Genesis is applied directly and never checked
/// against its own proof of work.
pub fn genesis_block() -> Block {
    let coinbase = Transaction::new(
        1,
        vec![TxInput {
            prevout: OutPoint::null(),
            signature: GENESIS_MESSAGE.to_vec(),
            pubkey: Vec::new(),
        }],
        vec![TxOutput {
            amount: get_block_subsidy(0),
            script_pubkey: pay_to_pubkey_hash(&[0u8; 20]),
        }],
        0,
    );
    let transactions = vec![coinbase];

    Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root: compute_merkle_root(&transactions),
            timestamp: GENESIS_TIMESTAMP,
            bits: GENESIS_BITS,
            nonce: 0,
        },
        transactions,
    }
}

/// ValidateBlockStructure against the local clock
pub fn validate_block_structure(block: &Block) -> Result<ValidationResult> {
    validate_block_structure_at(block, current_timestamp())
}

/// ValidateBlockStructure: ℬ × ℕ → {valid, invalid}
///
/// For block b = (h, txs) at local time now:
/// 1. |txs| > 0
/// 2. txs[0] is a coinbase
/// 3. h.merkle_root = ComputeMerkleRoot(txs)
/// 4. h.timestamp ≤ now + 2 hours
/// 5. mantissa(h.bits) ≠ 0
/// 6. CheckProofOfWork(h)
pub fn validate_block_structure_at(block: &Block, now: u64) -> Result<ValidationResult> {
    // 1. Block must carry transactions
    let first = match block.transactions.first() {
        Some(tx) => tx,
        None => return Ok(ValidationResult::Invalid("Block has no transactions".to_string())),
    };

    // 2. First transaction must be the coinbase
    if !first.is_coinbase() {
        return Ok(ValidationResult::Invalid(
            "First transaction must be coinbase".to_string(),
        ));
    }

    // 3. Merkle root must commit to the transactions
    if compute_merkle_root(&block.transactions) != block.header.merkle_root {
        return Ok(ValidationResult::Invalid("Merkle root mismatch".to_string()));
    }

    // 4. Timestamp may not run too far ahead
    if block.header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
        return Ok(ValidationResult::Invalid(format!(
            "Timestamp {} too far in the future",
            block.header.timestamp
        )));
    }

    // 5. Target must be nonzero
    if block.header.bits & MAX_TARGET_MANTISSA == 0 {
        return Ok(ValidationResult::Invalid("Zero difficulty target".to_string()));
    }

    // 6. Proof of work
    match check_proof_of_work(&block.header) {
        Ok(true) => Ok(ValidationResult::Valid),
        Ok(false) => Ok(ValidationResult::Invalid("Insufficient proof of work".to_string())),
        Err(e) => Ok(ValidationResult::Invalid(e.to_string())),
    }
}

/// CheckDifficulty: 𝒞 × ℋ → {valid, invalid}
///
/// At height 0 any target is accepted; otherwise `header.bits` must equal the
/// retarget schedule's value for the next height.
pub fn check_difficulty<V: ChainView + ?Sized>(
    view: &V,
    header: &BlockHeader,
) -> Result<ValidationResult> {
    match expected_bits(view)? {
        None => Ok(ValidationResult::Valid),
        Some(bits) if bits == header.bits => Ok(ValidationResult::Valid),
        Some(bits) => Ok(ValidationResult::Invalid(format!(
            "Difficulty {:#010x} does not match expected {:#010x}",
            header.bits, bits
        ))),
    }
}

/// CheckBlockValues: ℬ × 𝒰𝒮 × ℕ → {valid, invalid}
///
/// For block b = (h, txs) at height height:
/// 1. Only txs[0] may be a coinbase
/// 2. Every input of txs[1..] exists in us, and inputs cover outputs
/// 3. Let fees = Σ fee(tx)
/// 4. Coinbase output ≤ fees + GetBlockSubsidy(height)
pub fn check_block_values(block: &Block, utxo_set: &UtxoSet, height: u64) -> Result<ValidationResult> {
    let mut total_fees = 0u64;
    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            return Ok(ValidationResult::Invalid(format!(
                "Unexpected coinbase at index {}",
                i
            )));
        }
        let fee = match calculate_fee(tx, |outpoint| utxo_set.get(outpoint).map(|e| e.amount)) {
            Ok(fee) => fee,
            Err(e) => {
                return Ok(ValidationResult::Invalid(format!("Transaction {}: {}", i, e)))
            }
        };
        total_fees = match total_fees.checked_add(fee) {
            Some(total) => total,
            None => return Ok(ValidationResult::Invalid("Fee total overflows".to_string())),
        };
    }

    let coinbase_output = match block.transactions.first().map(Transaction::total_output) {
        Some(Some(total)) => total,
        Some(None) => return Ok(ValidationResult::Invalid("Coinbase output overflows".to_string())),
        None => return Ok(ValidationResult::Invalid("Block has no transactions".to_string())),
    };
    let allowed = get_block_subsidy(height).saturating_add(total_fees);
    if coinbase_output > allowed {
        return Ok(ValidationResult::Invalid(format!(
            "Coinbase output {} exceeds fees + subsidy {}",
            coinbase_output, allowed
        )));
    }

    Ok(ValidationResult::Valid)
}

/// The UTXO changes a block makes: every non-coinbase input is spent, then
/// every output (coinbase included) is created under (txid, index)
pub fn block_utxo_batch(block: &Block) -> UtxoBatch {
    let mut batch = UtxoBatch::new();
    for tx in block.transactions.iter().skip(1) {
        for input in tx.inputs() {
            batch.spend(input.prevout);
        }
    }
    for tx in &block.transactions {
        let txid = tx.txid();
        for (index, output) in tx.outputs().iter().enumerate() {
            batch.create(OutPoint::new(txid, index as u32), UtxoEntry::from(output));
        }
    }
    batch
}

/// ConnectBlockUTXO: ℬ × 𝒰𝒮 → {valid, invalid} × 𝒰𝒮
///
/// Applies the block's batch atomically: a missing input, an outpoint spent
/// twice or an output landing on an unspent entry rejects the block and leaves
/// the set untouched.
pub fn connect_block_utxo(block: &Block, utxo_set: &UtxoSet) -> ValidationResult {
    match utxo_set.commit(&block_utxo_batch(block)) {
        Ok(()) => ValidationResult::Valid,
        Err(conflict) => ValidationResult::Invalid(conflict.to_string()),
    }
}

/// DisconnectBlockUTXO: removes the outputs the block created
///
/// Spent inputs are not restored: no undo data is kept.
pub fn disconnect_block_utxo(block: &Block, utxo_set: &UtxoSet) {
    for tx in &block.transactions {
        let txid = tx.txid();
        for index in 0..tx.outputs().len() {
            utxo_set.spend(&OutPoint::new(txid, index as u32));
        }
    }
}
