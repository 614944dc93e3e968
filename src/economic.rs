//! Issuance schedule and fee accounting

use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::types::*;

/// GetBlockSubsidy: ℕ → ℕ
///
/// Subsidy halves every 210,000 blocks (HALVING_INTERVAL).
///
/// Formula: subsidy = 25 * C * 2^(-⌊h/H⌋), and 0 once ⌊h/H⌋ ≥ 32
pub fn get_block_subsidy(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= MAX_HALVINGS {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

/// TotalSupply: ℕ → ℕ
///
/// Sum of all block subsidies for heights 0..=height, evaluated one halving
/// period at a time.
pub fn total_supply(height: u64) -> u64 {
    let mut total = 0u64;
    let mut period_start = 0u64;
    while period_start <= height {
        let subsidy = get_block_subsidy(period_start);
        if subsidy == 0 {
            break;
        }
        let period_end = (period_start + HALVING_INTERVAL - 1).min(height);
        total += subsidy * (period_end - period_start + 1);
        period_start += HALVING_INTERVAL;
    }
    total
}

/// Fee = Σ input amounts − Σ output amounts
///
/// `lookup` resolves a spent outpoint to its amount. Missing inputs, overflow
/// and outputs exceeding inputs are errors; coinbase transactions pay no fee.
pub fn calculate_fee<F>(tx: &Transaction, lookup: F) -> Result<u64>
where
    F: Fn(&OutPoint) -> Option<u64>,
{
    if tx.is_coinbase() {
        return Ok(0);
    }

    let mut total_input = 0u64;
    for input in tx.inputs() {
        let amount = lookup(&input.prevout)
            .ok_or_else(|| ConsensusError::UtxoNotFound(input.prevout.to_string()))?;
        total_input = total_input.checked_add(amount).ok_or_else(|| {
            ConsensusError::TransactionValidation("Input total overflows".to_string())
        })?;
    }

    let total_output = tx.total_output().ok_or_else(|| {
        ConsensusError::TransactionValidation("Output total overflows".to_string())
    })?;

    total_input.checked_sub(total_output).ok_or_else(|| {
        ConsensusError::TransactionValidation(format!(
            "Outputs {} exceed inputs {}",
            total_output, total_input
        ))
    })
}
