//! Transaction structure validation

use crate::constants::*;
use crate::error::Result;
use crate::types::*;

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// A transaction tx = (v, ins, outs, lt) is valid if and only if:
/// 1. |outs| > 0
/// 2. ∀o ∈ outs: o.amount ≤ M_max
/// 3. Σ o.amount does not wrap and is ≤ M_max
/// 4. tx is a coinbase or |ins| > 0
pub fn validate_transaction_structure(tx: &Transaction) -> Result<ValidationResult> {
    // 1. Check outputs are not empty
    if tx.outputs().is_empty() {
        return Ok(ValidationResult::Invalid("Empty outputs".to_string()));
    }

    // 2-3. Check output amounts and their running total
    let mut total = 0u64;
    for (i, output) in tx.outputs().iter().enumerate() {
        if output.amount > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Output amount {} at index {} exceeds maximum money",
                output.amount, i
            )));
        }
        total = match total.checked_add(output.amount) {
            Some(sum) => sum,
            None => {
                return Ok(ValidationResult::Invalid(format!(
                    "Output total overflows at index {}",
                    i
                )))
            }
        };
        if total > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Output total {} exceeds maximum money",
                total
            )));
        }
    }

    // 4. Non-coinbase transactions must spend something
    if !tx.is_coinbase() && tx.inputs().is_empty() {
        return Ok(ValidationResult::Invalid("Empty inputs".to_string()));
    }

    Ok(ValidationResult::Valid)
}
