//! Proof of work: compact targets, header checks and the retarget schedule

use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::types::*;

/// Read access to recorded headers by height, enough to evaluate the
/// difficulty schedule
pub trait ChainView {
    /// Height of the current best block
    fn height(&self) -> u64;

    /// Header of the best-chain block at `height`
    fn header_at(&self, height: u64) -> Option<BlockHeader>;
}

/// CheckProofOfWork: ℋ → {true, false}
///
/// Formula: SHA256(SHA256(header)) ≤ ExpandTarget(header.bits), with the hash
/// read as a big-endian integer. Errors on a malformed compact target.
pub fn check_proof_of_work(header: &BlockHeader) -> Result<bool> {
    let hash_value = U256::from_be_bytes(&header.hash());
    let target = decode_compact(header.bits)?;
    Ok(hash_value <= target)
}

/// Expand a compact target into its 256-bit big-endian form
pub fn expand_target(bits: u32) -> Result<Hash> {
    Ok(decode_compact(bits)?.to_be_bytes())
}

/// GetNextWorkRequired for the block after the current tip
///
/// 1. If the tip is genesis: any target is accepted (`None`)
/// 2. Let next = height + 1
/// 3. If next is not a multiple of 2016: the target must equal the tip's
/// 4. Otherwise retarget from the first and last header of the window just closed
pub fn expected_bits<V: ChainView + ?Sized>(view: &V) -> Result<Option<u32>> {
    let height = view.height();
    if height == 0 {
        return Ok(None);
    }

    let last = header_at(view, height)?;
    let next_height = height + 1;
    if next_height % DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
        return Ok(Some(last.bits));
    }

    let first = header_at(view, next_height - DIFFICULTY_ADJUSTMENT_INTERVAL)?;
    Ok(Some(retarget(
        last.bits,
        first.timestamp,
        last.timestamp,
        DIFFICULTY_ADJUSTMENT_INTERVAL,
        next_height,
    )))
}

fn header_at<V: ChainView + ?Sized>(view: &V, height: u64) -> Result<BlockHeader> {
    view.header_at(height).ok_or_else(|| {
        ConsensusError::BlockValidation(format!("no recorded header at height {}", height))
    })
}

/// Retarget: (bits, first time, last time, block count, next height) → bits
///
/// 1. Let ideal = 600 × (count − 1) and elapsed = last − first
/// 2. Scale the mantissa by clamp(elapsed, ideal/4, 4·ideal) / ideal, capped at 0x7fffff
/// 3. If elapsed < ideal/8: ×4; if elapsed > 8·ideal: ÷4
/// 4. If next height < 10000: elapsed < ideal/2 gives ×2, elapsed > 2·ideal gives ÷2
/// 5. Keep the previous exponent; the mantissa stays within [1, 0x7fffff]
///
/// A window with fewer than two blocks or non-increasing timestamps leaves the
/// target unchanged.
pub fn retarget(
    prev_bits: u32,
    first_timestamp: u64,
    last_timestamp: u64,
    block_count: u64,
    next_height: u64,
) -> u32 {
    if block_count < 2 || last_timestamp <= first_timestamp {
        return prev_bits;
    }

    // Widened so no product overflows for any u64 input
    let ideal = u128::from(TARGET_TIME_PER_BLOCK) * u128::from(block_count - 1);
    let elapsed = u128::from(last_timestamp - first_timestamp);
    let clamped = elapsed.clamp(ideal / 4, ideal * 4);

    let mantissa = u128::from(prev_bits & MAX_TARGET_MANTISSA);
    let mut scaled = (mantissa * clamped / ideal).min(u128::from(MAX_TARGET_MANTISSA));

    // Emergency correction
    if elapsed < ideal / 8 {
        scaled *= 4;
    } else if elapsed > ideal * 8 {
        scaled /= 4;
    }

    // Early network
    if next_height < EARLY_NETWORK_HEIGHT {
        if elapsed < ideal / 2 {
            scaled *= 2;
        } else if elapsed > ideal * 2 {
            scaled /= 2;
        }
    }

    let scaled = scaled.clamp(1, u128::from(MAX_TARGET_MANTISSA)) as u32;
    (prev_bits & 0xff00_0000) | scaled
}

/// Difficulty relative to the genesis target
pub fn difficulty(bits: u32) -> f64 {
    let target = target_as_f64(bits);
    if target == 0.0 {
        return 0.0;
    }
    target_as_f64(GENESIS_BITS) / target
}

fn target_as_f64(bits: u32) -> f64 {
    let exponent = (bits >> 24) as i32;
    let mantissa = f64::from(bits & MAX_TARGET_MANTISSA);
    mantissa * 256f64.powi(exponent - 3)
}

/// 256-bit integer for target calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct U256([u64; 4]); // little-endian words

impl U256 {
    fn zero() -> Self {
        U256([0; 4])
    }

    fn from_u32(value: u32) -> Self {
        U256([u64::from(value), 0, 0, 0])
    }

    fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::zero();
        }

        let mut result = U256::zero();
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }

        result
    }

    fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::zero();
        }

        let mut result = U256::zero();
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }

        result
    }

    fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let start = 32 - (i + 1) * 8;
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[start..start + 8]);
            *word = u64::from_be_bytes(chunk);
        }
        U256(words)
    }

    fn to_be_bytes(self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.0.iter().enumerate() {
            let start = 32 - (i + 1) * 8;
            bytes[start..start + 8].copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

/// Decode a compact target
///
/// Target = mantissa × 256^(exponent − 3). The sign bit must be clear and the
/// result must fit in 256 bits.
fn decode_compact(bits: u32) -> Result<U256> {
    let exponent = bits >> 24;
    let mantissa = bits & MAX_TARGET_MANTISSA;

    if bits & TARGET_SIGN_BIT != 0 {
        return Err(ConsensusError::InvalidProofOfWork(format!(
            "negative target {:#010x}",
            bits
        )));
    }

    if mantissa != 0
        && (exponent > 34 || (mantissa > 0xff && exponent > 33) || (mantissa > 0xffff && exponent > 32))
    {
        return Err(ConsensusError::InvalidProofOfWork(format!(
            "target {:#010x} overflows 256 bits",
            bits
        )));
    }

    let value = U256::from_u32(mantissa);
    if exponent <= 3 {
        Ok(value.shr(8 * (3 - exponent)))
    } else {
        Ok(value.shl(8 * (exponent - 3)))
    }
}
