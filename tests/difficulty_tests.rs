//! Difficulty schedule driven through a real chain

mod common;

use common::*;
use powledger::pow::*;
use powledger::*;

/// Extend `chain` to the last block of the first retarget window, spacing
/// blocks `spacing` seconds apart
fn fill_first_window(chain: &ChainState, spacing: u64) {
    while chain.height() < DIFFICULTY_ADJUSTMENT_INTERVAL - 1 {
        let height = chain.height() + 1;
        let block = block_with(
            chain,
            vec![],
            economic::get_block_subsidy(height),
            GENESIS_TIMESTAMP + spacing * height,
        );
        assert_eq!(chain.add_block(block, height).unwrap(), ValidationResult::Valid);
    }
}

// ============================================================================
// BETWEEN BOUNDARIES
// ============================================================================

#[test]
fn test_first_block_accepts_any_target() {
    let chain = new_chain();
    assert_eq!(expected_bits(chain.as_ref()).unwrap(), None);
    assert_eq!(chain.next_bits(0x207f0000).unwrap(), 0x207f0000);
}

#[test]
fn test_target_carries_forward() {
    let chain = new_chain();
    extend(&chain, 3);
    assert_eq!(expected_bits(chain.as_ref()).unwrap(), Some(BOOTSTRAP_BITS));
    for height in 1..=3 {
        assert_eq!(chain.block_at_height(height).unwrap().header.bits, BOOTSTRAP_BITS);
    }
}

#[test]
fn test_changed_target_between_boundaries_rejected() {
    let chain = new_chain();
    extend(&chain, 1);
    let mut block = next_block(&chain);
    block.header.bits = 0x2000ffff;
    let block = solve(block);
    let result = chain.add_block(block, 2).unwrap();
    assert!(matches!(result, ValidationResult::Invalid(reason) if reason.contains("Difficulty")));
}

// ============================================================================
// AT THE BOUNDARY
// ============================================================================

#[test]
fn test_on_schedule_window_keeps_target() {
    let chain = new_chain();
    fill_first_window(&chain, TARGET_TIME_PER_BLOCK);
    assert_eq!(chain.height(), DIFFICULTY_ADJUSTMENT_INTERVAL - 1);
    assert_eq!(chain.next_bits(BOOTSTRAP_BITS).unwrap(), BOOTSTRAP_BITS);

    // The boundary block itself must carry the schedule's target
    let block = next_block(&chain);
    assert_eq!(block.header.bits, BOOTSTRAP_BITS);
    assert!(chain.add_block(block, DIFFICULTY_ADJUSTMENT_INTERVAL).unwrap().is_valid());
}

#[test]
fn test_half_time_window_halves_target() {
    let chain = new_chain();
    fill_first_window(&chain, TARGET_TIME_PER_BLOCK / 2);
    let expected = 0x2000_0000 | (0x7fffff / 2);
    assert_eq!(chain.next_bits(BOOTSTRAP_BITS).unwrap(), expected);

    // The old target is no longer acceptable at the boundary
    let height = chain.height() + 1;
    let mut stale = next_block(&chain);
    stale.header.bits = BOOTSTRAP_BITS;
    let stale = solve(stale);
    assert!(!chain.add_block(stale, height).unwrap().is_valid());

    let block = next_block(&chain);
    assert_eq!(block.header.bits, expected);
    assert!(chain.add_block(block, height).unwrap().is_valid());
}

// ============================================================================
// PURE RETARGET
// ============================================================================

#[test]
fn test_retarget_reproduces_target_on_schedule() {
    let ideal = TARGET_TIME_PER_BLOCK * (DIFFICULTY_ADJUSTMENT_INTERVAL - 1);
    for bits in [GENESIS_BITS, 0x1c0a1b2c, BOOTSTRAP_BITS] {
        for next_height in [2016, 20160] {
            assert_eq!(
                retarget(bits, GENESIS_TIMESTAMP, GENESIS_TIMESTAMP + ideal, DIFFICULTY_ADJUSTMENT_INTERVAL, next_height),
                bits
            );
        }
    }
}

#[test]
fn test_retarget_is_monotonic_in_elapsed_time() {
    let ideal = TARGET_TIME_PER_BLOCK * (DIFFICULTY_ADJUSTMENT_INTERVAL - 1);
    let mut previous = 0u32;
    for percent in [30u64, 60, 90, 100, 150, 200, 300] {
        let bits = retarget(
            GENESIS_BITS,
            0,
            ideal * percent / 100,
            DIFFICULTY_ADJUSTMENT_INTERVAL,
            20160,
        );
        let mantissa = bits & MAX_TARGET_MANTISSA;
        assert!(mantissa >= previous, "{}% gave {:#x}", percent, bits);
        previous = mantissa;
    }
}

#[test]
fn test_difficulty_ratio() {
    assert_eq!(difficulty(GENESIS_BITS), 1.0);
    assert!(difficulty(0x1c00ffff) > 255.0);
    assert!(difficulty(BOOTSTRAP_BITS) < 1.0);
}
