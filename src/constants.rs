//! Consensus constants for the ledger

/// Base units per coin
pub const COIN: u64 = 100_000_000;

/// Maximum money supply: 12,000,000 coins in base units
pub const MAX_MONEY: u64 = 12_000_000 * COIN;

/// Initial block subsidy: 25 coins
pub const INITIAL_SUBSIDY: u64 = 25 * COIN;

/// Halving interval: 210,000 blocks
pub const HALVING_INTERVAL: u64 = 210_000;

/// Number of halvings after which the subsidy is zero
pub const MAX_HALVINGS: u64 = 32;

/// Target time per block: 10 minutes
pub const TARGET_TIME_PER_BLOCK: u64 = 600;

/// Difficulty adjustment interval: 2016 blocks
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Heights below this get the more aggressive early-network retarget
pub const EARLY_NETWORK_HEIGHT: u64 = 10_000;

/// Largest mantissa a compact target may carry
pub const MAX_TARGET_MANTISSA: u32 = 0x007f_ffff;

/// Sign bit of the compact target's 24-bit field
pub const TARGET_SIGN_BIT: u32 = 0x0080_0000;

/// Compact target of the genesis block
pub const GENESIS_BITS: u32 = 0x1d00_ffff;

/// Genesis timestamp: 2024-01-01T00:00:00Z
pub const GENESIS_TIMESTAMP: u64 = 1_704_067_200;

/// Message carried in the genesis coinbase input
pub const GENESIS_MESSAGE: &[u8] = b"powledger genesis 2024-01-01: a chain begins with one output";

/// Maximum amount a header timestamp may run ahead of local time: 2 hours
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Maximum length of any single encoded byte string (scripts, signatures, keys)
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Size of the header encoding used for hashing and proof of work
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Index marking the coinbase input's outpoint
pub const COINBASE_INDEX: u32 = u32::MAX;

/// Default mempool capacity in transactions
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 100_000;

/// Version byte prefixed to pubkey hashes in addresses
pub const ADDRESS_VERSION: u8 = 0x3f;

/// Easiest compact target, used to bootstrap the first block after genesis
pub const BOOTSTRAP_BITS: u32 = 0x207f_ffff;
