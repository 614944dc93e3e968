//! Node configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::pubkey_hash_from_address;
use crate::constants::{BOOTSTRAP_BITS, DEFAULT_MEMPOOL_CAPACITY};
use crate::error::{ConsensusError, Result};
use crate::types::PubKeyHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Maximum number of pooled transactions
    pub mempool_capacity: usize,
    /// Target string attached to log records
    pub log_target: String,
    pub miner: MinerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
            log_target: "powledger".to_string(),
            miner: MinerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinerConfig {
    pub threads: usize,
    /// Base-58-check address paid by mined coinbases
    pub payout_address: Option<String>,
    /// Target for the first block after genesis, where any target is accepted
    pub bootstrap_bits: u32,
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            threads: 1,
            payout_address: None,
            bootstrap_bits: BOOTSTRAP_BITS,
        }
    }
}

impl MinerConfig {
    /// Pubkey hash the coinbase pays; twenty zero bytes without an address
    pub fn payout_pubkey_hash(&self) -> Result<PubKeyHash> {
        match &self.payout_address {
            Some(address) => pubkey_hash_from_address(address),
            None => Ok([0u8; 20]),
        }
    }
}

impl NodeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NodeConfig =
            serde_json::from_str(json).map_err(|e| ConsensusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConsensusError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConsensusError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.mempool_capacity == 0 {
            return Err(ConsensusError::Config("mempool_capacity must be positive".to_string()));
        }
        if self.miner.threads == 0 {
            return Err(ConsensusError::Config("miner.threads must be positive".to_string()));
        }
        self.miner.payout_pubkey_hash()?;
        Ok(())
    }
}
