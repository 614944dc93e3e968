//! Mine a short chain on an in-memory store and print its status
//!
//! Usage: powledger-node [CONFIG.json] [BLOCKS]

use std::env;

use anyhow::{bail, Context, Result};
use log::info;

use powledger::block::current_timestamp;
use powledger::{Node, NodeConfig};

const DEFAULT_BLOCKS: u64 = 10;
const MAX_ATTEMPTS_PER_BLOCK: u64 = 1 << 24;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => NodeConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => NodeConfig::default(),
    };
    let blocks = match args.next() {
        Some(count) => count
            .parse::<u64>()
            .with_context(|| format!("invalid block count {:?}", count))?,
        None => DEFAULT_BLOCKS,
    };

    let node = Node::new(config).context("starting node")?;
    info!("Mining {} blocks from height {}", blocks, node.chain().height());

    for _ in 0..blocks {
        if node
            .miner()
            .mine_one(current_timestamp(), MAX_ATTEMPTS_PER_BLOCK)?
            .is_none()
        {
            bail!("no block found at height {}", node.chain().height() + 1);
        }
    }

    println!("{}", serde_json::to_string_pretty(&node.chain_info())?);
    Ok(())
}
