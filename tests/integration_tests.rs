//! End-to-end scenarios through the node context

mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use powledger::address::address_from_pubkey_hash;
use powledger::block::genesis_block;
use powledger::logging::MemoryLog;
use powledger::serialize::serialize_block;
use powledger::storage::KvChainStore;
use powledger::*;

fn node_paying(payout: &PubKeyHash) -> Node {
    let mut config = NodeConfig::default();
    config.miner.payout_address = Some(address_from_pubkey_hash(payout));
    Node::new(config).unwrap()
}

#[test]
fn test_fresh_node_reports_genesis() {
    let node = Node::new(NodeConfig::default()).unwrap();
    let info = node.chain_info();
    assert_eq!(info.height, 0);
    assert_eq!(info.best_block_hash, hex::encode(genesis_block().hash()));
    assert_eq!(node.block_by_height(0), Some(genesis_block()));
    assert_eq!(node.block_by_hash(&genesis_block().hash()), Some(genesis_block()));
    assert_eq!(node.block_by_height(1), None);
}

#[test]
fn test_mine_spend_and_confirm() {
    let node = node_paying(&MINER_HASH);
    for i in 1..=2 {
        node.miner().mine_one(scheduled_time(i), 1_000_000).unwrap().unwrap();
    }
    assert_eq!(node.balance(&MINER_HASH), 50 * COIN);

    let (outpoint, _) = node.utxos_for(&MINER_HASH)[0].clone();
    let pay = payment(&[outpoint], &[(10 * COIN, ALICE_HASH), (14 * COIN, MINER_HASH)]);
    assert_eq!(node.submit_transaction(pay.clone()).unwrap(), MempoolResult::Accepted);

    let block = node.miner().mine_one(scheduled_time(3), 1_000_000).unwrap().unwrap();
    assert!(block.transactions.contains(&pay));
    assert!(!node.mempool().contains(&pay.txid()));
    assert_eq!(node.balance(&ALICE_HASH), 10 * COIN);
    // 25 spent, 14 change, 25 subsidy and 1 fee
    assert_eq!(node.balance(&MINER_HASH), 50 * COIN - 25 * COIN + 14 * COIN + 26 * COIN);
}

#[test]
fn test_submit_block_confirms_pooled_transactions() {
    let node = Node::new(NodeConfig::default()).unwrap();
    let funded = coinbase_outpoint(&genesis_block());
    let pay = payment(&[funded], &[(25 * COIN, ALICE_HASH)]);
    node.submit_transaction(pay.clone()).unwrap();

    let block = block_with(node.chain(), vec![pay.clone()], 25 * COIN, scheduled_time(1));
    assert_eq!(node.submit_block(block).unwrap(), ValidationResult::Valid);
    assert_eq!(node.mempool().size(), 0);
    assert_eq!(node.balance(&ALICE_HASH), 25 * COIN);
}

#[test]
fn test_submit_raw_block() {
    let node = Node::new(NodeConfig::default()).unwrap();
    let block = next_block(node.chain());
    let mut bytes = serialize_block(&block);
    assert_eq!(node.submit_raw_block(&bytes).unwrap(), ValidationResult::Valid);

    bytes.truncate(bytes.len() - 1);
    assert!(!node.submit_raw_block(&bytes).unwrap().is_valid());
    assert_eq!(node.chain_info().height, 1);
}

#[test]
fn test_supply_matches_issued_coins() {
    let node = node_paying(&MINER_HASH);
    for i in 1..=4 {
        node.miner().mine_one(scheduled_time(i), 1_000_000).unwrap().unwrap();
    }
    let info = node.chain_info();
    let held: u64 = node.utxo_snapshot().values().map(|e| e.amount).sum();
    assert_eq!(held, info.issued_supply);
    assert_eq!(info.issued_supply, 5 * 25 * COIN);
}

#[test]
fn test_node_logs_through_injected_sink() {
    let sink = Arc::new(MemoryLog::new());
    let logger = Logger::with_sink("node", sink.clone());
    let node = Node::open(NodeConfig::default(), Arc::new(KvChainStore::in_memory()), logger).unwrap();

    let block = next_block(node.chain());
    let mut stale = block.clone();
    node.submit_block(block).unwrap();
    stale.header.nonce = stale.header.nonce.wrapping_add(1);
    node.submit_block(stale).unwrap();

    assert!(sink.contains(log::Level::Info, "Initialized chain"));
    assert!(sink.contains(log::Level::Info, "Accepted block"));
    assert!(sink.contains(log::Level::Debug, "Rejected block"));
}

#[test]
fn test_invalid_config_refused() {
    let mut config = NodeConfig::default();
    config.mempool_capacity = 0;
    assert!(matches!(Node::new(config), Err(ConsensusError::Config(_))));

    let mut config = NodeConfig::default();
    config.miner.payout_address = Some("not-an-address".to_string());
    assert!(Node::new(config).is_err());
}

#[test]
fn test_config_from_json() {
    let config = NodeConfig::from_json(r#"{ "mempool_capacity": 3, "miner": { "threads": 2 } }"#).unwrap();
    assert_eq!(config.mempool_capacity, 3);
    assert_eq!(config.miner.threads, 2);
    assert_eq!(config.miner.bootstrap_bits, BOOTSTRAP_BITS);
    assert!(NodeConfig::from_json(r#"{ "unknown": 1 }"#).is_err());

    let node = Node::new(config).unwrap();
    assert_eq!(node.mempool().capacity(), 3);
}

#[test]
fn test_node_mines_with_configured_threads() {
    let config = NodeConfig::from_json(r#"{ "miner": { "threads": 2 } }"#).unwrap();
    let node = Node::new(config).unwrap();
    assert!(node.start_mining());
    assert!(node.miner().is_mining());
    // Already running
    assert!(!node.start_mining());

    while node.chain().height() < 2 {
        thread::yield_now();
    }
    node.stop_mining();

    assert!(!node.miner().is_mining());
    assert!(node.miner().blocks_mined() >= 2);
    assert_eq!(node.miner().blocks_mined(), node.chain().height());
}
