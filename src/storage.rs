//! Storage collaborators
//!
//! The chain state persists through [`ChainStore`]. [`KvChainStore`] layers it
//! over any [`KeyValueStore`], encoding blocks with the wire codec, and
//! [`MemoryKeyValueStore`] keeps everything in process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{ConsensusError, Result};
use crate::serialize::{deserialize_block, serialize_block};
use crate::types::*;

/// Generic byte-keyed storage
pub trait KeyValueStore: Send + Sync {
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// Chain-level persistence used by the chain state
pub trait ChainStore: Send + Sync {
    fn best_block(&self) -> Result<Option<Hash>>;
    fn set_best_block(&self, hash: &Hash) -> Result<()>;
    fn block(&self, hash: &Hash) -> Result<Option<Block>>;
    fn put_block(&self, block: &Block) -> Result<()>;
}

#[derive(Debug)]
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    open: AtomicBool,
}

impl MemoryKeyValueStore {
    /// A new, already open, empty store
    pub fn new() -> Self {
        MemoryKeyValueStore {
            entries: RwLock::new(BTreeMap::new()),
            open: AtomicBool::new(true),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ConsensusError::Storage("store is closed".to_string()))
        }
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

const BEST_BLOCK_KEY: &[u8] = b"chain:best";
const BLOCK_KEY_PREFIX: &[u8] = b"block:";

fn block_key(hash: &Hash) -> Vec<u8> {
    let mut key = BLOCK_KEY_PREFIX.to_vec();
    key.extend_from_slice(hash);
    key
}

/// [`ChainStore`] over a key-value store
///
/// Blocks live under `block:<hash>` in wire encoding; the best hash under
/// `chain:best`.
#[derive(Debug)]
pub struct KvChainStore<S> {
    store: S,
}

impl<S: KeyValueStore> KvChainStore<S> {
    /// Wrap `store`, opening it
    pub fn new(store: S) -> Result<Self> {
        store.open()?;
        Ok(KvChainStore { store })
    }

    pub fn inner(&self) -> &S {
        &self.store
    }
}

impl KvChainStore<MemoryKeyValueStore> {
    pub fn in_memory() -> Self {
        KvChainStore { store: MemoryKeyValueStore::new() }
    }
}

impl<S: KeyValueStore> ChainStore for KvChainStore<S> {
    fn best_block(&self) -> Result<Option<Hash>> {
        match self.store.get(BEST_BLOCK_KEY)? {
            None => Ok(None),
            Some(bytes) => {
                let hash: Hash = bytes.as_slice().try_into().map_err(|_| {
                    ConsensusError::Storage(format!("best block pointer has {} bytes", bytes.len()))
                })?;
                Ok(Some(hash))
            }
        }
    }

    fn set_best_block(&self, hash: &Hash) -> Result<()> {
        self.store.put(BEST_BLOCK_KEY, hash)
    }

    fn block(&self, hash: &Hash) -> Result<Option<Block>> {
        match self.store.get(&block_key(hash))? {
            None => Ok(None),
            Some(bytes) => deserialize_block(&bytes).map(Some),
        }
    }

    fn put_block(&self, block: &Block) -> Result<()> {
        self.store.put(&block_key(&block.hash()), &serialize_block(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::genesis_block;

    #[test]
    fn test_memory_store_basic_operations() {
        let store = MemoryKeyValueStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_closed_store_fails() {
        let store = MemoryKeyValueStore::new();
        store.close().unwrap();
        assert!(matches!(store.put(b"a", b"1"), Err(ConsensusError::Storage(_))));
        store.open().unwrap();
        assert!(store.put(b"a", b"1").is_ok());
    }

    #[test]
    fn test_chain_store_round_trip() {
        let chain = KvChainStore::in_memory();
        let genesis = genesis_block();
        assert_eq!(chain.best_block().unwrap(), None);

        chain.put_block(&genesis).unwrap();
        chain.set_best_block(&genesis.hash()).unwrap();

        assert_eq!(chain.best_block().unwrap(), Some(genesis.hash()));
        assert_eq!(chain.block(&genesis.hash()).unwrap(), Some(genesis));
        assert_eq!(chain.block(&[1u8; 32]).unwrap(), None);
    }

    #[test]
    fn test_corrupt_best_pointer() {
        let chain = KvChainStore::new(MemoryKeyValueStore::new()).unwrap();
        chain.inner().put(BEST_BLOCK_KEY, b"short").unwrap();
        assert!(chain.best_block().is_err());
    }
}
