//! Unspent transaction output set
//!
//! Every single operation takes the set's lock once, so it is atomic on its
//! own. Multi-step changes go through [`UtxoSet::commit`], which validates a
//! whole [`UtxoBatch`] and applies it under one write guard.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::types::*;

/// Why a batch could not be applied; nothing was changed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoConflict {
    #[error("missing input {0}")]
    Missing(OutPoint),

    #[error("outpoint {0} spent twice")]
    DoubleSpend(OutPoint),

    #[error("output {0} already exists")]
    AlreadyExists(OutPoint),
}

/// Spends and creations to apply together
#[derive(Debug, Clone, Default)]
pub struct UtxoBatch {
    spends: Vec<OutPoint>,
    creates: Vec<(OutPoint, UtxoEntry)>,
}

impl UtxoBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spend(&mut self, outpoint: OutPoint) {
        self.spends.push(outpoint);
    }

    pub fn create(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.creates.push((outpoint, entry));
    }

    pub fn spends(&self) -> &[OutPoint] {
        &self.spends
    }

    pub fn creates(&self) -> &[(OutPoint, UtxoEntry)] {
        &self.creates
    }
}

#[derive(Debug, Default)]
pub struct UtxoSet {
    entries: RwLock<BTreeMap<OutPoint, UtxoEntry>>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<OutPoint, UtxoEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<OutPoint, UtxoEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite an entry
    pub fn put(&self, outpoint: OutPoint, entry: UtxoEntry) {
        self.write().insert(outpoint, entry);
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.read().get(outpoint).cloned()
    }

    /// Remove an entry, returning whether it existed
    pub fn spend(&self, outpoint: &OutPoint) -> bool {
        self.write().remove(outpoint).is_some()
    }

    pub fn has(&self, outpoint: &OutPoint) -> bool {
        self.read().contains_key(outpoint)
    }

    /// Point-in-time copy of the whole set
    pub fn snapshot(&self) -> BTreeMap<OutPoint, UtxoEntry> {
        self.read().clone()
    }

    pub fn size(&self) -> usize {
        self.read().len()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Apply `batch` all-or-nothing
    ///
    /// Every spend must exist and appear once; no creation may land on an
    /// outpoint that stays unspent or is created twice.
    pub fn commit(&self, batch: &UtxoBatch) -> Result<(), UtxoConflict> {
        let mut entries = self.write();

        let mut spent = BTreeSet::new();
        for outpoint in &batch.spends {
            if !entries.contains_key(outpoint) {
                return Err(UtxoConflict::Missing(*outpoint));
            }
            if !spent.insert(*outpoint) {
                return Err(UtxoConflict::DoubleSpend(*outpoint));
            }
        }

        let mut created = BTreeSet::new();
        for (outpoint, _) in &batch.creates {
            let occupied = entries.contains_key(outpoint) && !spent.contains(outpoint);
            if occupied || !created.insert(*outpoint) {
                return Err(UtxoConflict::AlreadyExists(*outpoint));
            }
        }

        for outpoint in &batch.spends {
            entries.remove(outpoint);
        }
        for (outpoint, entry) in &batch.creates {
            entries.insert(*outpoint, entry.clone());
        }
        Ok(())
    }
}
