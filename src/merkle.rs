//! Merkle commitment over a block's transaction ids

use serde::{Deserialize, Serialize};

use crate::types::*;

/// ComputeMerkleRoot: 𝒯𝒳* → ℍ
///
/// 1. If txs is empty: return the zero hash
/// 2. Let leaves = [txid(tx) : tx ∈ txs]
/// 3. While more than one node remains, pair nodes left to right and hash each
///    64-byte concatenation; an odd last node is paired with itself
/// 4. Return the remaining node
pub fn compute_merkle_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(Transaction::txid).collect();
    compute_merkle_root_from_hashes(&leaves)
}

pub fn compute_merkle_root_from_hashes(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    double_sha256(&concat)
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect()
}

/// One step of an inclusion proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleStep {
    pub sibling: Hash,
    /// Sibling sits on the left of the running hash
    pub sibling_is_left: bool,
}

/// Inclusion proof for the leaf at `index`, ordered from the leaf upward
pub fn merkle_branch(leaves: &[Hash], index: usize) -> Option<Vec<MerkleStep>> {
    if index >= leaves.len() {
        return None;
    }

    let mut branch = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;
    while level.len() > 1 {
        let sibling_position = position ^ 1;
        let sibling = level.get(sibling_position).copied().unwrap_or(level[position]);
        branch.push(MerkleStep {
            sibling,
            sibling_is_left: position % 2 == 1,
        });
        level = next_level(&level);
        position /= 2;
    }
    Some(branch)
}

/// Fold a branch from `leaf` and compare against `root`
pub fn verify_merkle_branch(leaf: Hash, branch: &[MerkleStep], root: Hash) -> bool {
    let computed = branch.iter().fold(leaf, |hash, step| {
        if step.sibling_is_left {
            hash_pair(&step.sibling, &hash)
        } else {
            hash_pair(&hash, &step.sibling)
        }
    });
    computed == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_with_lock_time(lock_time: u32) -> Transaction {
        Transaction::new(
            1,
            vec![],
            vec![TxOutput { amount: 1, script_pubkey: vec![] }],
            lock_time,
        )
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(compute_merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let tx = tx_with_lock_time(1);
        assert_eq!(compute_merkle_root(std::slice::from_ref(&tx)), tx.txid());
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let txs: Vec<Transaction> = (0..3).map(tx_with_lock_time).collect();
        let ids: Vec<Hash> = txs.iter().map(Transaction::txid).collect();
        let left = hash_pair(&ids[0], &ids[1]);
        let right = hash_pair(&ids[2], &ids[2]);
        assert_eq!(compute_merkle_root(&txs), hash_pair(&left, &right));
    }

    #[test]
    fn test_order_matters() {
        let a = tx_with_lock_time(1);
        let b = tx_with_lock_time(2);
        assert_ne!(
            compute_merkle_root(&[a.clone(), b.clone()]),
            compute_merkle_root(&[b, a])
        );
    }

    #[test]
    fn test_branches_verify_for_every_leaf() {
        let leaves: Vec<Hash> = (0..5u8).map(|i| [i; 32]).collect();
        let root = compute_merkle_root_from_hashes(&leaves);
        for (i, leaf) in leaves.iter().enumerate() {
            let branch = merkle_branch(&leaves, i).unwrap();
            assert!(verify_merkle_branch(*leaf, &branch, root));
            assert!(!verify_merkle_branch([0xee; 32], &branch, root));
        }
        assert!(merkle_branch(&leaves, 5).is_none());
    }
}
