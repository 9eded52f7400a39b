//! Merkle state root construction (spec §4.5).
//!
//! The root must be independent of how the tree happens to be built,
//! so every internal node hashes `(min(a, b), max(a, b))`
//! lexicographically instead of by position. Leaves are pre-hashed
//! (`sha256(sha256(item) || owner)`) and are not re-hashed at the top
//! of the tree.

use sha2::{Digest, Sha256};
use tessera_types::{ItemId, WalletId};
use std::collections::BTreeMap;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hash_pair(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo);
    hasher.update(hi);
    hasher.finalize().into()
}

/// One leaf per `(item, owner)`, deterministically ordered by item id.
pub fn leaf(item: &ItemId, owner: &WalletId) -> [u8; 32] {
    let item_hash = sha256(item.0.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(item_hash);
    hasher.update(owner.as_bytes());
    hasher.finalize().into()
}

/// Build the ordered leaf set for a `final_owners` map: sorted by item
/// identifier lexicographically — a `BTreeMap` already iterates in
/// that order.
pub fn leaves(final_owners: &BTreeMap<ItemId, WalletId>) -> Vec<[u8; 32]> {
    final_owners.iter().map(|(item, owner)| leaf(item, owner)).collect()
}

/// The Merkle root over `leaves`. Empty input yields 32 zero bytes.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for pair in layer.chunks(2) {
            let a = pair[0];
            let b = pair.get(1).copied().unwrap_or(a);
            next.push(hash_pair(a, b));
        }
        layer = next;
    }
    layer[0]
}

/// A Merkle inclusion proof: a list of `(sibling_hash)` pairs combined
/// with `hash_pair` (order-independent, so there's no left/right flag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof(pub Vec<[u8; 32]>);

pub fn merkle_proof(leaves: &[[u8; 32]], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }
    let mut proof = Vec::new();
    let mut layer = leaves.to_vec();
    let mut idx = index;
    while layer.len() > 1 {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        let sibling = layer.get(sibling_idx).copied().unwrap_or(layer[idx]);
        proof.push(sibling);

        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for pair in layer.chunks(2) {
            let a = pair[0];
            let b = pair.get(1).copied().unwrap_or(a);
            next.push(hash_pair(a, b));
        }
        layer = next;
        idx /= 2;
    }
    Some(MerkleProof(proof))
}

pub fn verify_merkle_proof(leaf: [u8; 32], proof: &MerkleProof, root: [u8; 32]) -> bool {
    let mut current = leaf;
    for sibling in &proof.0 {
        current = hash_pair(current, *sibling);
    }
    current == root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_leaf_set_is_zero_root() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = sha256(b"only");
        assert_eq!(merkle_root(&[l]), l);
    }

    #[test]
    fn root_is_independent_of_pairing_order() {
        let a = sha256(b"a");
        let b = sha256(b"b");
        assert_eq!(hash_pair(a, b), hash_pair(b, a));
    }

    #[test]
    fn odd_length_layer_duplicates_last_node() {
        let leaves = vec![sha256(b"a"), sha256(b"b"), sha256(b"c")];
        let expected_last_pair = hash_pair(leaves[2], leaves[2]);
        let first_pair = hash_pair(leaves[0], leaves[1]);
        let expected_root = hash_pair(first_pair, expected_last_pair);
        assert_eq!(merkle_root(&leaves), expected_root);
    }

    #[test]
    fn proof_round_trips() {
        let leaves: Vec<[u8; 32]> = (0u8..5).map(|i| sha256(&[i])).collect();
        let root = merkle_root(&leaves);
        for (i, l) in leaves.iter().enumerate() {
            let proof = merkle_proof(&leaves, i).unwrap();
            assert!(verify_merkle_proof(*l, &proof, root));
        }
    }

    #[test]
    fn proof_rejects_wrong_leaf() {
        let leaves: Vec<[u8; 32]> = (0u8..4).map(|i| sha256(&[i])).collect();
        let root = merkle_root(&leaves);
        let proof = merkle_proof(&leaves, 0).unwrap();
        assert!(!verify_merkle_proof(sha256(b"wrong"), &proof, root));
    }
}
