//! Binary Keccak merkle tree used to commit to the validator list.
//!
//! Leaves are padded with zero hashes up to the next power of two and each
//! parent is `keccak256(left || right)`. An empty tree has the zero root and
//! a single leaf is its own root.

use crate::{keccak256_concat, H256};

fn hash_pair(left: &H256, right: &H256) -> H256 {
    keccak256_concat(&[left.as_bytes(), right.as_bytes()])
}

fn padded(leaves: &[H256]) -> Vec<H256> {
    let width = leaves.len().next_power_of_two();
    let mut layer = Vec::with_capacity(width);
    layer.extend_from_slice(leaves);
    layer.resize(width, H256::zero());
    layer
}

fn next_layer(layer: &[H256]) -> Vec<H256> {
    layer
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect()
}

/// Root of the tree built over `leaves` in the given order.
pub fn merkle_root(leaves: &[H256]) -> H256 {
    if leaves.is_empty() {
        return H256::zero();
    }

    let mut layer = padded(leaves);
    while layer.len() > 1 {
        layer = next_layer(&layer);
    }
    layer[0]
}

/// Sibling path from leaf `index` to the root, or `None` when out of range.
pub fn merkle_proof(leaves: &[H256], index: usize) -> Option<Vec<H256>> {
    if index >= leaves.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut layer = padded(leaves);
    let mut position = index;
    while layer.len() > 1 {
        proof.push(layer[position ^ 1]);
        layer = next_layer(&layer);
        position /= 2;
    }
    Some(proof)
}

pub fn verify_merkle_proof(leaf: H256, index: usize, proof: &[H256], root: H256) -> bool {
    let mut node = leaf;
    let mut position = index;
    for sibling in proof {
        node = if position % 2 == 0 {
            hash_pair(&node, sibling)
        } else {
            hash_pair(sibling, &node)
        };
        position /= 2;
    }
    position == 0 && node == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keccak256;

    fn leaves(n: u8) -> Vec<H256> {
        (0..n).map(|i| keccak256(&[i])).collect()
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(merkle_root(&[]), H256::zero());
        let one = leaves(1);
        assert_eq!(merkle_root(&one), one[0]);
    }

    #[test]
    fn test_odd_count_is_zero_padded() {
        let l = leaves(3);
        let left = hash_pair(&l[0], &l[1]);
        let right = hash_pair(&l[2], &H256::zero());
        assert_eq!(merkle_root(&l), hash_pair(&left, &right));
    }

    #[test]
    fn test_proofs_verify() {
        let l = leaves(5);
        let root = merkle_root(&l);
        for (i, leaf) in l.iter().enumerate() {
            let proof = merkle_proof(&l, i).unwrap();
            assert_eq!(proof.len(), 3);
            assert!(verify_merkle_proof(*leaf, i, &proof, root));
            assert!(!verify_merkle_proof(*leaf, (i + 1) % 5, &proof, root));
        }
        assert!(merkle_proof(&l, 5).is_none());
    }
}
