//! Merkle tree construction with sorted-pair hashing.
//!
//! Used for bulk-signed order batches and token-list token sets. Every pair
//! is sorted before concatenation so that proofs do not need direction flags
//! and so that the classic leaf-duplication forgery does not apply. Odd nodes
//! are carried up a level unchanged instead of being paired with themselves.

use web3::signing;

pub type Hash = [u8; 32];

fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let mut buffer = [0u8; 64];
    if a <= b {
        buffer[..32].copy_from_slice(a);
        buffer[32..].copy_from_slice(b);
    } else {
        buffer[..32].copy_from_slice(b);
        buffer[32..].copy_from_slice(a);
    }
    signing::keccak256(&buffer)
}

/// Computes the root over the given leaves. The root of a single leaf is the
/// leaf itself; the root of an empty sequence is all zeros.
pub fn root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => hash_pair(a, b),
                [a] => *a,
                _ => unreachable!(),
            })
            .collect();
    }
    level[0]
}

/// Computes the proof for the leaf at `index`, or `None` if out of bounds.
pub fn proof(leaves: &[Hash], index: usize) -> Option<Vec<Hash>> {
    if index >= leaves.len() {
        return None;
    }
    let mut proof = Vec::new();
    let mut level = leaves.to_vec();
    let mut index = index;
    while level.len() > 1 {
        let sibling = index ^ 1;
        if sibling < level.len() {
            proof.push(level[sibling]);
        }
        index /= 2;
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => hash_pair(a, b),
                [a] => *a,
                _ => unreachable!(),
            })
            .collect();
    }
    Some(proof)
}

/// Folds a leaf up through its proof to the implied root.
pub fn root_from_proof(leaf: &Hash, proof: &[Hash]) -> Hash {
    proof
        .iter()
        .fold(*leaf, |node, sibling| hash_pair(&node, sibling))
}

/// Checks that `leaf` is committed to by `root` via `proof`.
pub fn verify(root: &Hash, leaf: &Hash, proof: &[Hash]) -> bool {
    root_from_proof(leaf, proof) == *root
}
