//! Merkle tree construction and inclusion proofs over record hashes.
//!
//! Trees are built bottom-up over Blake3 leaf hashes. Odd levels duplicate
//! their last node, so every internal node has exactly two children and
//! proof verification is a simple index-parity walk.

use crate::crypto::ContentHash;
use crate::error::CoreError;

/// Compute the Merkle root of a list of leaf hashes.
///
/// The empty list has the defined root [`ContentHash::empty`]; a single
/// leaf is its own root.
pub fn merkle_root(leaves: &[ContentHash]) -> ContentHash {
    if leaves.is_empty() {
        return ContentHash::empty();
    }

    let mut level: Vec<ContentHash> = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Build the inclusion proof for the leaf at `index`.
///
/// The proof is the list of sibling hashes from the leaf level up to the
/// root, suitable for [`verify_merkle_proof`].
pub fn merkle_proof(leaves: &[ContentHash], index: usize) -> Result<Vec<ContentHash>, CoreError> {
    if index >= leaves.len() {
        return Err(CoreError::ProofIndexOutOfBounds {
            index,
            leaves: leaves.len(),
        });
    }

    let mut proof = Vec::new();
    let mut level: Vec<ContentHash> = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        let sibling_idx = idx ^ 1;
        // Last node of an odd level pairs with itself.
        let sibling = if sibling_idx < level.len() {
            level[sibling_idx]
        } else {
            level[idx]
        };
        proof.push(sibling);

        level = next_level(&level);
        idx /= 2;
    }

    Ok(proof)
}

/// Verify an inclusion proof: walk the sibling path from `leaf` at `index`
/// and compare the reconstructed root against `root`.
pub fn verify_merkle_proof(
    root: &ContentHash,
    leaf: &ContentHash,
    proof: &[ContentHash],
    index: usize,
) -> bool {
    let mut current = *leaf;
    let mut idx = index;

    for sibling in proof {
        current = if idx % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        idx /= 2;
    }

    current == *root
}

fn next_level(level: &[ContentHash]) -> Vec<ContentHash> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        next.push(hash_pair(left, right));
    }
    next
}

fn hash_pair(left: &ContentHash, right: &ContentHash) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    ContentHash(*hasher.finalize().as_bytes())
}
