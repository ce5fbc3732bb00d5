//! Transfer root construction.
//!
//! Mirrors the bridge contract's tree: leaves are the transfer ids in commit
//! order, each level hashes adjacent pairs with `keccak256(left ‖ right)`, and
//! an odd trailing node is promoted to the next level unchanged. Nothing is
//! sorted and leaves are not re-hashed.
//!
//! The duplicate-odd variant (`keccak256(node ‖ node)`) exists for trees
//! built that way; the commit path never uses it.

use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OddLeafPolicy {
    /// Carry the odd node up unchanged.
    #[default]
    Promote,
    /// Pair the odd node with itself.
    Duplicate,
}

/// Which side a sibling sits on relative to the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub side: Side,
    pub hash: B256,
}

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub leaf: B256,
    pub index: usize,
    pub siblings: Vec<ProofNode>,
}

impl MerkleProof {
    /// Recompute the root from the leaf and sibling path and compare.
    pub fn verify(&self, root: B256) -> bool {
        let computed = self.siblings.iter().fold(self.leaf, |acc, node| match node.side {
            Side::Left => hash_pair(&node.hash, &acc),
            Side::Right => hash_pair(&acc, &node.hash),
        });
        computed == root
    }

    /// Sibling hashes only, in the order a contract verifier consumes them.
    pub fn hashes(&self) -> Vec<B256> {
        self.siblings.iter().map(|n| n.hash).collect()
    }
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<B256>>,
    policy: OddLeafPolicy,
}

impl MerkleTree {
    pub fn new(leaves: Vec<B256>) -> Self {
        Self::with_policy(leaves, OddLeafPolicy::Promote)
    }

    pub fn with_policy(leaves: Vec<B256>, policy: OddLeafPolicy) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let next = levels
                .last()
                .map(|level| next_level(level, policy))
                .unwrap_or_default();
            levels.push(next);
        }
        Self { levels, policy }
    }

    pub fn leaves(&self) -> &[B256] {
        &self.levels[0]
    }

    pub fn policy(&self) -> OddLeafPolicy {
        self.policy
    }

    /// Tree root. A single leaf is its own root; an empty tree yields zero.
    pub fn root(&self) -> B256 {
        self.levels
            .last()
            .and_then(|level| level.first().copied())
            .unwrap_or(B256::ZERO)
    }

    /// Proof for `leaf`. `index` disambiguates duplicate leaves; without it the
    /// first occurrence is used.
    pub fn proof(&self, leaf: B256, index: Option<usize>) -> Option<MerkleProof> {
        let leaves = self.leaves();
        let index = match index {
            Some(i) if leaves.get(i) == Some(&leaf) => i,
            Some(_) => return None,
            None => leaves.iter().position(|l| *l == leaf)?,
        };

        let mut siblings = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = position % 2 == 1;
            if is_right {
                siblings.push(ProofNode {
                    side: Side::Left,
                    hash: level[position - 1],
                });
            } else if let Some(right) = level.get(position + 1) {
                siblings.push(ProofNode {
                    side: Side::Right,
                    hash: *right,
                });
            } else if self.policy == OddLeafPolicy::Duplicate {
                siblings.push(ProofNode {
                    side: Side::Right,
                    hash: level[position],
                });
            }
            position /= 2;
        }

        Some(MerkleProof { leaf, index, siblings })
    }
}

/// Root of `leaves` under the contract's construction.
pub fn compute_root(leaves: &[B256]) -> B256 {
    MerkleTree::new(leaves.to_vec()).root()
}

fn hash_pair(left: &B256, right: &B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}

fn next_level(level: &[B256], policy: OddLeafPolicy) -> Vec<B256> {
    level
        .chunks(2)
        .map(|pair| match (pair, policy) {
            ([left, right], _) => hash_pair(left, right),
            ([odd], OddLeafPolicy::Promote) => *odd,
            ([odd], OddLeafPolicy::Duplicate) => hash_pair(odd, odd),
            _ => B256::ZERO,
        })
        .collect()
}
