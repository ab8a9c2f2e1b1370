//! Merkle proofs over pool-backed trees.
//!
//! Single-leaf branches follow the consensus-spec `is_valid_merkle_branch`
//! ordering (sibling hashes from the leaf up). Multiproofs carry the
//! deduplicated helper nodes in descending-gindex order; witnesses shared
//! between targets appear once.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::hashing::hash_two;
use crate::pool::{NodeId, NodePool};

/// Sibling hashes on the path from `gindex` up to `root`, leaf-first.
pub fn prove(pool: &mut NodePool, root: NodeId, gindex: Gindex) -> Result<Vec<[u8; 32]>, TreeError> {
    let depth = gindex.depth();
    let mut branch = Vec::with_capacity(depth);
    let mut g = gindex;
    for _ in 0..depth {
        let sibling = pool.get_node(root, g.sibling())?;
        branch.push(pool.get_root(sibling)?);
        g = g.parent();
    }
    Ok(branch)
}

/// Check a single-leaf branch against an expected root.
pub fn verify_single(
    root: &[u8; 32],
    leaf: &[u8; 32],
    gindex: Gindex,
    branch: &[[u8; 32]],
) -> Result<(), TreeError> {
    if branch.len() != gindex.depth() {
        return Err(TreeError::InvalidProofInput("branch length != gindex depth"));
    }
    let index = gindex.index_at_depth();
    let mut value = *leaf;
    for (height, sibling) in branch.iter().enumerate() {
        value = if (index >> height) & 1 == 1 {
            hash_two(sibling, &value)
        } else {
            hash_two(&value, sibling)
        };
    }
    if &value == root {
        Ok(())
    } else {
        Err(TreeError::ProofMismatch)
    }
}

/// Helper nodes proving all of `gindices` at once, descending gindex order.
/// Input must be sorted ascending, unique, and contain no ancestor pairs.
pub fn prove_multi(
    pool: &mut NodePool,
    root: NodeId,
    gindices: &[Gindex],
) -> Result<Vec<[u8; 32]>, TreeError> {
    check_multi_targets(gindices)?;
    let mut frontier: BTreeSet<u64> = gindices.iter().map(|g| g.0).collect();
    let mut helpers = Vec::new();
    while let Some(&g) = frontier.iter().next_back() {
        if g == 1 {
            break;
        }
        frontier.remove(&g);
        let sibling = g ^ 1;
        if !frontier.remove(&sibling) {
            let node = pool.get_node(root, Gindex(sibling))?;
            helpers.push(pool.get_root(node)?);
        }
        frontier.insert(g >> 1);
    }
    Ok(helpers)
}

/// Reconstruct the root from target leaves plus the helper stream produced
/// by [`prove_multi`] and compare it to `root`.
pub fn verify_multi(
    root: &[u8; 32],
    gindices: &[Gindex],
    leaves: &[[u8; 32]],
    helpers: &[[u8; 32]],
) -> Result<(), TreeError> {
    check_multi_targets(gindices)?;
    if gindices.len() != leaves.len() {
        return Err(TreeError::InvalidProofInput("leaf count != gindex count"));
    }
    let mut known: BTreeMap<u64, [u8; 32]> = gindices
        .iter()
        .zip(leaves)
        .map(|(g, leaf)| (g.0, *leaf))
        .collect();
    let mut helper_stream = helpers.iter();
    while let Some((&g, &value)) = known.iter().next_back() {
        if g == 1 {
            break;
        }
        known.remove(&g);
        let sibling_value = match known.remove(&(g ^ 1)) {
            Some(v) => v,
            None => *helper_stream
                .next()
                .ok_or(TreeError::InvalidProofInput("helper stream exhausted"))?,
        };
        let parent = if g & 1 == 1 {
            hash_two(&sibling_value, &value)
        } else {
            hash_two(&value, &sibling_value)
        };
        known.insert(g >> 1, parent);
    }
    if helper_stream.next().is_some() {
        return Err(TreeError::InvalidProofInput("unused helper nodes"));
    }
    match known.get(&1) {
        Some(computed) if computed == root => Ok(()),
        _ => Err(TreeError::ProofMismatch),
    }
}

fn check_multi_targets(gindices: &[Gindex]) -> Result<(), TreeError> {
    if gindices.is_empty() {
        return Err(TreeError::InvalidProofInput("no target gindices"));
    }
    for window in gindices.windows(2) {
        if window[0] >= window[1] {
            return Err(TreeError::InvalidProofInput("gindices must be sorted and unique"));
        }
    }
    for a in gindices {
        for b in gindices {
            if a != b {
                let (shallow, deep) = if a.depth() <= b.depth() { (a, b) } else { (b, a) };
                if deep.0 >> (deep.depth() - shallow.depth()) == shallow.0 {
                    return Err(TreeError::InvalidProofInput("gindices must not overlap"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn build_tree(pool: &mut NodePool, leaves: &[[u8; 32]], depth: usize) -> NodeId {
        let ids: Vec<NodeId> = leaves.iter().map(|l| pool.create_leaf(l)).collect();
        pool.fill_with_contents(&ids, depth).unwrap()
    }

    #[test]
    fn single_leaf_round_trip() {
        let mut pool = NodePool::new();
        let leaves: Vec<[u8; 32]> = (0..8u8).map(|i| [i; 32]).collect();
        let root_id = build_tree(&mut pool, &leaves, 3);
        let root = pool.get_root(root_id).unwrap();

        for index in 0..8u64 {
            let g = Gindex::from_depth(3, index);
            let branch = prove(&mut pool, root_id, g).unwrap();
            verify_single(&root, &leaves[index as usize], g, &branch).unwrap();
        }
    }

    #[test]
    fn single_leaf_rejects_wrong_leaf() {
        let mut pool = NodePool::new();
        let leaves: Vec<[u8; 32]> = (0..4u8).map(|i| [i; 32]).collect();
        let root_id = build_tree(&mut pool, &leaves, 2);
        let root = pool.get_root(root_id).unwrap();
        let g = Gindex::from_depth(2, 1);
        let branch = prove(&mut pool, root_id, g).unwrap();
        assert_eq!(
            verify_single(&root, &[9u8; 32], g, &branch),
            Err(TreeError::ProofMismatch)
        );
    }

    #[test]
    fn multiproof_round_trip() {
        let mut pool = NodePool::new();
        let leaves: Vec<[u8; 32]> = (0..16u8).map(|i| [i; 32]).collect();
        let root_id = build_tree(&mut pool, &leaves, 4);
        let root = pool.get_root(root_id).unwrap();

        for targets in [vec![0u64], vec![0, 1], vec![3, 7, 12], vec![0, 5, 6, 15]] {
            let gindices: Vec<Gindex> =
                targets.iter().map(|i| Gindex::from_depth(4, *i)).collect();
            let target_leaves: Vec<[u8; 32]> =
                targets.iter().map(|i| leaves[*i as usize]).collect();
            let helpers = prove_multi(&mut pool, root_id, &gindices).unwrap();
            verify_multi(&root, &gindices, &target_leaves, &helpers).unwrap();
        }
    }

    #[test]
    fn multiproof_detects_tampering() {
        let mut pool = NodePool::new();
        let leaves: Vec<[u8; 32]> = (0..8u8).map(|i| [i; 32]).collect();
        let root_id = build_tree(&mut pool, &leaves, 3);
        let root = pool.get_root(root_id).unwrap();

        let gindices = [Gindex::from_depth(3, 1), Gindex::from_depth(3, 6)];
        let helpers = prove_multi(&mut pool, root_id, &gindices).unwrap();
        let tampered = [[1u8; 32], [99u8; 32]];
        assert_eq!(
            verify_multi(&root, &gindices, &tampered, &helpers),
            Err(TreeError::ProofMismatch)
        );
    }

    #[test]
    fn multiproof_rejects_overlapping_targets() {
        let gindices = [Gindex(2), Gindex(4)];
        assert!(matches!(
            verify_multi(&[0u8; 32], &gindices, &[[0u8; 32]; 2], &[]),
            Err(TreeError::InvalidProofInput(_))
        ));
    }
}
