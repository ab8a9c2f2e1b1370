use ethereum_hashing::hash32_concat;
use lazy_static::lazy_static;

/// Deep enough for every SSZ type this engine stores; the validator registry
/// (limit 2^40) plus its length mixin is the deepest subtree at depth 41.
pub const MAX_DEPTH: usize = 64;

lazy_static! {
    /// `zero[0] = [0; 32]`, `zero[d] = hash_two(zero[d-1], zero[d-1])`.
    static ref ZERO_HASHES: Vec<[u8; 32]> = {
        let mut hashes = vec![[0u8; 32]; MAX_DEPTH + 1];
        for depth in 1..=MAX_DEPTH {
            hashes[depth] = hash32_concat(&hashes[depth - 1], &hashes[depth - 1]);
        }
        hashes
    };
}

#[inline]
pub fn hash_two(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    hash32_concat(left, right)
}

/// Root of an all-zero subtree of the given depth.
#[inline]
pub fn zero_hash(depth: usize) -> &'static [u8; 32] {
    &ZERO_HASHES[depth]
}

/// Merkleize `leaves` bottom-up to the requested depth, padding with
/// zero-subtrees. `leaves.len()` must not exceed `1 << depth`.
pub fn merkleize_leaves(leaves: &[[u8; 32]], depth: usize) -> [u8; 32] {
    if leaves.is_empty() {
        return *zero_hash(depth);
    }
    let mut layer: Vec<[u8; 32]> = leaves.to_vec();
    for level in 0..depth {
        let parent_count = layer.len().div_ceil(2);
        let mut parents = Vec::with_capacity(parent_count);
        for pair in 0..parent_count {
            let left = &layer[2 * pair];
            let right = if 2 * pair + 1 < layer.len() {
                &layer[2 * pair + 1]
            } else {
                zero_hash(level)
            };
            parents.push(hash_two(left, right));
        }
        layer = parents;
    }
    debug_assert_eq!(layer.len(), 1);
    layer[0]
}

/// Mix a length into a root: `hash_two(root, le64(length) padded to 32)`.
pub fn mix_in_length(root: &[u8; 32], length: usize) -> [u8; 32] {
    let mut length_chunk = [0u8; 32];
    length_chunk[..8].copy_from_slice(&(length as u64).to_le_bytes());
    hash_two(root, &length_chunk)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_hashes_chain() {
        assert_eq!(zero_hash(0), &[0u8; 32]);
        for depth in 1..=8 {
            assert_eq!(
                *zero_hash(depth),
                hash_two(zero_hash(depth - 1), zero_hash(depth - 1))
            );
        }
    }

    #[test]
    fn merkleize_pads_with_zero_subtrees() {
        let leaf = [7u8; 32];
        let expected = hash_two(&hash_two(&leaf, zero_hash(0)), zero_hash(1));
        assert_eq!(merkleize_leaves(&[leaf], 2), expected);
    }

    #[test]
    fn merkleize_empty_is_zero_subtree() {
        assert_eq!(merkleize_leaves(&[], 5), *zero_hash(5));
    }

    #[test]
    fn mix_in_length_matches_manual() {
        let root = [3u8; 32];
        let mut chunk = [0u8; 32];
        chunk[..8].copy_from_slice(&42u64.to_le_bytes());
        assert_eq!(mix_in_length(&root, 42), hash_two(&root, &chunk));
    }
}
