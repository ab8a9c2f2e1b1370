use std::collections::BTreeMap;

use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::pool::{NodeId, NodePool};
use crate::view::ViewCore;

/// Bits per 32-byte chunk.
const BITS_PER_CHUNK: u64 = 256;

/// View over a packed bit array: 256 bits per leaf, little-endian byte
/// order within the chunk, LSB-first within each byte.
///
/// The array length is not tracked here — callers pass it per operation, so
/// the same view type serves both bit vectors and the data subtree of bit
/// lists (whose length mixin lives with the owning list).
#[derive(Debug)]
pub struct BitArrayView {
    core: ViewCore,
    depth: usize,
    dirty_chunks: BTreeMap<u64, [u8; 32]>,
    chunk_cache: BTreeMap<u64, [u8; 32]>,
}

impl BitArrayView {
    /// Takes ownership of one reference on `root`; `depth` is the chunk
    /// subtree depth implied by the type's bit capacity.
    pub fn new(root: NodeId, depth: usize) -> Self {
        BitArrayView {
            core: ViewCore::new(root),
            depth,
            dirty_chunks: BTreeMap::new(),
            chunk_cache: BTreeMap::new(),
        }
    }

    /// Build a view from bools, padding the tail of the last chunk with
    /// zero bits.
    pub fn from_bools(pool: &mut NodePool, bits: &[bool], depth: usize) -> Result<Self, TreeError> {
        let chunk_count = (bits.len() as u64).div_ceil(BITS_PER_CHUNK) as usize;
        let mut chunks = vec![[0u8; 32]; chunk_count];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                chunks[i / 256][(i % 256) / 8] |= 1 << (i % 8);
            }
        }
        let leaves: Vec<NodeId> = chunks.iter().map(|c| pool.create_leaf(c)).collect();
        let root = pool.fill_with_contents(&leaves, depth)?;
        Ok(Self::new(root, depth))
    }

    pub fn root(&self) -> NodeId {
        self.core.root
    }

    fn load_chunk(&mut self, pool: &NodePool, chunk: u64) -> Result<[u8; 32], TreeError> {
        if let Some(bytes) = self.dirty_chunks.get(&chunk) {
            return Ok(*bytes);
        }
        if let Some(bytes) = self.chunk_cache.get(&chunk) {
            return Ok(*bytes);
        }
        let node = pool.get_node(self.core.root, Gindex::from_depth(self.depth, chunk))?;
        let bytes = pool.get_leaf(node)?;
        self.chunk_cache.insert(chunk, bytes);
        Ok(bytes)
    }

    pub fn get(&mut self, pool: &NodePool, index: u64, length: u64) -> Result<bool, TreeError> {
        if index >= length {
            return Err(TreeError::IndexOutOfBounds { index, length });
        }
        let chunk = self.load_chunk(pool, index / BITS_PER_CHUNK)?;
        let bit = index % BITS_PER_CHUNK;
        Ok(chunk[(bit / 8) as usize] >> (bit % 8) & 1 == 1)
    }

    pub fn set(
        &mut self,
        pool: &NodePool,
        index: u64,
        value: bool,
        length: u64,
    ) -> Result<(), TreeError> {
        if index >= length {
            return Err(TreeError::IndexOutOfBounds { index, length });
        }
        let chunk_index = index / BITS_PER_CHUNK;
        let mut chunk = self.load_chunk(pool, chunk_index)?;
        let bit = index % BITS_PER_CHUNK;
        let mask = 1u8 << (bit % 8);
        if value {
            chunk[(bit / 8) as usize] |= mask;
        } else {
            chunk[(bit / 8) as usize] &= !mask;
        }
        self.chunk_cache.remove(&chunk_index);
        self.dirty_chunks.insert(chunk_index, chunk);
        Ok(())
    }

    pub fn fill_bools(&mut self, pool: &NodePool, out: &mut [bool], length: u64) -> Result<(), TreeError> {
        if out.len() as u64 != length {
            return Err(TreeError::IndexOutOfBounds { index: out.len() as u64, length });
        }
        let mut chunk = [0u8; 32];
        for (index, slot) in out.iter_mut().enumerate() {
            let index = index as u64;
            if index % BITS_PER_CHUNK == 0 {
                chunk = self.load_chunk(pool, index / BITS_PER_CHUNK)?;
            }
            let bit = index % BITS_PER_CHUNK;
            *slot = chunk[(bit / 8) as usize] >> (bit % 8) & 1 == 1;
        }
        Ok(())
    }

    pub fn commit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        for (chunk_index, bytes) in std::mem::take(&mut self.dirty_chunks) {
            let leaf = pool.create_leaf(&bytes);
            self.core.stage(pool, Gindex::from_depth(self.depth, chunk_index), leaf)?;
            self.chunk_cache.insert(chunk_index, bytes);
        }
        self.core.commit(pool)
    }

    pub fn hash_tree_root(&mut self, pool: &mut NodePool) -> Result<[u8; 32], TreeError> {
        self.commit(pool)?;
        pool.get_root(self.core.root)
    }

    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        self.dirty_chunks.clear();
        self.chunk_cache.clear();
        self.core.deinit(pool)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bit_layout_is_lsb_first_little_endian() {
        let mut pool = NodePool::new();
        let mut bits = vec![false; 300];
        bits[0] = true;
        bits[9] = true;
        bits[255] = true;
        bits[256] = true;
        let mut view = BitArrayView::from_bools(&mut pool, &bits, 1).unwrap();

        let chunk0 = view.load_chunk(&pool, 0).unwrap();
        assert_eq!(chunk0[0], 0b0000_0001);
        assert_eq!(chunk0[1], 0b0000_0010);
        assert_eq!(chunk0[31], 0b1000_0000);
        let chunk1 = view.load_chunk(&pool, 1).unwrap();
        assert_eq!(chunk1[0], 0b0000_0001);
    }

    #[test]
    fn get_set_fill_round_trip() {
        let mut pool = NodePool::new();
        let length = 300u64;
        let bits = vec![false; length as usize];
        let mut view = BitArrayView::from_bools(&mut pool, &bits, 1).unwrap();

        view.set(&pool, 7, true, length).unwrap();
        view.set(&pool, 256, true, length).unwrap();
        assert!(view.get(&pool, 7, length).unwrap());
        assert!(!view.get(&pool, 8, length).unwrap());
        view.commit(&mut pool).unwrap();

        let mut out = vec![false; length as usize];
        view.fill_bools(&pool, &mut out, length).unwrap();
        let mut expected = vec![false; length as usize];
        expected[7] = true;
        expected[256] = true;
        assert_eq!(out, expected);

        assert_eq!(
            view.get(&pool, 300, length),
            Err(TreeError::IndexOutOfBounds { index: 300, length: 300 })
        );
    }
}
