use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::pool::{NodeId, NodePool};
use crate::view::{ceil_log2, BasicChunked, ViewCore};

/// View over a fixed-length vector of packed basic elements. The root is the
/// chunk subtree itself (vectors carry no length mixin).
#[derive(Debug)]
pub struct BasicVectorView<T: BasicChunked> {
    core: ViewCore,
    length: u64,
    depth: usize,
    /// Chunks modified since the last commit, by chunk index.
    dirty_chunks: BTreeMap<u64, [u8; 32]>,
    /// Clean chunks already read from the tree.
    chunk_cache: BTreeMap<u64, [u8; 32]>,
    prefetched_chunk_count: usize,
    _marker: PhantomData<T>,
}

pub(crate) fn chunk_count_for<T: BasicChunked>(length: u64) -> u64 {
    length.div_ceil(T::per_chunk() as u64)
}

impl<T: BasicChunked> BasicVectorView<T> {
    /// Takes ownership of one reference on `root`.
    pub fn new(root: NodeId, length: u64) -> Self {
        let depth = ceil_log2(chunk_count_for::<T>(length));
        BasicVectorView {
            core: ViewCore::new(root),
            length,
            depth,
            dirty_chunks: BTreeMap::new(),
            chunk_cache: BTreeMap::new(),
            prefetched_chunk_count: 0,
            _marker: PhantomData,
        }
    }

    pub fn root(&self) -> NodeId {
        self.core.root
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    fn check_bounds(&self, index: u64) -> Result<(), TreeError> {
        if index >= self.length {
            return Err(TreeError::IndexOutOfBounds { index, length: self.length });
        }
        Ok(())
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

    /// Bulk-load the first `chunks` chunk leaves so repeated reads do not
    /// re-walk the tree.
    pub fn ensure_chunk_prefetch(&mut self, pool: &NodePool, chunks: usize) -> Result<(), TreeError> {
        if chunks <= self.prefetched_chunk_count {
            return Ok(());
        }
        let mut nodes = vec![NodeId(0); chunks];
        pool.get_nodes_at_depth(self.core.root, self.depth, 0, &mut nodes)?;
        for (chunk, node) in nodes.iter().enumerate() {
            let chunk = chunk as u64;
            if !self.dirty_chunks.contains_key(&chunk) && !self.chunk_cache.contains_key(&chunk) {
                self.chunk_cache.insert(chunk, pool.get_leaf(*node)?);
            }
        }
        self.prefetched_chunk_count = chunks;
        Ok(())
    }

    pub fn get(&mut self, pool: &NodePool, index: u64) -> Result<T, TreeError> {
        self.check_bounds(index)?;
        let per_chunk = T::per_chunk() as u64;
        let chunk = self.load_chunk(pool, index / per_chunk)?;
        Ok(T::read_from_chunk(&chunk, (index % per_chunk) as usize))
    }

    pub fn set(&mut self, pool: &NodePool, index: u64, value: T) -> Result<(), TreeError> {
        self.check_bounds(index)?;
        let per_chunk = T::per_chunk() as u64;
        let chunk_index = index / per_chunk;
        let mut chunk = self.load_chunk(pool, chunk_index)?;
        T::write_to_chunk(&mut chunk, (index % per_chunk) as usize, value);
        self.chunk_cache.remove(&chunk_index);
        self.dirty_chunks.insert(chunk_index, chunk);
        Ok(())
    }

    pub fn get_all(&mut self, pool: &NodePool, out: &mut [T]) -> Result<(), TreeError> {
        if out.len() as u64 != self.length {
            return Err(TreeError::IndexOutOfBounds { index: out.len() as u64, length: self.length });
        }
        let chunk_count = chunk_count_for::<T>(self.length) as usize;
        self.ensure_chunk_prefetch(pool, chunk_count)?;
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = self.get(pool, index as u64)?;
        }
        Ok(())
    }

    pub fn get_all_alloc(&mut self, pool: &NodePool) -> Result<Vec<T>, TreeError> {
        let mut out = vec![T::default(); self.length as usize];
        self.get_all(pool, &mut out)?;
        Ok(out)
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty_chunks.is_empty()
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

/// View over a fixed-length vector of composite elements; children are
/// subtree roots, exchanged by node handle with ownership transfer on `set`.
#[derive(Debug)]
pub struct CompositeVectorView {
    core: ViewCore,
    length: u64,
    depth: usize,
}

impl CompositeVectorView {
    pub fn new(root: NodeId, length: u64) -> Self {
        CompositeVectorView { core: ViewCore::new(root), length, depth: ceil_log2(length) }
    }

    pub fn root(&self) -> NodeId {
        self.core.root
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    fn check_bounds(&self, index: u64) -> Result<(), TreeError> {
        if index >= self.length {
            return Err(TreeError::IndexOutOfBounds { index, length: self.length });
        }
        Ok(())
    }

    /// Borrowed peek at the element subtree.
    pub fn get(&self, pool: &NodePool, index: u64) -> Result<NodeId, TreeError> {
        self.check_bounds(index)?;
        self.core.node_at(pool, Gindex::from_depth(self.depth, index))
    }

    /// Element subtree with an owned reference; pair with a later `set`.
    pub fn take(&self, pool: &mut NodePool, index: u64) -> Result<NodeId, TreeError> {
        let node = self.get(pool, index)?;
        pool.ref_node(node)?;
        Ok(node)
    }

    /// Stage a replacement element; ownership of `node` transfers in.
    pub fn set(&mut self, pool: &mut NodePool, index: u64, node: NodeId) -> Result<(), TreeError> {
        self.check_bounds(index)?;
        self.core.stage(pool, Gindex::from_depth(self.depth, index), node)
    }

    pub fn commit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        self.core.commit(pool)
    }

    pub fn hash_tree_root(&mut self, pool: &mut NodePool) -> Result<[u8; 32], TreeError> {
        self.commit(pool)?;
        pool.get_root(self.core.root)
    }

    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        self.core.deinit(pool)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hashing::merkleize_leaves;

    fn vector_of_u64(pool: &mut NodePool, values: &[u64]) -> BasicVectorView<u64> {
        let mut chunks = vec![[0u8; 32]; chunk_count_for::<u64>(values.len() as u64) as usize];
        for (i, v) in values.iter().enumerate() {
            u64::write_to_chunk(&mut chunks[i / 4], i % 4, *v);
        }
        let leaves: Vec<NodeId> = chunks.iter().map(|c| pool.create_leaf(c)).collect();
        let depth = ceil_log2(chunks.len() as u64);
        let root = pool.fill_with_contents(&leaves, depth).unwrap();
        BasicVectorView::new(root, values.len() as u64)
    }

    #[test]
    fn get_reads_packed_values() {
        let mut pool = NodePool::new();
        let values: Vec<u64> = (0..10).map(|i| i * 1000).collect();
        let mut view = vector_of_u64(&mut pool, &values);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(view.get(&pool, i as u64).unwrap(), *v);
        }
        assert_eq!(view.get_all_alloc(&pool).unwrap(), values);
        assert_eq!(
            view.get(&pool, 10),
            Err(TreeError::IndexOutOfBounds { index: 10, length: 10 })
        );
    }

    #[test]
    fn set_and_commit_recomputes_root() {
        let mut pool = NodePool::new();
        let values: Vec<u64> = (0..10).collect();
        let mut view = vector_of_u64(&mut pool, &values);

        view.set(&pool, 3, 99).unwrap();
        view.set(&pool, 7, 123).unwrap();
        let root = view.hash_tree_root(&mut pool).unwrap();

        let mut expected_values = values.clone();
        expected_values[3] = 99;
        expected_values[7] = 123;
        let mut chunks = vec![[0u8; 32]; 3];
        for (i, v) in expected_values.iter().enumerate() {
            u64::write_to_chunk(&mut chunks[i / 4], i % 4, *v);
        }
        assert_eq!(root, merkleize_leaves(&chunks, 2));
        // Reads after commit observe the written values.
        assert_eq!(view.get(&pool, 3).unwrap(), 99);
    }

    #[test]
    fn prefetch_then_mutate_keeps_reads_consistent() {
        let mut pool = NodePool::new();
        let values: Vec<u64> = (0..16).collect();
        let mut view = vector_of_u64(&mut pool, &values);
        view.ensure_chunk_prefetch(&pool, 4).unwrap();
        view.set(&pool, 0, 7).unwrap();
        assert_eq!(view.get(&pool, 0).unwrap(), 7);
        assert_eq!(view.get(&pool, 1).unwrap(), 1);
    }

    #[test]
    fn composite_vector_set_transfers_ownership() {
        let mut pool = NodePool::new();
        let elements: Vec<NodeId> = (0..4u8)
            .map(|i| {
                let left = pool.create_leaf(&[i; 32]);
                let right = pool.create_leaf(&[0xFF; 32]);
                pool.create_branch(left, right)
            })
            .collect();
        let depth = ceil_log2(elements.len() as u64);
        let root = pool.fill_with_contents(&elements, depth).unwrap();
        let mut view = CompositeVectorView::new(root, 4);
        let before = view.hash_tree_root(&mut pool).unwrap();

        let taken = view.take(&mut pool, 2).unwrap();
        let taken_root = pool.get_root(taken).unwrap();
        pool.unref_node(taken).unwrap();

        let left = pool.create_leaf(&[0xAB; 32]);
        let right = pool.create_leaf(&[0xFF; 32]);
        let replacement = pool.create_branch(left, right);
        view.set(&mut pool, 2, replacement).unwrap();
        let after = view.hash_tree_root(&mut pool).unwrap();

        assert_ne!(before, after);
        assert_ne!(pool.get_root(view.get(&pool, 2).unwrap()).unwrap(), taken_root);
        assert!(matches!(
            view.get(&pool, 4),
            Err(TreeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn deinit_releases_all_nodes() {
        let mut pool = NodePool::new();
        // Zero nodes are interned on first use; warm them up so the
        // baseline is stable.
        pool.zero_node(2).unwrap();
        let baseline = pool.nodes_in_use();
        let mut view = vector_of_u64(&mut pool, &(0..10).collect::<Vec<u64>>());
        view.set(&pool, 1, 5).unwrap();
        view.commit(&mut pool).unwrap();
        view.deinit(&mut pool).unwrap();
        assert_eq!(pool.nodes_in_use(), baseline);
    }
}
