use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::pool::{NodeId, NodePool};
use crate::view::{ceil_log2, BasicChunked, ViewCore};

const LENGTH_GINDEX: Gindex = Gindex(3);

/// View over an SSZ list of packed basic elements.
///
/// Tree layout: `root = branch(chunk subtree, length leaf)`. The cached
/// length starts unset and is read from the length leaf on first use; `push`
/// only bumps the cached value, and the length leaf is rewritten at commit
/// when it is actually part of the change set.
#[derive(Debug)]
pub struct BasicListView<T: BasicChunked> {
    core: ViewCore,
    limit: u64,
    /// Depth of the chunk subtree (under gindex 2).
    depth: usize,
    length: Option<u32>,
    length_changed: bool,
    dirty_chunks: BTreeMap<u64, [u8; 32]>,
    chunk_cache: BTreeMap<u64, [u8; 32]>,
    prefetched_chunk_count: usize,
    _marker: PhantomData<T>,
}

pub(crate) fn list_chunk_depth<T: BasicChunked>(limit: u64) -> usize {
    ceil_log2(limit.div_ceil(T::per_chunk() as u64))
}

impl<T: BasicChunked> BasicListView<T> {
    /// Takes ownership of one reference on `root`.
    pub fn new(root: NodeId, limit: u64) -> Self {
        BasicListView {
            core: ViewCore::new(root),
            limit,
            depth: list_chunk_depth::<T>(limit),
            length: None,
            length_changed: false,
            dirty_chunks: BTreeMap::new(),
            chunk_cache: BTreeMap::new(),
            prefetched_chunk_count: 0,
            _marker: PhantomData,
        }
    }

    /// Build a fresh list tree in `pool` from the given values.
    pub fn from_values(pool: &mut NodePool, values: &[T], limit: u64) -> Result<Self, TreeError> {
        if values.len() as u64 > limit {
            return Err(TreeError::LengthOverLimit { length: values.len() as u64, limit });
        }
        let per_chunk = T::per_chunk();
        let mut chunks = vec![[0u8; 32]; values.len().div_ceil(per_chunk)];
        for (i, v) in values.iter().enumerate() {
            T::write_to_chunk(&mut chunks[i / per_chunk], i % per_chunk, *v);
        }
        let leaves: Vec<NodeId> = chunks.iter().map(|c| pool.create_leaf(c)).collect();
        let depth = list_chunk_depth::<T>(limit);
        let data = pool.fill_with_contents(&leaves, depth)?;
        let length_leaf = pool.create_leaf_from_uint(values.len() as u64);
        let root = pool.create_branch(data, length_leaf);
        let mut view = Self::new(root, limit);
        view.length = Some(values.len() as u32);
        Ok(view)
    }

    pub fn root(&self) -> NodeId {
        self.core.root
    }

    fn chunk_gindex(&self, chunk: u64) -> Gindex {
        // Data subtree sits under gindex 2; one extra path bit.
        Gindex::from_depth(self.depth + 1, chunk)
    }

    /// Cached list length, read from the length leaf once.
    pub fn length(&mut self, pool: &NodePool) -> Result<u32, TreeError> {
        if let Some(length) = self.length {
            return Ok(length);
        }
        let node = self.core.node_at(pool, LENGTH_GINDEX)?;
        let leaf = pool.get_leaf(node)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&leaf[..8]);
        let length = u64::from_le_bytes(bytes) as u32;
        self.length = Some(length);
        Ok(length)
    }

    fn check_bounds(&mut self, pool: &NodePool, index: u64) -> Result<(), TreeError> {
        let length = self.length(pool)? as u64;
        if index >= length {
            return Err(TreeError::IndexOutOfBounds { index, length });
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
        let node = pool.get_node(self.core.root, self.chunk_gindex(chunk))?;
        let bytes = pool.get_leaf(node)?;
        self.chunk_cache.insert(chunk, bytes);
        Ok(bytes)
    }

    fn store_chunk(&mut self, chunk: u64, bytes: [u8; 32]) {
        self.chunk_cache.remove(&chunk);
        self.dirty_chunks.insert(chunk, bytes);
    }

    pub fn get(&mut self, pool: &NodePool, index: u64) -> Result<T, TreeError> {
        self.check_bounds(pool, index)?;
        let per_chunk = T::per_chunk() as u64;
        let chunk = self.load_chunk(pool, index / per_chunk)?;
        Ok(T::read_from_chunk(&chunk, (index % per_chunk) as usize))
    }

    pub fn set(&mut self, pool: &NodePool, index: u64, value: T) -> Result<(), TreeError> {
        self.check_bounds(pool, index)?;
        let per_chunk = T::per_chunk() as u64;
        let chunk_index = index / per_chunk;
        let mut chunk = self.load_chunk(pool, chunk_index)?;
        T::write_to_chunk(&mut chunk, (index % per_chunk) as usize, value);
        self.store_chunk(chunk_index, chunk);
        Ok(())
    }

    /// Append a value, bumping only the cached length; the length leaf is
    /// written at commit.
    pub fn push(&mut self, pool: &NodePool, value: T) -> Result<(), TreeError> {
        let length = self.length(pool)? as u64;
        if length >= self.limit {
            return Err(TreeError::LengthOverLimit { length: length + 1, limit: self.limit });
        }
        let per_chunk = T::per_chunk() as u64;
        let chunk_index = length / per_chunk;
        let mut chunk = if length % per_chunk == 0 {
            // First element of a fresh chunk; no need to read the zero leaf.
            [0u8; 32]
        } else {
            self.load_chunk(pool, chunk_index)?
        };
        T::write_to_chunk(&mut chunk, (length % per_chunk) as usize, value);
        self.store_chunk(chunk_index, chunk);
        self.length = Some(length as u32 + 1);
        self.length_changed = true;
        Ok(())
    }

    pub fn get_all(&mut self, pool: &NodePool, out: &mut [T]) -> Result<(), TreeError> {
        let length = self.length(pool)? as u64;
        if out.len() as u64 != length {
            return Err(TreeError::IndexOutOfBounds { index: out.len() as u64, length });
        }
        let chunks = length.div_ceil(T::per_chunk() as u64) as usize;
        self.ensure_chunk_prefetch(pool, chunks)?;
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = self.get(pool, index as u64)?;
        }
        Ok(())
    }

    pub fn get_all_alloc(&mut self, pool: &NodePool) -> Result<Vec<T>, TreeError> {
        let length = self.length(pool)? as usize;
        let mut out = vec![T::default(); length];
        self.get_all(pool, &mut out)?;
        Ok(out)
    }

    pub fn ensure_chunk_prefetch(&mut self, pool: &NodePool, chunks: usize) -> Result<(), TreeError> {
        if chunks <= self.prefetched_chunk_count {
            return Ok(());
        }
        let mut nodes = vec![NodeId(0); chunks];
        let data = self.core.node_at(pool, Gindex(2))?;
        pool.get_nodes_at_depth(data, self.depth, 0, &mut nodes)?;
        for (chunk, node) in nodes.iter().enumerate() {
            let chunk = chunk as u64;
            if !self.dirty_chunks.contains_key(&chunk) && !self.chunk_cache.contains_key(&chunk) {
                self.chunk_cache.insert(chunk, pool.get_leaf(*node)?);
            }
        }
        self.prefetched_chunk_count = chunks;
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty_chunks.is_empty() || self.length_changed
    }

    pub fn commit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        for (chunk_index, bytes) in std::mem::take(&mut self.dirty_chunks) {
            let leaf = pool.create_leaf(&bytes);
            self.core.stage(pool, self.chunk_gindex(chunk_index), leaf)?;
            self.chunk_cache.insert(chunk_index, bytes);
        }
        if self.length_changed {
            let length = self.length.unwrap_or(0) as u64;
            let leaf = pool.create_leaf_from_uint(length);
            self.core.stage(pool, LENGTH_GINDEX, leaf)?;
            self.length_changed = false;
        }
        self.core.commit(pool)
    }

    pub fn hash_tree_root(&mut self, pool: &mut NodePool) -> Result<[u8; 32], TreeError> {
        self.commit(pool)?;
        pool.get_root(self.core.root)
    }

    /// New list keeping elements `0..=index`; the tail of the boundary chunk
    /// is zeroed before the chunk-level truncate.
    pub fn slice_to(&mut self, pool: &mut NodePool, index: u64) -> Result<Self, TreeError> {
        self.check_bounds(pool, index)?;
        self.commit(pool)?;
        let per_chunk = T::per_chunk() as u64;
        let new_length = index + 1;
        let boundary_chunk = index / per_chunk;

        let mut chunk = self.load_chunk(pool, boundary_chunk)?;
        for position in ((index % per_chunk) + 1)..per_chunk {
            T::write_to_chunk(&mut chunk, position as usize, T::default());
        }

        let data = pool.get_node(self.core.root, Gindex(2))?;
        let boundary_leaf = pool.create_leaf(&chunk);
        let with_boundary =
            pool.set_node(data, Gindex::from_depth(self.depth, boundary_chunk), boundary_leaf)?;
        let truncated = pool.truncate_after_index(with_boundary, self.depth, boundary_chunk)?;
        pool.unref_node(with_boundary)?;
        let length_leaf = pool.create_leaf_from_uint(new_length);
        let root = pool.create_branch(truncated, length_leaf);

        let mut view = Self::new(root, self.limit);
        view.length = Some(new_length as u32);
        Ok(view)
    }

    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        self.dirty_chunks.clear();
        self.chunk_cache.clear();
        self.core.deinit(pool)
    }
}

/// View over an SSZ list of composite elements; children are subtree roots.
#[derive(Debug)]
pub struct CompositeListView {
    core: ViewCore,
    limit: u64,
    depth: usize,
    length: Option<u32>,
    length_changed: bool,
}

impl CompositeListView {
    pub fn new(root: NodeId, limit: u64) -> Self {
        CompositeListView {
            core: ViewCore::new(root),
            limit,
            depth: ceil_log2(limit),
            length: None,
            length_changed: false,
        }
    }

    /// Build a fresh list tree from element subtree roots; ownership of the
    /// element nodes transfers in.
    pub fn from_element_nodes(
        pool: &mut NodePool,
        elements: &[NodeId],
        limit: u64,
    ) -> Result<Self, TreeError> {
        if elements.len() as u64 > limit {
            return Err(TreeError::LengthOverLimit { length: elements.len() as u64, limit });
        }
        let depth = ceil_log2(limit);
        let data = pool.fill_with_contents(elements, depth)?;
        let length_leaf = pool.create_leaf_from_uint(elements.len() as u64);
        let root = pool.create_branch(data, length_leaf);
        let mut view = Self::new(root, limit);
        view.length = Some(elements.len() as u32);
        Ok(view)
    }

    pub fn root(&self) -> NodeId {
        self.core.root
    }

    fn element_gindex(&self, index: u64) -> Gindex {
        Gindex::from_depth(self.depth + 1, index)
    }

    pub fn length(&mut self, pool: &NodePool) -> Result<u32, TreeError> {
        if let Some(length) = self.length {
            return Ok(length);
        }
        let node = self.core.node_at(pool, LENGTH_GINDEX)?;
        let leaf = pool.get_leaf(node)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&leaf[..8]);
        let length = u64::from_le_bytes(bytes) as u32;
        self.length = Some(length);
        Ok(length)
    }

    fn check_bounds(&mut self, pool: &NodePool, index: u64) -> Result<(), TreeError> {
        let length = self.length(pool)? as u64;
        if index >= length {
            return Err(TreeError::IndexOutOfBounds { index, length });
        }
        Ok(())
    }

    /// Borrowed peek at the element subtree.
    pub fn get(&mut self, pool: &NodePool, index: u64) -> Result<NodeId, TreeError> {
        self.check_bounds(pool, index)?;
        self.core.node_at(pool, self.element_gindex(index))
    }

    /// Element subtree with an owned reference.
    pub fn take(&mut self, pool: &mut NodePool, index: u64) -> Result<NodeId, TreeError> {
        let node = self.get(pool, index)?;
        pool.ref_node(node)?;
        Ok(node)
    }

    /// Stage a replacement element; ownership of `node` transfers in.
    pub fn set(&mut self, pool: &mut NodePool, index: u64, node: NodeId) -> Result<(), TreeError> {
        self.check_bounds(pool, index)?;
        self.core.stage(pool, self.element_gindex(index), node)
    }

    /// Append an element subtree; ownership transfers in.
    pub fn push(&mut self, pool: &mut NodePool, node: NodeId) -> Result<(), TreeError> {
        let length = self.length(pool)? as u64;
        if length >= self.limit {
            return Err(TreeError::LengthOverLimit { length: length + 1, limit: self.limit });
        }
        self.core.stage(pool, self.element_gindex(length), node)?;
        self.length = Some(length as u32 + 1);
        self.length_changed = true;
        Ok(())
    }

    pub fn commit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        if self.length_changed {
            let length = self.length.unwrap_or(0) as u64;
            let leaf = pool.create_leaf_from_uint(length);
            self.core.stage(pool, LENGTH_GINDEX, leaf)?;
            self.length_changed = false;
        }
        self.core.commit(pool)
    }

    pub fn hash_tree_root(&mut self, pool: &mut NodePool) -> Result<[u8; 32], TreeError> {
        self.commit(pool)?;
        pool.get_root(self.core.root)
    }

    /// New list keeping elements `0..=index`; the chunk-level truncate is
    /// sufficient for composite elements.
    pub fn slice_to(&mut self, pool: &mut NodePool, index: u64) -> Result<Self, TreeError> {
        self.check_bounds(pool, index)?;
        self.commit(pool)?;
        let data = pool.get_node(self.core.root, Gindex(2))?;
        let truncated = pool.truncate_after_index(data, self.depth, index)?;
        let length_leaf = pool.create_leaf_from_uint(index + 1);
        let root = pool.create_branch(truncated, length_leaf);
        let mut view = Self::new(root, self.limit);
        view.length = Some(index as u32 + 1);
        Ok(view)
    }

    /// New list holding the suffix starting at `start` (empty if `start`
    /// reaches past the end).
    pub fn slice_from(&mut self, pool: &mut NodePool, start: u64) -> Result<Self, TreeError> {
        self.commit(pool)?;
        let length = self.length(pool)? as u64;
        let count = length.saturating_sub(start);
        let mut elements = vec![NodeId(0); count as usize];
        if count > 0 {
            let data = pool.get_node(self.core.root, Gindex(2))?;
            pool.get_nodes_at_depth(data, self.depth, start, &mut elements)?;
            for node in &elements {
                pool.ref_node(*node)?;
            }
        }
        Self::from_element_nodes(pool, &elements, self.limit)
    }

    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        self.core.deinit(pool)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hashing::{merkleize_leaves, mix_in_length};

    #[test]
    fn push_set_commit_hash_matches_directly_built_list() {
        let mut pool = NodePool::new();
        // Limit 16 u32s: 4 per chunk, 4 chunks, depth 2.
        let mut list = BasicListView::<u32>::from_values(&mut pool, &[], 16).unwrap();
        for value in [5u32, 15, 25, 35, 45] {
            list.push(&pool, value).unwrap();
        }
        list.set(&pool, 2, 99).unwrap();
        list.set(&pool, 4, 123).unwrap();
        list.commit(&mut pool).unwrap();
        let root = list.hash_tree_root(&mut pool).unwrap();

        let mut direct =
            BasicListView::<u32>::from_values(&mut pool, &[5, 15, 99, 35, 123], 16).unwrap();
        assert_eq!(root, direct.hash_tree_root(&mut pool).unwrap());
    }

    #[test]
    fn length_is_read_lazily_and_cached() {
        let mut pool = NodePool::new();
        let mut list = BasicListView::<u64>::from_values(&mut pool, &[1, 2, 3], 64).unwrap();
        let root = list.root();
        let mut reopened = BasicListView::<u64>::new(root, 64);
        pool.ref_node(root).unwrap();
        assert_eq!(reopened.length(&pool).unwrap(), 3);
        assert_eq!(reopened.get(&pool, 2).unwrap(), 3);
        assert_eq!(
            reopened.get(&pool, 3),
            Err(TreeError::IndexOutOfBounds { index: 3, length: 3 })
        );
    }

    #[test]
    fn push_beyond_limit_fails() {
        let mut pool = NodePool::new();
        let mut list = BasicListView::<u64>::from_values(&mut pool, &[0; 4], 4).unwrap();
        assert_eq!(
            list.push(&pool, 1),
            Err(TreeError::LengthOverLimit { length: 5, limit: 4 })
        );
    }

    #[test]
    fn slice_to_equals_prefix() {
        let mut pool = NodePool::new();
        let values: Vec<u64> = (0..11).map(|i| i * 7 + 1).collect();
        let mut list = BasicListView::<u64>::from_values(&mut pool, &values, 32).unwrap();
        for index in [0u64, 3, 4, 10] {
            let mut sliced = list.slice_to(&mut pool, index).unwrap();
            assert_eq!(
                sliced.get_all_alloc(&pool).unwrap(),
                &values[..=(index as usize)]
            );
            // The sliced hash equals a directly-built prefix list's hash.
            let mut direct = BasicListView::<u64>::from_values(
                &mut pool,
                &values[..=(index as usize)],
                32,
            )
            .unwrap();
            assert_eq!(
                sliced.hash_tree_root(&mut pool).unwrap(),
                direct.hash_tree_root(&mut pool).unwrap()
            );
        }
    }

    #[test]
    fn basic_list_hash_has_length_mixin() {
        let mut pool = NodePool::new();
        let mut list = BasicListView::<u32>::from_values(&mut pool, &[7, 8], 16).unwrap();
        let mut chunk = [0u8; 32];
        u32::write_to_chunk(&mut chunk, 0, 7);
        u32::write_to_chunk(&mut chunk, 1, 8);
        let expected = mix_in_length(&merkleize_leaves(&[chunk], 2), 2);
        assert_eq!(list.hash_tree_root(&mut pool).unwrap(), expected);
    }

    fn composite_list(pool: &mut NodePool, element_bytes: &[[u8; 32]], limit: u64) -> CompositeListView {
        // Depth-1 elements so sharing is observable.
        let elements: Vec<NodeId> = element_bytes
            .iter()
            .map(|bytes| {
                let a = pool.create_leaf(bytes);
                let b = pool.create_leaf(&[0xEE; 32]);
                pool.create_branch(a, b)
            })
            .collect();
        CompositeListView::from_element_nodes(pool, &elements, limit).unwrap()
    }

    #[test]
    fn composite_slice_from_is_suffix() {
        let mut pool = NodePool::new();
        let element_bytes: Vec<[u8; 32]> = (1..=6u8).map(|i| [i; 32]).collect();
        let mut list = composite_list(&mut pool, &element_bytes, 8);

        for start in [0u64, 2, 5, 6, 9] {
            let mut suffix = list.slice_from(&mut pool, start).unwrap();
            let expected_len = 6u32.saturating_sub(start as u32);
            assert_eq!(suffix.length(&pool).unwrap(), expected_len);
            for offset in 0..expected_len as u64 {
                let node = suffix.get(&pool, offset).unwrap();
                let original = list.get(&pool, start + offset).unwrap();
                assert_eq!(
                    pool.get_root(node).unwrap(),
                    pool.get_root(original).unwrap()
                );
            }
        }
    }

    #[test]
    fn composite_push_and_set_transfer_ownership() {
        let mut pool = NodePool::new();
        let element_bytes: Vec<[u8; 32]> = (1..=3u8).map(|i| [i; 32]).collect();
        let mut list = composite_list(&mut pool, &element_bytes, 8);
        let before = list.hash_tree_root(&mut pool).unwrap();

        let leaf = pool.create_leaf(&[0xAB; 32]);
        let pad = pool.create_leaf(&[0xEE; 32]);
        let element = pool.create_branch(leaf, pad);
        list.push(&mut pool, element).unwrap();
        assert_eq!(list.length(&pool).unwrap(), 4);
        let after = list.hash_tree_root(&mut pool).unwrap();
        assert_ne!(before, after);

        let expected = composite_list(&mut pool, &[[1; 32], [2; 32], [3; 32], [0xAB; 32]], 8)
            .hash_tree_root(&mut pool)
            .unwrap();
        assert_eq!(after, expected);
    }
}
