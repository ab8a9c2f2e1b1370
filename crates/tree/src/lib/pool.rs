//! Arena-backed persistent Merkle tree nodes.
//!
//! Nodes are addressed by a 32-bit handle and refcounted in place. Mutating
//! operations never touch existing nodes: they produce a new root that shares
//! every unchanged descendant with the old tree.
//!
//! Reference ownership is transfer-style: `create_branch` takes over the
//! caller's reference on both children, and `unref_node` on a branch releases
//! one reference on each child. Callers that keep using a child after
//! attaching it must `ref_node` it first.

use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::hashing::{hash_two, zero_hash, MAX_DEPTH};

/// Handle into a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
enum Slot {
    Free { next_free: u32 },
    Leaf { value: [u8; 32], refcount: u32 },
    Branch { left: NodeId, right: NodeId, root: Option<[u8; 32]>, refcount: u32 },
}

const NO_FREE: u32 = u32::MAX;

#[derive(Debug)]
pub struct NodePool {
    slots: Vec<Slot>,
    free_head: u32,
    in_use: usize,
    /// Interned all-zero subtree per depth; pinned by the pool's own
    /// reference so they survive any number of attach/detach cycles.
    zero_nodes: Vec<NodeId>,
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new()
    }
}

impl NodePool {
    pub fn new() -> Self {
        NodePool {
            slots: Vec::new(),
            free_head: NO_FREE,
            in_use: 0,
            zero_nodes: Vec::new(),
        }
    }

    /// Reserve capacity for `n` additional nodes up front.
    pub fn preheat(&mut self, n: usize) {
        self.slots.reserve(n);
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of live (non-free) nodes, including interned zero nodes.
    pub fn nodes_in_use(&self) -> usize {
        self.in_use
    }

    fn alloc(&mut self, slot: Slot) -> NodeId {
        self.in_use += 1;
        if self.free_head != NO_FREE {
            let id = self.free_head;
            match self.slots[id as usize] {
                Slot::Free { next_free } => self.free_head = next_free,
                _ => unreachable!("free list points at a live slot"),
            }
            self.slots[id as usize] = slot;
            NodeId(id)
        } else {
            self.slots.push(slot);
            NodeId((self.slots.len() - 1) as u32)
        }
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, TreeError> {
        match self.slots.get(id.0 as usize) {
            None | Some(Slot::Free { .. }) => Err(TreeError::RefNotInitialized(id)),
            Some(slot) => Ok(slot),
        }
    }

    pub fn create_leaf(&mut self, value: &[u8; 32]) -> NodeId {
        self.alloc(Slot::Leaf { value: *value, refcount: 1 })
    }

    /// Little-endian `u64` in the first eight bytes, the layout of SSZ
    /// length-mixin chunks and packed uint leaves.
    pub fn create_leaf_from_uint(&mut self, value: u64) -> NodeId {
        let mut chunk = [0u8; 32];
        chunk[..8].copy_from_slice(&value.to_le_bytes());
        self.create_leaf(&chunk)
    }

    /// Takes ownership of one reference on each child. The root hash is not
    /// computed until first [`Self::get_root`].
    pub fn create_branch(&mut self, left: NodeId, right: NodeId) -> NodeId {
        debug_assert!(self.slot(left).is_ok() && self.slot(right).is_ok());
        self.alloc(Slot::Branch { left, right, root: None, refcount: 1 })
    }

    pub fn ref_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        match self.slots.get_mut(id.0 as usize) {
            None | Some(Slot::Free { .. }) => Err(TreeError::RefNotInitialized(id)),
            Some(Slot::Leaf { refcount, .. }) | Some(Slot::Branch { refcount, .. }) => {
                *refcount += 1;
                Ok(())
            }
        }
    }

    /// Releases one reference; at zero the node is freed and one reference on
    /// each child is released in turn.
    pub fn unref_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let slot = match self.slots.get_mut(id.0 as usize) {
                None | Some(Slot::Free { .. }) => return Err(TreeError::RefNotInitialized(id)),
                Some(slot) => slot,
            };
            match slot {
                Slot::Leaf { refcount, .. } => {
                    *refcount -= 1;
                    if *refcount == 0 {
                        self.release(id);
                    }
                }
                Slot::Branch { refcount, left, right, .. } => {
                    *refcount -= 1;
                    if *refcount == 0 {
                        let (left, right) = (*left, *right);
                        self.release(id);
                        stack.push(left);
                        stack.push(right);
                    }
                }
                Slot::Free { .. } => unreachable!("slot() filters out free slots"),
            }
        }
        Ok(())
    }

    fn release(&mut self, id: NodeId) {
        self.slots[id.0 as usize] = Slot::Free { next_free: self.free_head };
        self.free_head = id.0;
        self.in_use -= 1;
    }

    /// Interned root of an all-zero subtree of the given depth.
    pub fn zero_node(&mut self, depth: usize) -> Result<NodeId, TreeError> {
        if depth > MAX_DEPTH {
            return Err(TreeError::DepthOverLimit(depth));
        }
        while self.zero_nodes.len() <= depth {
            let d = self.zero_nodes.len();
            let node = if d == 0 {
                self.create_leaf(&[0u8; 32])
            } else {
                let child = self.zero_nodes[d - 1];
                // The branch owns two child references; the pool keeps its
                // own pin from the child's creation.
                self.ref_node(child)?;
                self.ref_node(child)?;
                let branch = self.create_branch(child, child);
                if let Slot::Branch { root, .. } = &mut self.slots[branch.0 as usize] {
                    *root = Some(*zero_hash(d));
                }
                branch
            };
            self.zero_nodes.push(node);
        }
        Ok(self.zero_nodes[depth])
    }

    /// Memoized hash of the subtree under `id`.
    pub fn get_root(&mut self, id: NodeId) -> Result<[u8; 32], TreeError> {
        // Post-order over uncomputed branches, iterative to keep huge
        // registry subtrees off the call stack.
        let mut stack = vec![(id, false)];
        let mut result = [0u8; 32];
        while let Some((id, children_ready)) = stack.pop() {
            match self.slot(id)? {
                Slot::Leaf { value, .. } => result = *value,
                Slot::Branch { root: Some(root), .. } => result = *root,
                Slot::Branch { left, right, root: None, .. } => {
                    let (left, right) = (*left, *right);
                    if children_ready {
                        let left_root = self.peek_root(left)?;
                        let right_root = self.peek_root(right)?;
                        let root = hash_two(&left_root, &right_root);
                        if let Slot::Branch { root: memo, .. } = &mut self.slots[id.0 as usize] {
                            *memo = Some(root);
                        }
                        result = root;
                    } else {
                        stack.push((id, true));
                        stack.push((right, false));
                        stack.push((left, false));
                    }
                }
                Slot::Free { .. } => unreachable!("slot() filters out free slots"),
            }
        }
        Ok(result)
    }

    fn peek_root(&self, id: NodeId) -> Result<[u8; 32], TreeError> {
        match self.slot(id)? {
            Slot::Leaf { value, .. } => Ok(*value),
            Slot::Branch { root: Some(root), .. } => Ok(*root),
            Slot::Branch { root: None, .. } => Err(TreeError::ChildNotFound(Gindex::ROOT)),
            Slot::Free { .. } => unreachable!("slot() filters out free slots"),
        }
    }

    pub fn get_leaf(&self, id: NodeId) -> Result<[u8; 32], TreeError> {
        match self.slot(id)? {
            Slot::Leaf { value, .. } => Ok(*value),
            Slot::Branch { .. } => Err(TreeError::ExpectedLeaf(id)),
            Slot::Free { .. } => unreachable!("slot() filters out free slots"),
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> Result<bool, TreeError> {
        Ok(matches!(self.slot(id)?, Slot::Leaf { .. }))
    }

    fn children(&self, id: NodeId) -> Result<(NodeId, NodeId), TreeError> {
        match self.slot(id)? {
            Slot::Branch { left, right, .. } => Ok((*left, *right)),
            Slot::Leaf { .. } => Err(TreeError::ExpectedBranch(id)),
            Slot::Free { .. } => unreachable!("slot() filters out free slots"),
        }
    }

    pub fn get_node(&self, root: NodeId, gindex: Gindex) -> Result<NodeId, TreeError> {
        let mut node = root;
        for go_right in gindex.path() {
            let (left, right) = self
                .children(node)
                .map_err(|_| TreeError::ChildNotFound(gindex))?;
            node = if go_right { right } else { left };
        }
        Ok(node)
    }

    /// Bulk read of `out.len()` consecutive nodes at `depth`, starting at
    /// `start_index`. One tree walk per subtree instead of one per chunk.
    pub fn get_nodes_at_depth(
        &self,
        root: NodeId,
        depth: usize,
        start_index: u64,
        out: &mut [NodeId],
    ) -> Result<(), TreeError> {
        if out.is_empty() {
            return Ok(());
        }
        let end_index = start_index + out.len() as u64;
        self.collect_range(root, depth, 0, start_index, end_index, out)
    }

    fn collect_range(
        &self,
        node: NodeId,
        depth: usize,
        subtree_start: u64,
        range_start: u64,
        range_end: u64,
        out: &mut [NodeId],
    ) -> Result<(), TreeError> {
        let subtree_len = 1u64 << depth;
        if subtree_start + subtree_len <= range_start || subtree_start >= range_end {
            return Ok(());
        }
        if depth == 0 {
            out[(subtree_start - range_start) as usize] = node;
            return Ok(());
        }
        let (left, right) = self.children(node)?;
        let half = subtree_len / 2;
        self.collect_range(left, depth - 1, subtree_start, range_start, range_end, out)?;
        self.collect_range(right, depth - 1, subtree_start + half, range_start, range_end, out)
    }

    /// Replace the node at `gindex`, returning a new root. Unchanged
    /// siblings are shared with the old tree.
    pub fn set_node(
        &mut self,
        root: NodeId,
        gindex: Gindex,
        node: NodeId,
    ) -> Result<NodeId, TreeError> {
        self.set_nodes_grouped(root, &[gindex], &[node])
    }

    /// Batched replacement: one bottom-up rebuild touching only the branches
    /// on the paths to `gindices` (sorted ascending, disjoint subtrees).
    pub fn set_nodes_grouped(
        &mut self,
        root: NodeId,
        gindices: &[Gindex],
        nodes: &[NodeId],
    ) -> Result<NodeId, TreeError> {
        if gindices.len() != nodes.len() {
            return Err(TreeError::InvalidProofInput("gindex/node count mismatch"));
        }
        if gindices.is_empty() {
            self.ref_node(root)?;
            return Ok(root);
        }
        debug_assert!(gindices.windows(2).all(|w| w[0] < w[1]));
        self.rebuild(root, 0, gindices, nodes)
    }

    fn rebuild(
        &mut self,
        node: NodeId,
        bits_consumed: usize,
        gindices: &[Gindex],
        nodes: &[NodeId],
    ) -> Result<NodeId, TreeError> {
        if gindices.len() == 1 && gindices[0].depth() == bits_consumed {
            // Exact target: ownership of the replacement transfers in.
            return Ok(nodes[0]);
        }
        let (old_left, old_right) = self
            .children(node)
            .map_err(|_| TreeError::ChildNotFound(gindices[0]))?;
        // Ascending gindex order means all left-subtree targets precede
        // right-subtree targets at every level.
        let split = gindices.partition_point(|g| {
            let depth = g.depth();
            debug_assert!(depth > bits_consumed);
            (g.0 >> (depth - bits_consumed - 1)) & 1 == 0
        });
        let new_left = if split > 0 {
            self.rebuild(old_left, bits_consumed + 1, &gindices[..split], &nodes[..split])?
        } else {
            self.ref_node(old_left)?;
            old_left
        };
        let new_right = if split < gindices.len() {
            self.rebuild(old_right, bits_consumed + 1, &gindices[split..], &nodes[split..])?
        } else {
            self.ref_node(old_right)?;
            old_right
        };
        Ok(self.create_branch(new_left, new_right))
    }

    /// New subtree where every leaf at `depth` with position greater than
    /// `index` is replaced by the zero leaf. Used by list truncation.
    pub fn truncate_after_index(
        &mut self,
        root: NodeId,
        depth: usize,
        index: u64,
    ) -> Result<NodeId, TreeError> {
        if index + 1 >= (1u64 << depth) {
            self.ref_node(root)?;
            return Ok(root);
        }
        self.truncate_inner(root, depth, index)
    }

    fn truncate_inner(&mut self, node: NodeId, depth: usize, index: u64) -> Result<NodeId, TreeError> {
        if depth == 0 {
            self.ref_node(node)?;
            return Ok(node);
        }
        let (left, right) = self.children(node)?;
        let half = 1u64 << (depth - 1);
        if index < half {
            let new_left = self.truncate_inner(left, depth - 1, index)?;
            let zero = self.zero_node(depth - 1)?;
            self.ref_node(zero)?;
            Ok(self.create_branch(new_left, zero))
        } else {
            self.ref_node(left)?;
            let new_right = self.truncate_inner(right, depth - 1, index - half)?;
            Ok(self.create_branch(left, new_right))
        }
    }

    /// Bottom-up build of a subtree of the given depth from consecutive
    /// leaves (or subtree roots), padding the tail with zero subtrees.
    /// Ownership of `contents` transfers into the returned root.
    pub fn fill_with_contents(
        &mut self,
        contents: &[NodeId],
        depth: usize,
    ) -> Result<NodeId, TreeError> {
        if depth > MAX_DEPTH {
            return Err(TreeError::DepthOverLimit(depth));
        }
        if contents.len() as u64 > 1u64 << depth {
            return Err(TreeError::ContentsOverflowDepth { count: contents.len(), depth });
        }
        if contents.is_empty() {
            let zero = self.zero_node(depth)?;
            self.ref_node(zero)?;
            return Ok(zero);
        }
        let mut layer: Vec<NodeId> = contents.to_vec();
        for level in 0..depth {
            let mut parents = Vec::with_capacity(layer.len().div_ceil(2));
            let mut pair = layer.chunks_exact(2);
            for chunk in &mut pair {
                parents.push(self.create_branch(chunk[0], chunk[1]));
            }
            if let [odd] = pair.remainder() {
                let zero = self.zero_node(level)?;
                self.ref_node(zero)?;
                parents.push(self.create_branch(*odd, zero));
            }
            layer = parents;
            if layer.len() == 1 && level + 1 < depth {
                // Remaining levels only add zero padding on the right.
                for upper in (level + 1)..depth {
                    let zero = self.zero_node(upper)?;
                    self.ref_node(zero)?;
                    let parent = self.create_branch(layer[0], zero);
                    layer[0] = parent;
                }
                break;
            }
        }
        debug_assert_eq!(layer.len(), 1);
        Ok(layer[0])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hashing::merkleize_leaves;

    fn leaf_bytes(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn leaf_and_branch_roots() {
        let mut pool = NodePool::new();
        let a = pool.create_leaf(&leaf_bytes(1));
        let b = pool.create_leaf(&leaf_bytes(2));
        let branch = pool.create_branch(a, b);
        assert_eq!(
            pool.get_root(branch).unwrap(),
            hash_two(&leaf_bytes(1), &leaf_bytes(2))
        );
        // Memoized: second read hits the cached root.
        assert_eq!(
            pool.get_root(branch).unwrap(),
            hash_two(&leaf_bytes(1), &leaf_bytes(2))
        );
    }

    #[test]
    fn uint_leaf_layout() {
        let mut pool = NodePool::new();
        let id = pool.create_leaf_from_uint(0x0102_0304);
        let leaf = pool.get_leaf(id).unwrap();
        assert_eq!(&leaf[..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&leaf[4..], &[0u8; 28][..]);
    }

    #[test]
    fn unref_frees_subtree() {
        let mut pool = NodePool::new();
        let baseline = pool.nodes_in_use();
        let a = pool.create_leaf(&leaf_bytes(1));
        let b = pool.create_leaf(&leaf_bytes(2));
        let branch = pool.create_branch(a, b);
        assert_eq!(pool.nodes_in_use(), baseline + 3);
        pool.unref_node(branch).unwrap();
        assert_eq!(pool.nodes_in_use(), baseline);
    }

    #[test]
    fn shared_child_survives_partial_unref() {
        let mut pool = NodePool::new();
        let shared = pool.create_leaf(&leaf_bytes(9));
        pool.ref_node(shared).unwrap();
        let other = pool.create_leaf(&leaf_bytes(1));
        let branch = pool.create_branch(shared, other);
        pool.unref_node(branch).unwrap();
        // One reference remains on the shared leaf.
        assert_eq!(pool.get_leaf(shared).unwrap(), leaf_bytes(9));
        pool.unref_node(shared).unwrap();
    }

    #[test]
    fn set_node_shares_unchanged_siblings() {
        let mut pool = NodePool::new();
        let leaves: Vec<NodeId> = (0..4).map(|i| pool.create_leaf(&leaf_bytes(i))).collect();
        let root = pool.fill_with_contents(&leaves, 2).unwrap();

        let replacement = pool.create_leaf(&leaf_bytes(42));
        let new_root = pool
            .set_node(root, Gindex::from_depth(2, 1), replacement)
            .unwrap();

        let expected = merkleize_leaves(
            &[leaf_bytes(0), leaf_bytes(42), leaf_bytes(2), leaf_bytes(3)],
            2,
        );
        assert_eq!(pool.get_root(new_root).unwrap(), expected);
        // Old tree untouched.
        let old_expected =
            merkleize_leaves(&[leaf_bytes(0), leaf_bytes(1), leaf_bytes(2), leaf_bytes(3)], 2);
        assert_eq!(pool.get_root(root).unwrap(), old_expected);

        pool.unref_node(root).unwrap();
        assert_eq!(pool.get_root(new_root).unwrap(), expected);
    }

    #[test]
    fn set_nodes_grouped_matches_sequential_sets() {
        let mut pool = NodePool::new();
        let leaves: Vec<NodeId> = (0..8).map(|i| pool.create_leaf(&leaf_bytes(i))).collect();
        let root = pool.fill_with_contents(&leaves, 3).unwrap();

        let n5 = pool.create_leaf(&leaf_bytes(55));
        let n2 = pool.create_leaf(&leaf_bytes(22));
        let n7 = pool.create_leaf(&leaf_bytes(77));
        let grouped = pool
            .set_nodes_grouped(
                root,
                &[
                    Gindex::from_depth(3, 2),
                    Gindex::from_depth(3, 5),
                    Gindex::from_depth(3, 7),
                ],
                &[n2, n5, n7],
            )
            .unwrap();

        let mut expected_leaves: Vec<[u8; 32]> = (0..8).map(leaf_bytes).collect();
        expected_leaves[2] = leaf_bytes(22);
        expected_leaves[5] = leaf_bytes(55);
        expected_leaves[7] = leaf_bytes(77);
        assert_eq!(
            pool.get_root(grouped).unwrap(),
            merkleize_leaves(&expected_leaves, 3)
        );
    }

    #[test]
    fn truncate_zeroes_tail() {
        let mut pool = NodePool::new();
        let leaves: Vec<NodeId> = (1..=8).map(|i| pool.create_leaf(&leaf_bytes(i))).collect();
        let root = pool.fill_with_contents(&leaves, 3).unwrap();
        let truncated = pool.truncate_after_index(root, 3, 2).unwrap();

        let expected = merkleize_leaves(&[leaf_bytes(1), leaf_bytes(2), leaf_bytes(3)], 3);
        assert_eq!(pool.get_root(truncated).unwrap(), expected);
    }

    #[test]
    fn truncate_past_end_is_identity() {
        let mut pool = NodePool::new();
        let leaves: Vec<NodeId> = (1..=4).map(|i| pool.create_leaf(&leaf_bytes(i))).collect();
        let root = pool.fill_with_contents(&leaves, 2).unwrap();
        let same = pool.truncate_after_index(root, 2, 3).unwrap();
        assert_eq!(same, root);
        pool.unref_node(same).unwrap();
        assert_eq!(pool.get_leaf(leaves[0]).unwrap(), leaf_bytes(1));
    }

    #[test]
    fn fill_with_contents_pads_like_merkleize() {
        let mut pool = NodePool::new();
        for count in [0usize, 1, 3, 5, 8] {
            let bytes: Vec<[u8; 32]> = (0..count as u8).map(leaf_bytes).collect();
            let leaves: Vec<NodeId> = bytes.iter().map(|b| pool.create_leaf(b)).collect();
            let root = pool.fill_with_contents(&leaves, 4).unwrap();
            assert_eq!(pool.get_root(root).unwrap(), merkleize_leaves(&bytes, 4));
            pool.unref_node(root).unwrap();
        }
    }

    #[test]
    fn bulk_reads_match_single_reads() {
        let mut pool = NodePool::new();
        let leaves: Vec<NodeId> = (0..8).map(|i| pool.create_leaf(&leaf_bytes(i))).collect();
        let root = pool.fill_with_contents(&leaves, 3).unwrap();

        let mut out = [NodeId(0); 5];
        pool.get_nodes_at_depth(root, 3, 2, &mut out).unwrap();
        for (offset, id) in out.iter().enumerate() {
            let single = pool
                .get_node(root, Gindex::from_depth(3, 2 + offset as u64))
                .unwrap();
            assert_eq!(*id, single);
        }
    }

    #[test]
    fn zero_nodes_are_interned() {
        let mut pool = NodePool::new();
        let z3_a = pool.zero_node(3).unwrap();
        let z3_b = pool.zero_node(3).unwrap();
        assert_eq!(z3_a, z3_b);
        assert_eq!(pool.get_root(z3_a).unwrap(), *zero_hash(3));
    }
}
