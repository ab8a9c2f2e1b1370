//! Mutable views over pool-backed subtrees.
//!
//! A view amortizes reads through chunk caches and batches writes into a
//! pending-change set keyed by gindex; `commit` applies every pending change
//! with a single grouped copy-on-write rebuild and swaps the view onto the
//! new root. Views own one reference on their root and on every staged node;
//! `deinit` releases them.

pub mod bits;
pub mod container;
pub mod list;
pub mod vector;

pub use bits::BitArrayView;
pub use container::ContainerView;
pub use list::{BasicListView, CompositeListView};
pub use vector::{BasicVectorView, CompositeVectorView};

use std::collections::BTreeMap;

use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::pool::{NodeId, NodePool};

pub(crate) fn ceil_log2(n: u64) -> usize {
    if n <= 1 {
        0
    } else {
        (64 - (n - 1).leading_zeros()) as usize
    }
}

/// A basic (packed) SSZ element: little-endian within a 32-byte chunk.
pub trait BasicChunked: Copy + Default + PartialEq {
    const SIZE: usize;

    fn write_to_chunk(chunk: &mut [u8; 32], position_in_chunk: usize, value: Self);
    fn read_from_chunk(chunk: &[u8; 32], position_in_chunk: usize) -> Self;

    fn per_chunk() -> usize {
        32 / Self::SIZE
    }
}

macro_rules! impl_basic_chunked {
    ($t:ty, $size:expr) => {
        impl BasicChunked for $t {
            const SIZE: usize = $size;

            fn write_to_chunk(chunk: &mut [u8; 32], position_in_chunk: usize, value: Self) {
                let offset = position_in_chunk * Self::SIZE;
                chunk[offset..offset + Self::SIZE].copy_from_slice(&value.to_le_bytes());
            }

            fn read_from_chunk(chunk: &[u8; 32], position_in_chunk: usize) -> Self {
                let offset = position_in_chunk * Self::SIZE;
                let mut bytes = [0u8; $size];
                bytes.copy_from_slice(&chunk[offset..offset + Self::SIZE]);
                <$t>::from_le_bytes(bytes)
            }
        }
    };
}

impl_basic_chunked!(u8, 1);
impl_basic_chunked!(u16, 2);
impl_basic_chunked!(u32, 4);
impl_basic_chunked!(u64, 8);

/// 32-byte roots occupy a whole chunk each (hash vectors, mix vectors).
impl BasicChunked for [u8; 32] {
    const SIZE: usize = 32;

    fn write_to_chunk(chunk: &mut [u8; 32], _position_in_chunk: usize, value: Self) {
        *chunk = value;
    }

    fn read_from_chunk(chunk: &[u8; 32], _position_in_chunk: usize) -> Self {
        *chunk
    }
}

/// Per-view bookkeeping shared by every variant: the committed root and the
/// staged replacement nodes, keyed by gindex relative to that root.
#[derive(Debug)]
pub(crate) struct ViewCore {
    pub root: NodeId,
    /// Staged replacement nodes; keys double as the ordered `changed` set.
    pub pending: BTreeMap<Gindex, NodeId>,
}

impl ViewCore {
    pub fn new(root: NodeId) -> Self {
        ViewCore { root, pending: BTreeMap::new() }
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Stage a replacement node, releasing any node previously staged for
    /// the same gindex.
    pub fn stage(&mut self, pool: &mut NodePool, gindex: Gindex, node: NodeId) -> Result<(), TreeError> {
        if let Some(previous) = self.pending.insert(gindex, node) {
            pool.unref_node(previous)?;
        }
        Ok(())
    }

    /// Current node under `gindex`: the staged replacement if one exists,
    /// otherwise the committed tree's node.
    pub fn node_at(&self, pool: &NodePool, gindex: Gindex) -> Result<NodeId, TreeError> {
        if let Some(&staged) = self.pending.get(&gindex) {
            return Ok(staged);
        }
        pool.get_node(self.root, gindex)
    }

    /// Apply all staged changes in one grouped rebuild and move the view to
    /// the produced root.
    pub fn commit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let gindices: Vec<Gindex> = self.pending.keys().copied().collect();
        let nodes: Vec<NodeId> = self.pending.values().copied().collect();
        let new_root = pool.set_nodes_grouped(self.root, &gindices, &nodes)?;
        pool.unref_node(self.root)?;
        self.root = new_root;
        self.pending.clear();
        Ok(())
    }

    /// Release the view's references without committing.
    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        for (_, node) in std::mem::take(&mut self.pending) {
            pool.unref_node(node)?;
        }
        pool.unref_node(self.root)
    }
}
