use crate::errors::TreeError;
use crate::gindex::Gindex;
use crate::pool::{NodeId, NodePool};
use crate::view::{ceil_log2, ViewCore};

/// View over an SSZ container: a fixed number of fields, each a single leaf
/// (basic or small fixed-size fields) or a composite subtree. Composite
/// fields are exchanged as node handles; `set_field` transfers ownership in,
/// `take_field` hands an owned reference out.
#[derive(Debug)]
pub struct ContainerView {
    core: ViewCore,
    field_count: usize,
    depth: usize,
}

impl ContainerView {
    /// Takes ownership of one reference on `root`.
    pub fn new(root: NodeId, field_count: usize) -> Self {
        ContainerView { core: ViewCore::new(root), field_count, depth: ceil_log2(field_count as u64) }
    }

    /// Build a fresh container tree from per-field subtree roots; ownership
    /// of the field nodes transfers in.
    pub fn from_field_nodes(pool: &mut NodePool, fields: &[NodeId]) -> Result<Self, TreeError> {
        let depth = ceil_log2(fields.len() as u64);
        let root = pool.fill_with_contents(fields, depth)?;
        Ok(Self::new(root, fields.len()))
    }

    pub fn root(&self) -> NodeId {
        self.core.root
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn field_gindex(&self, field: usize) -> Result<Gindex, TreeError> {
        if field >= self.field_count {
            return Err(TreeError::IndexOutOfBounds {
                index: field as u64,
                length: self.field_count as u64,
            });
        }
        Ok(Gindex::from_depth(self.depth, field as u64))
    }

    /// Borrowed peek at a field's subtree.
    pub fn field_node(&self, pool: &NodePool, field: usize) -> Result<NodeId, TreeError> {
        let gindex = self.field_gindex(field)?;
        self.core.node_at(pool, gindex)
    }

    /// Field subtree with an owned reference; pair with a later `set_field`.
    pub fn take_field(&self, pool: &mut NodePool, field: usize) -> Result<NodeId, TreeError> {
        let node = self.field_node(pool, field)?;
        pool.ref_node(node)?;
        Ok(node)
    }

    /// Hash of the field's subtree (the field's own hash tree root).
    pub fn field_root(&self, pool: &mut NodePool, field: usize) -> Result<[u8; 32], TreeError> {
        let node = self.field_node(pool, field)?;
        pool.get_root(node)
    }

    /// Leaf contents of a basic field.
    pub fn field_leaf(&self, pool: &NodePool, field: usize) -> Result<[u8; 32], TreeError> {
        let node = self.field_node(pool, field)?;
        pool.get_leaf(node)
    }

    /// Stage a replacement subtree for a composite field; ownership of
    /// `node` transfers in.
    pub fn set_field(&mut self, pool: &mut NodePool, field: usize, node: NodeId) -> Result<(), TreeError> {
        let gindex = self.field_gindex(field)?;
        self.core.stage(pool, gindex, node)
    }

    /// Stage a basic field's leaf value.
    pub fn set_field_leaf(&mut self, pool: &mut NodePool, field: usize, value: &[u8; 32]) -> Result<(), TreeError> {
        let leaf = pool.create_leaf(value);
        self.set_field(pool, field, leaf)
    }

    /// Stage a packed uint field.
    pub fn set_field_uint(&mut self, pool: &mut NodePool, field: usize, value: u64) -> Result<(), TreeError> {
        let leaf = pool.create_leaf_from_uint(value);
        self.set_field(pool, field, leaf)
    }

    pub fn has_changes(&self) -> bool {
        self.core.has_changes()
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
    use crate::hashing::{hash_two, merkleize_leaves};

    #[test]
    fn two_field_container_root() {
        let mut pool = NodePool::new();
        // Checkpoint-shaped: a uint leaf and a 32-byte root.
        let epoch = pool.create_leaf_from_uint(42);
        let root_field = pool.create_leaf(&[1u8; 32]);
        let mut container = ContainerView::from_field_nodes(&mut pool, &[epoch, root_field]).unwrap();

        let mut epoch_leaf = [0u8; 32];
        epoch_leaf[..8].copy_from_slice(&42u64.to_le_bytes());
        assert_eq!(
            container.hash_tree_root(&mut pool).unwrap(),
            hash_two(&epoch_leaf, &[1u8; 32])
        );
    }

    #[test]
    fn set_field_updates_only_that_subtree() {
        let mut pool = NodePool::new();
        let fields: Vec<NodeId> = (0..5u8).map(|i| pool.create_leaf(&[i; 32])).collect();
        let mut container = ContainerView::from_field_nodes(&mut pool, &fields).unwrap();
        let before = container.hash_tree_root(&mut pool).unwrap();

        container.set_field_uint(&mut pool, 2, 7).unwrap();
        let after = container.hash_tree_root(&mut pool).unwrap();
        assert_ne!(before, after);

        let mut expected_leaves = vec![[0u8; 32]; 5];
        for (i, leaf) in expected_leaves.iter_mut().enumerate() {
            *leaf = [i as u8; 32];
        }
        expected_leaves[2] = {
            let mut chunk = [0u8; 32];
            chunk[..8].copy_from_slice(&7u64.to_le_bytes());
            chunk
        };
        assert_eq!(after, merkleize_leaves(&expected_leaves, 3));
        assert_eq!(container.field_leaf(&pool, 2).unwrap(), expected_leaves[2]);
    }

    #[test]
    fn take_then_set_round_trips_ownership() {
        let mut pool = NodePool::new();
        let fields: Vec<NodeId> = (0..3u8).map(|i| pool.create_leaf(&[i; 32])).collect();
        let mut container = ContainerView::from_field_nodes(&mut pool, &fields).unwrap();

        let taken = container.take_field(&mut pool, 1).unwrap();
        // Mutate a copy derived from the taken node and put it back.
        let replacement = pool.create_leaf(&[0x77; 32]);
        pool.unref_node(taken).unwrap();
        container.set_field(&mut pool, 1, replacement).unwrap();

        assert_eq!(container.field_leaf(&pool, 1).unwrap(), [0x77; 32]);
        container.commit(&mut pool).unwrap();
        assert_eq!(container.field_leaf(&pool, 1).unwrap(), [0x77; 32]);
    }

    #[test]
    fn out_of_range_field_is_rejected() {
        let mut pool = NodePool::new();
        let fields: Vec<NodeId> = (0..4u8).map(|i| pool.create_leaf(&[i; 32])).collect();
        let container = ContainerView::from_field_nodes(&mut pool, &fields).unwrap();
        assert!(matches!(
            container.field_node(&pool, 4),
            Err(TreeError::IndexOutOfBounds { .. })
        ));
    }
}
