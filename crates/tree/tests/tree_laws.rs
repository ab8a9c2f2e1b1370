use beacon_tree::hashing::merkleize_leaves;
use beacon_tree::view::{BasicListView, CompositeListView};
use beacon_tree::{Gindex, NodeId, NodePool};
use proptest::prelude::*;

proptest! {
    // fill_with_contents agrees with flat merkleization for any leaf count
    // that fits the depth.
    #[test]
    fn fill_matches_merkleize(seed_bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let mut pool = NodePool::new();
        let leaves: Vec<[u8; 32]> = seed_bytes.iter().map(|b| [*b; 32]).collect();
        let ids: Vec<NodeId> = leaves.iter().map(|l| pool.create_leaf(l)).collect();
        let root = pool.fill_with_contents(&ids, 5).unwrap();
        prop_assert_eq!(pool.get_root(root).unwrap(), merkleize_leaves(&leaves, 5));
    }

    // A grouped rebuild equals the same edits applied one at a time.
    #[test]
    fn grouped_set_matches_sequential(
        base in proptest::collection::vec(any::<u8>(), 16..=16),
        edits in proptest::collection::btree_map(0u64..16, any::<u8>(), 1..8),
    ) {
        let mut pool = NodePool::new();
        let ids: Vec<NodeId> = base.iter().map(|b| pool.create_leaf(&[*b; 32])).collect();
        let root = pool.fill_with_contents(&ids, 4).unwrap();

        let gindices: Vec<Gindex> =
            edits.keys().map(|i| Gindex::from_depth(4, *i)).collect();
        let grouped_nodes: Vec<NodeId> =
            edits.values().map(|b| pool.create_leaf(&[*b; 32])).collect();
        let grouped = pool.set_nodes_grouped(root, &gindices, &grouped_nodes).unwrap();

        let mut sequential = root;
        pool.ref_node(sequential).unwrap();
        for (index, byte) in &edits {
            let leaf = pool.create_leaf(&[*byte; 32]);
            let next = pool.set_node(sequential, Gindex::from_depth(4, *index), leaf).unwrap();
            pool.unref_node(sequential).unwrap();
            sequential = next;
        }

        prop_assert_eq!(pool.get_root(grouped).unwrap(), pool.get_root(sequential).unwrap());
    }

    // Releasing the final holder of a list tree frees every node it created.
    #[test]
    fn deinit_frees_everything(values in proptest::collection::vec(any::<u64>(), 0..40)) {
        let mut pool = NodePool::new();
        // Intern the zero nodes the list may touch before taking the baseline.
        pool.zero_node(5).unwrap();
        let baseline = pool.nodes_in_use();

        let mut list = BasicListView::<u64>::from_values(&mut pool, &values, 128).unwrap();
        if !values.is_empty() {
            list.set(&pool, 0, 1234).unwrap();
            list.commit(&mut pool).unwrap();
        }
        list.deinit(&mut pool).unwrap();
        prop_assert_eq!(pool.nodes_in_use(), baseline);
    }
}

#[test]
fn composite_slice_chain_shares_storage() {
    let mut pool = NodePool::new();
    let elements: Vec<NodeId> = (0u8..10).map(|i| pool.create_leaf(&[i; 32])).collect();
    let mut list = CompositeListView::from_element_nodes(&mut pool, &elements, 16).unwrap();

    let mut middle = list.slice_from(&mut pool, 4).unwrap();
    assert_eq!(middle.length(&pool).unwrap(), 6);
    let mut head = middle.slice_to(&mut pool, 2).unwrap();
    assert_eq!(head.length(&pool).unwrap(), 3);

    // Elements are the same interned nodes, not copies.
    for offset in 0..3u64 {
        assert_eq!(
            head.get(&pool, offset).unwrap(),
            list.get(&pool, 4 + offset).unwrap()
        );
    }
}
