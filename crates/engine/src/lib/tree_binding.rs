//! Pool-backed Merkle tree of a beacon state.
//!
//! The registry-scale fields (validators, balances, participation,
//! inactivity scores) and the per-slot hash vectors live as real subtrees
//! maintained through the tree views: commits diff the current value
//! against the last committed snapshot and re-hash only the chunks that
//! changed. The remaining fields are small; their subtree commitments are
//! recomputed from the value on every commit and staged only when they
//! moved.

use std::collections::HashMap;

use beacon_tree::view::{BasicListView, BasicVectorView, CompositeListView, ContainerView};
use beacon_tree::{NodeId, NodePool, TreeError};
use tree_hash::TreeHash;

use crate::consts;
use crate::containers::{Hash256, Validator};
use crate::eth_spec::{self, Unsigned};
use crate::fork::ForkSeq;
use crate::state::{state_fields, BeaconState, StateField};

/// Which fields are tree-mirrored rather than recomputed from the value.
fn is_list_backed(field: StateField, fork: ForkSeq) -> bool {
    match field {
        StateField::Validators | StateField::Balances => true,
        StateField::PreviousEpochParticipation
        | StateField::CurrentEpochParticipation
        | StateField::InactivityScores => fork.gte(ForkSeq::Altair),
        StateField::BlockRoots
        | StateField::StateRoots
        | StateField::RandaoMixes
        | StateField::Slashings => true,
        _ => false,
    }
}

/// Rebuild one validator's element subtree: eight field leaves (the pubkey
/// collapses to its own two-chunk root) merkleized at depth 3.
fn validator_subtree(pool: &mut NodePool, validator: &Validator) -> Result<NodeId, TreeError> {
    let leaves = [
        validator.pubkey.tree_hash_root().0,
        validator.withdrawal_credentials.0,
        uint_leaf(validator.effective_balance),
        uint_leaf(validator.slashed as u64),
        uint_leaf(validator.activation_eligibility_epoch),
        uint_leaf(validator.activation_epoch),
        uint_leaf(validator.exit_epoch),
        uint_leaf(validator.withdrawable_epoch),
    ];
    let nodes: Vec<NodeId> = leaves.iter().map(|leaf| pool.create_leaf(leaf)).collect();
    pool.fill_with_contents(&nodes, 3)
}

fn uint_leaf(value: u64) -> [u8; 32] {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

pub struct StateTree {
    fields: Vec<StateField>,
    container: ContainerView,
    /// Last staged commitment per field position, to skip untouched fields.
    committed_field_roots: Vec<Hash256>,

    validators: CompositeListView,
    committed_validators: Vec<Validator>,

    balances: BasicListView<u64>,
    committed_balances: Vec<u64>,

    block_roots: BasicVectorView<[u8; 32]>,
    committed_block_roots: Vec<[u8; 32]>,
    state_roots: BasicVectorView<[u8; 32]>,
    committed_state_roots: Vec<[u8; 32]>,
    randao_mixes: BasicVectorView<[u8; 32]>,
    committed_randao_mixes: Vec<[u8; 32]>,
    slashings: BasicVectorView<u64>,
    committed_slashings: Vec<u64>,

    previous_participation: Option<BasicListView<u8>>,
    committed_previous_participation: Vec<u8>,
    current_participation: Option<BasicListView<u8>>,
    committed_current_participation: Vec<u8>,
    inactivity_scores: Option<BasicListView<u64>>,
    committed_inactivity_scores: Vec<u64>,
}

impl StateTree {
    /// Build the full tree for `state`. `overrides` maps container fields to
    /// caller-owned precomputed subtrees (the seed-state reuse path); the
    /// builder refs an override when attaching it and, on any failure,
    /// releases only the nodes it created itself.
    pub fn build(
        pool: &mut NodePool,
        state: &BeaconState,
        overrides: &HashMap<StateField, NodeId>,
    ) -> Result<Self, TreeError> {
        let mut owned: Vec<NodeId> = Vec::new();
        match Self::build_inner(pool, state, overrides, &mut owned) {
            Ok(tree) => Ok(tree),
            Err(error) => {
                for node in owned.into_iter().rev() {
                    // Already-consumed nodes were transferred into parents
                    // that are themselves in the list; unref tolerates the
                    // order because parents are appended last.
                    let _ = pool.unref_node(node);
                }
                Err(error)
            }
        }
    }

    fn build_inner(
        pool: &mut NodePool,
        state: &BeaconState,
        overrides: &HashMap<StateField, NodeId>,
        owned: &mut Vec<NodeId>,
    ) -> Result<Self, TreeError> {
        let fork = state.fork_seq;
        let fields = state_fields(fork);

        // Registry lists.
        let validators = match overrides.get(&StateField::Validators) {
            Some(&node) => {
                pool.ref_node(node)?;
                CompositeListView::new(node, eth_spec::ValidatorRegistryLimit::to_u64())
            }
            None => {
                let mut elements = Vec::with_capacity(state.validators.len());
                for validator in state.validators.iter() {
                    let element = validator_subtree(pool, validator)?;
                    elements.push(element);
                }
                let view = CompositeListView::from_element_nodes(
                    pool,
                    &elements,
                    eth_spec::ValidatorRegistryLimit::to_u64(),
                )?;
                view
            }
        };
        owned.push(validators.root());

        let balances = BasicListView::from_values(
            pool,
            &state.balances,
            eth_spec::ValidatorRegistryLimit::to_u64(),
        )?;
        owned.push(balances.root());

        let block_roots = Self::hash_vector_view(pool, &state.block_roots)?;
        owned.push(block_roots.root());
        let state_roots = Self::hash_vector_view(pool, &state.state_roots)?;
        owned.push(state_roots.root());
        let randao_mixes = Self::hash_vector_view(pool, &state.randao_mixes)?;
        owned.push(randao_mixes.root());
        let slashings = Self::u64_vector_view(pool, &state.slashings)?;
        owned.push(slashings.root());

        let altair = fork.gte(ForkSeq::Altair);
        let previous_participation = if altair {
            let view = match overrides.get(&StateField::PreviousEpochParticipation) {
                Some(&node) => {
                    pool.ref_node(node)?;
                    BasicListView::new(node, eth_spec::ValidatorRegistryLimit::to_u64())
                }
                None => BasicListView::from_values(
                    pool,
                    &state.previous_epoch_participation,
                    eth_spec::ValidatorRegistryLimit::to_u64(),
                )?,
            };
            owned.push(view.root());
            Some(view)
        } else {
            None
        };
        let current_participation = if altair {
            let view = BasicListView::from_values(
                pool,
                &state.current_epoch_participation,
                eth_spec::ValidatorRegistryLimit::to_u64(),
            )?;
            owned.push(view.root());
            Some(view)
        } else {
            None
        };
        let inactivity_scores = if altair {
            let view = match overrides.get(&StateField::InactivityScores) {
                Some(&node) => {
                    pool.ref_node(node)?;
                    BasicListView::new(node, eth_spec::ValidatorRegistryLimit::to_u64())
                }
                None => BasicListView::from_values(
                    pool,
                    &state.inactivity_scores,
                    eth_spec::ValidatorRegistryLimit::to_u64(),
                )?,
            };
            owned.push(view.root());
            Some(view)
        } else {
            None
        };

        // Assemble the container: list-backed fields contribute their view
        // roots (one extra reference each, the container's share), the rest
        // contribute their value commitment as a leaf.
        let mut field_nodes = Vec::with_capacity(fields.len());
        let mut committed_field_roots = Vec::with_capacity(fields.len());
        for field in &fields {
            let node = if is_list_backed(*field, fork) {
                let root = match field {
                    StateField::Validators => validators.root(),
                    StateField::Balances => balances.root(),
                    StateField::BlockRoots => block_roots.root(),
                    StateField::StateRoots => state_roots.root(),
                    StateField::RandaoMixes => randao_mixes.root(),
                    StateField::Slashings => slashings.root(),
                    StateField::PreviousEpochParticipation => {
                        previous_participation.as_ref().map(|v| v.root()).unwrap_or(NodeId(0))
                    }
                    StateField::CurrentEpochParticipation => {
                        current_participation.as_ref().map(|v| v.root()).unwrap_or(NodeId(0))
                    }
                    StateField::InactivityScores => {
                        inactivity_scores.as_ref().map(|v| v.root()).unwrap_or(NodeId(0))
                    }
                    _ => unreachable!("not list-backed"),
                };
                pool.ref_node(root)?;
                root
            } else {
                let leaf = pool.create_leaf(&state.field_root(*field).0);
                owned.push(leaf);
                leaf
            };
            field_nodes.push(node);
        }
        for field in &fields {
            committed_field_roots.push(state.field_root(*field));
        }

        let container = ContainerView::from_field_nodes(pool, &field_nodes)?;
        owned.push(container.root());

        Ok(StateTree {
            fields,
            container,
            committed_field_roots,
            committed_validators: state.validators.to_vec(),
            validators,
            committed_balances: state.balances.to_vec(),
            balances,
            committed_block_roots: state.block_roots.iter().map(|h| h.0).collect(),
            block_roots,
            committed_state_roots: state.state_roots.iter().map(|h| h.0).collect(),
            state_roots,
            committed_randao_mixes: state.randao_mixes.iter().map(|h| h.0).collect(),
            randao_mixes,
            committed_slashings: state.slashings.to_vec(),
            slashings,
            committed_previous_participation: state.previous_epoch_participation.to_vec(),
            previous_participation,
            committed_current_participation: state.current_epoch_participation.to_vec(),
            current_participation,
            committed_inactivity_scores: state.inactivity_scores.to_vec(),
            inactivity_scores,
        })
    }

    fn hash_vector_view(
        pool: &mut NodePool,
        values: &[Hash256],
    ) -> Result<BasicVectorView<[u8; 32]>, TreeError> {
        let chunks: Vec<NodeId> = values.iter().map(|h| pool.create_leaf(&h.0)).collect();
        let depth = depth_for_chunks(chunks.len() as u64);
        let root = pool.fill_with_contents(&chunks, depth)?;
        Ok(BasicVectorView::new(root, values.len() as u64))
    }

    fn u64_vector_view(
        pool: &mut NodePool,
        values: &[u64],
    ) -> Result<BasicVectorView<u64>, TreeError> {
        let mut chunks = vec![[0u8; 32]; values.len().div_ceil(4)];
        for (i, value) in values.iter().enumerate() {
            chunks[i / 4][(i % 4) * 8..(i % 4) * 8 + 8].copy_from_slice(&value.to_le_bytes());
        }
        let nodes: Vec<NodeId> = chunks.iter().map(|c| pool.create_leaf(c)).collect();
        let depth = depth_for_chunks(nodes.len() as u64);
        let root = pool.fill_with_contents(&nodes, depth)?;
        Ok(BasicVectorView::new(root, values.len() as u64))
    }

    /// Re-sync every mirrored subtree against the state, restage moved
    /// fields, and produce the new state root.
    pub fn commit(&mut self, pool: &mut NodePool, state: &BeaconState) -> Result<Hash256, TreeError> {
        // Validators: diff against the committed snapshot, rebuild changed
        // elements, push appended ones.
        let shared = self.committed_validators.len().min(state.validators.len());
        for index in 0..shared {
            if self.committed_validators[index] != state.validators[index] {
                let element = validator_subtree(pool, &state.validators[index])?;
                self.validators.set(pool, index as u64, element)?;
            }
        }
        for index in shared..state.validators.len() {
            let element = validator_subtree(pool, &state.validators[index])?;
            self.validators.push(pool, element)?;
        }
        self.validators.commit(pool)?;
        self.committed_validators = state.validators.to_vec();

        sync_basic_list(pool, &mut self.balances, &mut self.committed_balances, &state.balances)?;

        sync_vector(pool, &mut self.block_roots, &mut self.committed_block_roots,
            &state.block_roots.iter().map(|h| h.0).collect::<Vec<_>>())?;
        sync_vector(pool, &mut self.state_roots, &mut self.committed_state_roots,
            &state.state_roots.iter().map(|h| h.0).collect::<Vec<_>>())?;
        sync_vector(pool, &mut self.randao_mixes, &mut self.committed_randao_mixes,
            &state.randao_mixes.iter().map(|h| h.0).collect::<Vec<_>>())?;
        sync_vector(pool, &mut self.slashings, &mut self.committed_slashings, &state.slashings)?;

        if let Some(view) = self.previous_participation.as_mut() {
            sync_basic_list(
                pool,
                view,
                &mut self.committed_previous_participation,
                &state.previous_epoch_participation,
            )?;
        }
        if let Some(view) = self.current_participation.as_mut() {
            sync_basic_list(
                pool,
                view,
                &mut self.committed_current_participation,
                &state.current_epoch_participation,
            )?;
        }
        if let Some(view) = self.inactivity_scores.as_mut() {
            sync_basic_list(
                pool,
                view,
                &mut self.committed_inactivity_scores,
                &state.inactivity_scores,
            )?;
        }

        // Restage fields whose commitment moved.
        let fork = state.fork_seq;
        for (position, field) in self.fields.clone().into_iter().enumerate() {
            if is_list_backed(field, fork) {
                let root = match field {
                    StateField::Validators => self.validators.root(),
                    StateField::Balances => self.balances.root(),
                    StateField::BlockRoots => self.block_roots.root(),
                    StateField::StateRoots => self.state_roots.root(),
                    StateField::RandaoMixes => self.randao_mixes.root(),
                    StateField::Slashings => self.slashings.root(),
                    StateField::PreviousEpochParticipation => {
                        self.previous_participation.as_ref().map(|v| v.root()).unwrap_or(NodeId(0))
                    }
                    StateField::CurrentEpochParticipation => {
                        self.current_participation.as_ref().map(|v| v.root()).unwrap_or(NodeId(0))
                    }
                    StateField::InactivityScores => {
                        self.inactivity_scores.as_ref().map(|v| v.root()).unwrap_or(NodeId(0))
                    }
                    _ => unreachable!("not list-backed"),
                };
                if self.container.field_node(pool, position)? != root {
                    pool.ref_node(root)?;
                    self.container.set_field(pool, position, root)?;
                }
            } else {
                let value_root = state.field_root(field);
                if self.committed_field_roots[position] != value_root {
                    self.container.set_field_leaf(pool, position, &value_root.0)?;
                    self.committed_field_roots[position] = value_root;
                }
            }
        }

        Ok(Hash256::from(self.container.hash_tree_root(pool)?))
    }

    pub fn root_node(&self) -> NodeId {
        self.container.root()
    }

    /// A cheap fork of the tree for speculative execution: shares every
    /// subtree via refcounts, duplicates only the snapshots.
    pub fn clone_in(&self, pool: &mut NodePool) -> Result<Self, TreeError> {
        let clone_list = |pool: &mut NodePool, view: &CompositeListView| -> Result<CompositeListView, TreeError> {
            pool.ref_node(view.root())?;
            Ok(CompositeListView::new(view.root(), eth_spec::ValidatorRegistryLimit::to_u64()))
        };
        let clone_basic_u64 = |pool: &mut NodePool, view: &BasicListView<u64>| -> Result<BasicListView<u64>, TreeError> {
            pool.ref_node(view.root())?;
            Ok(BasicListView::new(view.root(), eth_spec::ValidatorRegistryLimit::to_u64()))
        };
        let clone_basic_u8 = |pool: &mut NodePool, view: &BasicListView<u8>| -> Result<BasicListView<u8>, TreeError> {
            pool.ref_node(view.root())?;
            Ok(BasicListView::new(view.root(), eth_spec::ValidatorRegistryLimit::to_u64()))
        };

        pool.ref_node(self.container.root())?;
        let container = ContainerView::new(self.container.root(), self.fields.len());

        let validators = clone_list(pool, &self.validators)?;
        let balances = clone_basic_u64(pool, &self.balances)?;
        let clone_vector_hash = |pool: &mut NodePool, view: &BasicVectorView<[u8; 32]>, len: u64| -> Result<BasicVectorView<[u8; 32]>, TreeError> {
            pool.ref_node(view.root())?;
            Ok(BasicVectorView::new(view.root(), len))
        };
        let block_roots =
            clone_vector_hash(pool, &self.block_roots, consts::SLOTS_PER_HISTORICAL_ROOT)?;
        let state_roots =
            clone_vector_hash(pool, &self.state_roots, consts::SLOTS_PER_HISTORICAL_ROOT)?;
        let randao_mixes =
            clone_vector_hash(pool, &self.randao_mixes, consts::EPOCHS_PER_HISTORICAL_VECTOR)?;
        pool.ref_node(self.slashings.root())?;
        let slashings =
            BasicVectorView::new(self.slashings.root(), consts::EPOCHS_PER_SLASHINGS_VECTOR);

        let previous_participation = match &self.previous_participation {
            Some(view) => Some(clone_basic_u8(pool, view)?),
            None => None,
        };
        let current_participation = match &self.current_participation {
            Some(view) => Some(clone_basic_u8(pool, view)?),
            None => None,
        };
        let inactivity_scores = match &self.inactivity_scores {
            Some(view) => Some(clone_basic_u64(pool, view)?),
            None => None,
        };

        Ok(StateTree {
            fields: self.fields.clone(),
            container,
            committed_field_roots: self.committed_field_roots.clone(),
            validators,
            committed_validators: self.committed_validators.clone(),
            balances,
            committed_balances: self.committed_balances.clone(),
            block_roots,
            committed_block_roots: self.committed_block_roots.clone(),
            state_roots,
            committed_state_roots: self.committed_state_roots.clone(),
            randao_mixes,
            committed_randao_mixes: self.committed_randao_mixes.clone(),
            slashings,
            committed_slashings: self.committed_slashings.clone(),
            previous_participation,
            committed_previous_participation: self.committed_previous_participation.clone(),
            current_participation,
            committed_current_participation: self.committed_current_participation.clone(),
            inactivity_scores,
            committed_inactivity_scores: self.committed_inactivity_scores.clone(),
        })
    }

    /// Release every reference this tree holds.
    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TreeError> {
        self.validators.deinit(pool)?;
        self.balances.deinit(pool)?;
        self.block_roots.deinit(pool)?;
        self.state_roots.deinit(pool)?;
        self.randao_mixes.deinit(pool)?;
        self.slashings.deinit(pool)?;
        if let Some(view) = self.previous_participation.as_mut() {
            view.deinit(pool)?;
        }
        if let Some(view) = self.current_participation.as_mut() {
            view.deinit(pool)?;
        }
        if let Some(view) = self.inactivity_scores.as_mut() {
            view.deinit(pool)?;
        }
        self.container.deinit(pool)
    }
}

fn depth_for_chunks(chunks: u64) -> usize {
    if chunks <= 1 {
        0
    } else {
        (64 - (chunks - 1).leading_zeros()) as usize
    }
}

fn sync_basic_list<T>(
    pool: &mut NodePool,
    view: &mut BasicListView<T>,
    committed: &mut Vec<T>,
    current: &[T],
) -> Result<(), TreeError>
where
    T: beacon_tree::view::BasicChunked + Copy,
{
    let shared = committed.len().min(current.len());
    for index in 0..shared {
        if committed[index] != current[index] {
            view.set(pool, index as u64, current[index])?;
        }
    }
    for value in current.iter().skip(shared) {
        view.push(pool, *value)?;
    }
    debug_assert!(current.len() >= committed.len(), "state lists never shrink");
    view.commit(pool)?;
    *committed = current.to_vec();
    Ok(())
}

fn sync_vector<T>(
    pool: &mut NodePool,
    view: &mut BasicVectorView<T>,
    committed: &mut Vec<T>,
    current: &[T],
) -> Result<(), TreeError>
where
    T: beacon_tree::view::BasicChunked + Copy,
{
    debug_assert_eq!(committed.len(), current.len());
    for index in 0..current.len() {
        if committed[index] != current[index] {
            view.set(pool, index as u64, current[index])?;
            committed[index] = current[index];
        }
    }
    view.commit(pool)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BeaconConfig;
    use crate::containers::BlsPublicKey;

    fn small_state(fork: ForkSeq, validator_count: usize) -> BeaconState {
        let config = BeaconConfig::minimal();
        let mut state = BeaconState::empty(fork, &config);
        for i in 0..validator_count {
            let mut pubkey = vec![0u8; 48];
            pubkey[0] = i as u8 + 1;
            state
                .validators
                .push(Validator {
                    pubkey: BlsPublicKey::from(pubkey),
                    withdrawal_credentials: Hash256::repeat_byte(i as u8),
                    effective_balance: 32_000_000_000,
                    slashed: false,
                    activation_eligibility_epoch: 0,
                    activation_epoch: 0,
                    exit_epoch: u64::MAX,
                    withdrawable_epoch: u64::MAX,
                })
                .unwrap();
            state.balances.push(32_000_000_000 + i as u64).unwrap();
            if fork.gte(ForkSeq::Altair) {
                state.previous_epoch_participation.push(0).unwrap();
                state.current_epoch_participation.push(0).unwrap();
                state.inactivity_scores.push(0).unwrap();
            }
        }
        state
    }

    #[test]
    fn tree_root_matches_value_root() {
        for fork in [ForkSeq::Phase0, ForkSeq::Altair, ForkSeq::Electra, ForkSeq::Fulu] {
            let state = small_state(fork, 5);
            let mut pool = NodePool::new();
            let mut tree = StateTree::build(&mut pool, &state, &HashMap::new()).unwrap();
            assert_eq!(tree.commit(&mut pool, &state).unwrap(), state.hash_tree_root());
        }
    }

    #[test]
    fn incremental_commit_tracks_mutations() {
        let mut state = small_state(ForkSeq::Electra, 8);
        let mut pool = NodePool::new();
        let mut tree = StateTree::build(&mut pool, &state, &HashMap::new()).unwrap();
        tree.commit(&mut pool, &state).unwrap();

        state.slot = 77;
        state.balances[3] += 1_000;
        state.validators[2].slashed = true;
        state.set_randao_mix(3, Hash256::repeat_byte(0xEE));
        state.current_epoch_participation[5] = 0b111;

        assert_eq!(tree.commit(&mut pool, &state).unwrap(), state.hash_tree_root());
    }

    #[test]
    fn appends_are_tracked() {
        let mut state = small_state(ForkSeq::Electra, 3);
        let mut pool = NodePool::new();
        let mut tree = StateTree::build(&mut pool, &state, &HashMap::new()).unwrap();
        tree.commit(&mut pool, &state).unwrap();

        let mut pubkey = vec![0u8; 48];
        pubkey[0] = 0xAA;
        state
            .validators
            .push(Validator {
                pubkey: BlsPublicKey::from(pubkey),
                withdrawal_credentials: Hash256::ZERO,
                effective_balance: 1_000_000_000,
                slashed: false,
                activation_eligibility_epoch: u64::MAX,
                activation_epoch: u64::MAX,
                exit_epoch: u64::MAX,
                withdrawable_epoch: u64::MAX,
            })
            .unwrap();
        state.balances.push(1_000_000_000).unwrap();
        state.previous_epoch_participation.push(0).unwrap();
        state.current_epoch_participation.push(0).unwrap();
        state.inactivity_scores.push(0).unwrap();

        assert_eq!(tree.commit(&mut pool, &state).unwrap(), state.hash_tree_root());
    }

    #[test]
    fn overrides_reuse_seed_subtrees() {
        let state = small_state(ForkSeq::Electra, 6);
        let mut pool = NodePool::new();
        let mut seed_tree = StateTree::build(&mut pool, &state, &HashMap::new()).unwrap();
        seed_tree.commit(&mut pool, &state).unwrap();

        let mut overrides = HashMap::new();
        overrides.insert(StateField::Validators, seed_tree.validators.root());
        overrides.insert(StateField::InactivityScores, seed_tree.inactivity_scores.as_ref().unwrap().root());

        let mut sibling = StateTree::build(&mut pool, &state, &overrides).unwrap();
        assert_eq!(sibling.commit(&mut pool, &state).unwrap(), state.hash_tree_root());
        // The validators subtree is shared, not rebuilt.
        assert_eq!(sibling.validators.root(), seed_tree.validators.root());
    }

    #[test]
    fn clone_shares_subtrees_and_diverges_on_write() {
        let mut state = small_state(ForkSeq::Electra, 4);
        let mut pool = NodePool::new();
        let mut tree = StateTree::build(&mut pool, &state, &HashMap::new()).unwrap();
        let base_root = tree.commit(&mut pool, &state).unwrap();

        let mut forked = tree.clone_in(&mut pool).unwrap();
        let mut forked_state = state.clone();
        forked_state.balances[0] += 5;
        let forked_root = forked.commit(&mut pool, &forked_state).unwrap();
        assert_ne!(forked_root, base_root);

        // The original tree still commits to the original state.
        assert_eq!(tree.commit(&mut pool, &state).unwrap(), base_root);
        assert_eq!(state.hash_tree_root(), base_root);
        assert_eq!(forked_state.hash_tree_root(), forked_root);
    }
}
