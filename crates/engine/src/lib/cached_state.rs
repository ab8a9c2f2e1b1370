//! A beacon state bound to its pool-backed tree and epoch cache.

use std::collections::HashMap;

use beacon_bls::PubkeyIndex;
use beacon_tree::{NodeId, NodePool};

use crate::caches::EpochCache;
use crate::config::BeaconConfig;
use crate::containers::Hash256;
use crate::errors::TransitionError;
use crate::fork::ForkSeq;
use crate::state::{BeaconState, StateField};
use crate::tree_binding::StateTree;

/// The unit the transition operates on: value state, Merkle tree, and the
/// derived per-epoch caches. One logical task owns it at a time; cloning is
/// the supported way to branch.
pub struct CachedBeaconState {
    pub state: BeaconState,
    pub epoch_cache: EpochCache,
    pub tree: StateTree,
}

impl CachedBeaconState {
    pub fn new(
        pool: &mut NodePool,
        state: BeaconState,
        config: &BeaconConfig,
        pubkey_index: &PubkeyIndex,
    ) -> Result<Self, TransitionError> {
        Self::with_tree_overrides(pool, state, config, pubkey_index, &HashMap::new())
    }

    /// Bind a state whose big subtrees may be supplied by the caller (the
    /// seed-state fast path of the deserializer).
    pub fn with_tree_overrides(
        pool: &mut NodePool,
        state: BeaconState,
        config: &BeaconConfig,
        pubkey_index: &PubkeyIndex,
        overrides: &HashMap<StateField, NodeId>,
    ) -> Result<Self, TransitionError> {
        let epoch_cache = EpochCache::new(&state, config, pubkey_index)?;
        let tree = StateTree::build(pool, &state, overrides)?;
        Ok(CachedBeaconState { state, epoch_cache, tree })
    }

    /// Deserialize and bind in one step.
    pub fn from_ssz_bytes(
        pool: &mut NodePool,
        fork: ForkSeq,
        bytes: &[u8],
        config: &BeaconConfig,
        pubkey_index: &PubkeyIndex,
        overrides: &HashMap<StateField, NodeId>,
    ) -> Result<Self, TransitionError> {
        let state = BeaconState::deserialize(fork, config, bytes)?;
        Self::with_tree_overrides(pool, state, config, pubkey_index, overrides)
    }

    /// Commit pending tree changes and return the state root.
    pub fn hash_tree_root(&mut self, pool: &mut NodePool) -> Result<Hash256, TransitionError> {
        Ok(self.tree.commit(pool, &self.state)?)
    }

    /// Cheap branch for speculative execution: the tree is shared
    /// copy-on-write, the caches share their `Arc`ed shufflings.
    pub fn clone_in(&self, pool: &mut NodePool) -> Result<Self, TransitionError> {
        Ok(CachedBeaconState {
            state: self.state.clone(),
            epoch_cache: self.epoch_cache.clone(),
            tree: self.tree.clone_in(pool)?,
        })
    }

    /// Release the tree's pool references.
    pub fn deinit(&mut self, pool: &mut NodePool) -> Result<(), TransitionError> {
        Ok(self.tree.deinit(pool)?)
    }
}
