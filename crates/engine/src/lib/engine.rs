//! The engine handle: one per host context, owning the node pool, the
//! pubkey index, and the chain config. Nothing in this crate is process
//! global; every entry point goes through a handle.

use std::collections::HashMap;
use std::path::Path;

use beacon_bls::{BlsError, PubkeyIndex};
use beacon_tree::{NodeId, NodePool};

use crate::block::SignedBeaconBlock;
use crate::cached_state::CachedBeaconState;
use crate::config::BeaconConfig;
use crate::containers::Slot;
use crate::errors::TransitionError;
use crate::fork::ForkSeq;
use crate::state::StateField;
use crate::transition::{self, StateTransitionOptions};

/// Serialized-state provider; the era-file reader implements this on the
/// host side.
pub trait SerializedStateSource {
    fn read_serialized_state(&mut self) -> std::io::Result<Vec<u8>>;
}

/// Field order doubles as teardown order: the pool drops first (releasing
/// every root), then the pubkey index.
pub struct Engine {
    pool: NodePool,
    pubkey_index: PubkeyIndex,
    config: BeaconConfig,
}

impl Engine {
    pub fn new(config: BeaconConfig) -> Self {
        Engine {
            pool: NodePool::new(),
            pubkey_index: PubkeyIndex::new(),
            config,
        }
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    pub fn pool(&mut self) -> &mut NodePool {
        &mut self.pool
    }

    pub fn pubkey_index(&self) -> &PubkeyIndex {
        &self.pubkey_index
    }

    /// Bootstrap-path write access; serialized with respect to readers by
    /// `&mut self`.
    pub fn pubkey_index_mut(&mut self) -> &mut PubkeyIndex {
        &mut self.pubkey_index
    }

    /// Register every registry pubkey the index does not know yet. Called at
    /// load and after epoch boundaries that onboarded validators.
    pub fn register_validators(&mut self, state: &crate::state::BeaconState) -> Result<(), BlsError> {
        self.pubkey_index.ensure_capacity(state.validators.len());
        for (index, validator) in state.validators.iter().enumerate() {
            if self.pubkey_index.get(index as u32).is_none() {
                self.pubkey_index.set(index as u32, &validator.pubkey)?;
            }
        }
        Ok(())
    }

    /// Deserialize a state, register its validators, and bind it to a fresh
    /// tree. `overrides` may supply precomputed subtrees from a sibling
    /// state.
    pub fn load_state(
        &mut self,
        fork: ForkSeq,
        bytes: &[u8],
        overrides: &HashMap<StateField, NodeId>,
    ) -> Result<CachedBeaconState, TransitionError> {
        let state = crate::state::BeaconState::deserialize(fork, &self.config, bytes)?;
        self.register_validators(&state)?;
        tracing::info!(
            fork = fork.name(),
            slot = state.slot,
            validators = state.validators.len(),
            "loaded beacon state"
        );
        CachedBeaconState::with_tree_overrides(
            &mut self.pool,
            state,
            &self.config,
            &self.pubkey_index,
            overrides,
        )
    }

    pub fn load_state_from(
        &mut self,
        fork: ForkSeq,
        source: &mut dyn SerializedStateSource,
    ) -> Result<CachedBeaconState, TransitionError> {
        let bytes = source
            .read_serialized_state()
            .map_err(|e| TransitionError::Ssz(crate::errors::SszError::DeserializationFailed(e.to_string())))?;
        self.load_state(fork, &bytes, &HashMap::new())
    }

    /// Bind an already-deserialized state.
    pub fn bind_state(
        &mut self,
        state: crate::state::BeaconState,
    ) -> Result<CachedBeaconState, TransitionError> {
        self.register_validators(&state)?;
        CachedBeaconState::new(&mut self.pool, state, &self.config, &self.pubkey_index)
    }

    pub fn process_slots(
        &mut self,
        cached: &mut CachedBeaconState,
        target_slot: Slot,
    ) -> Result<(), TransitionError> {
        transition::process_slots(
            &mut self.pool,
            cached,
            &self.config,
            &self.pubkey_index,
            target_slot,
        )
    }

    pub fn state_transition(
        &mut self,
        pre: &CachedBeaconState,
        signed_block: &SignedBeaconBlock,
        options: StateTransitionOptions,
    ) -> Result<CachedBeaconState, TransitionError> {
        transition::state_transition(
            &mut self.pool,
            pre,
            &self.config,
            &self.pubkey_index,
            signed_block,
            options,
        )
    }

    pub fn save_pubkey_cache(&self, path: &Path) -> Result<(), BlsError> {
        self.pubkey_index.save(path)
    }

    pub fn load_pubkey_cache(&mut self, path: &Path) -> Result<(), BlsError> {
        self.pubkey_index = PubkeyIndex::load(path)?;
        Ok(())
    }
}
