//! The state transition driver: slot advancement, epoch boundaries, fork
//! upgrades, and block application against a cloned pre-state.

pub mod block;
pub mod epoch;
pub mod signatures;
pub mod upgrades;

use tree_hash::TreeHash;

use beacon_bls::{BatchVerifier, PubkeyIndex};
use beacon_tree::NodePool;

use crate::block::SignedBeaconBlock;
use crate::cached_state::CachedBeaconState;
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::Slot;
use crate::errors::{BlockError, TransitionError};
use crate::fork::ForkSeq;

/// Options recognised by `state_transition`.
#[derive(Debug, Clone, Copy)]
pub struct StateTransitionOptions {
    /// Compare the post-state tree hash to `block.state_root`.
    pub verify_state_root: bool,
    /// BLS-verify the block's proposer signature.
    pub verify_proposer: bool,
    /// BLS-verify every signature within the block.
    pub verify_signatures: bool,
    /// Reuse the caller's epoch cache in the post-state instead of
    /// rebuilding one.
    pub transfer_cache: bool,
}

impl Default for StateTransitionOptions {
    fn default() -> Self {
        StateTransitionOptions {
            verify_state_root: true,
            verify_proposer: true,
            verify_signatures: false,
            transfer_cache: true,
        }
    }
}

/// Cache the closing slot's roots: the state root into `state_roots`, the
/// header root into `block_roots`, and the pending header's zeroed
/// state-root backfill.
fn process_slot(
    pool: &mut NodePool,
    cached: &mut CachedBeaconState,
) -> Result<(), TransitionError> {
    let previous_state_root = cached.hash_tree_root(pool)?;
    let slot_index = (cached.state.slot % consts::SLOTS_PER_HISTORICAL_ROOT) as usize;
    cached.state.state_roots[slot_index] = previous_state_root;

    if cached.state.latest_block_header.state_root.is_zero() {
        cached.state.latest_block_header.state_root = previous_state_root;
    }

    let block_root = cached.state.latest_block_header.tree_hash_root();
    cached.state.block_roots[slot_index] = block_root;
    Ok(())
}

/// Advance to `target_slot`, processing epoch boundaries and fork upgrades
/// on the way.
pub fn process_slots(
    pool: &mut NodePool,
    cached: &mut CachedBeaconState,
    config: &BeaconConfig,
    pubkey_index: &PubkeyIndex,
    target_slot: Slot,
) -> Result<(), TransitionError> {
    if target_slot < cached.state.slot {
        return Err(TransitionError::SlotBehindState {
            target: target_slot,
            state_slot: cached.state.slot,
        });
    }
    while cached.state.slot < target_slot {
        process_slot(pool, cached)?;

        let at_epoch_boundary = (cached.state.slot + 1) % consts::SLOTS_PER_EPOCH == 0;
        if at_epoch_boundary {
            epoch::process_epoch(&mut cached.state, &cached.epoch_cache, config)?;
        }

        cached.state.slot += 1;

        if at_epoch_boundary {
            let new_epoch = cached.state.current_epoch();
            apply_fork_upgrades(cached, config, new_epoch)?;
            tracing::debug!(epoch = new_epoch, fork = cached.state.fork_seq.name(), "epoch boundary");
            cached.epoch_cache =
                cached.epoch_cache.rotated(&cached.state, config, pubkey_index)?;
        }
    }
    Ok(())
}

fn apply_fork_upgrades(
    cached: &mut CachedBeaconState,
    config: &BeaconConfig,
    epoch: u64,
) -> Result<(), TransitionError> {
    // Several upgrades may trigger at one epoch on test schedules.
    if cached.state.fork_seq == ForkSeq::Phase0 && config.altair_fork_epoch == epoch {
        upgrades::upgrade_to_altair(&mut cached.state, config, &cached.epoch_cache)?;
        tracing::info!(epoch, "upgraded state to altair");
    }
    if cached.state.fork_seq == ForkSeq::Altair && config.bellatrix_fork_epoch == epoch {
        upgrades::upgrade_to_bellatrix(&mut cached.state, config);
        tracing::info!(epoch, "upgraded state to bellatrix");
    }
    if cached.state.fork_seq == ForkSeq::Bellatrix && config.capella_fork_epoch == epoch {
        upgrades::upgrade_to_capella(&mut cached.state, config);
        tracing::info!(epoch, "upgraded state to capella");
    }
    if cached.state.fork_seq == ForkSeq::Capella && config.deneb_fork_epoch == epoch {
        upgrades::upgrade_to_deneb(&mut cached.state, config);
        tracing::info!(epoch, "upgraded state to deneb");
    }
    if cached.state.fork_seq == ForkSeq::Deneb && config.electra_fork_epoch == epoch {
        upgrades::upgrade_to_electra(&mut cached.state, config);
        tracing::info!(epoch, "upgraded state to electra");
    }
    if cached.state.fork_seq == ForkSeq::Electra && config.fulu_fork_epoch == epoch {
        upgrades::upgrade_to_fulu(&mut cached.state, config)?;
        tracing::info!(epoch, "upgraded state to fulu");
    }
    Ok(())
}

/// Apply one signed block on top of `pre`, returning the post-state. The
/// pre-state is never mutated; all work happens on a copy-on-write clone.
pub fn state_transition(
    pool: &mut NodePool,
    pre: &CachedBeaconState,
    config: &BeaconConfig,
    pubkey_index: &PubkeyIndex,
    signed_block: &SignedBeaconBlock,
    options: StateTransitionOptions,
) -> Result<CachedBeaconState, TransitionError> {
    let mut post = pre.clone_in(pool)?;
    let result = state_transition_inner(pool, &mut post, config, pubkey_index, signed_block, options);
    match result {
        Ok(()) => Ok(post),
        Err(error) => {
            let _ = post.deinit(pool);
            Err(error)
        }
    }
}

fn state_transition_inner(
    pool: &mut NodePool,
    post: &mut CachedBeaconState,
    config: &BeaconConfig,
    pubkey_index: &PubkeyIndex,
    signed_block: &SignedBeaconBlock,
    options: StateTransitionOptions,
) -> Result<(), TransitionError> {
    let block = &signed_block.message;
    process_slots(pool, post, config, pubkey_index, block.slot)?;

    // All BLS work for the block reduces to one batch, verified before any
    // block mutation is applied.
    let mut sets = if options.verify_proposer {
        signatures::proposer_signature_set(&post.state, pubkey_index, signed_block)?
    } else {
        signatures::SignatureSets::default()
    };
    if options.verify_signatures {
        let body_sets = signatures::block_signature_sets(
            &post.state,
            &post.epoch_cache,
            config,
            pubkey_index,
            signed_block,
        )?;
        sets.pubkeys.extend(body_sets.pubkeys);
        sets.messages.extend(body_sets.messages);
        sets.signatures.extend(body_sets.signatures);
    }
    if !sets.is_empty() {
        let valid = BatchVerifier::new()
            .verify_resolved(&sets.pubkeys, &sets.messages, &sets.signatures)?;
        if !valid {
            return Err(BlockError::SignatureBatchInvalid.into());
        }
    }

    block::process_block(&mut post.state, &post.epoch_cache, config, block)?;

    if options.verify_state_root {
        let computed = post.hash_tree_root(pool)?;
        if computed != block.state_root {
            return Err(TransitionError::PostStateMismatch {
                expected: block.state_root,
                computed,
            });
        }
    }

    if !options.transfer_cache {
        post.epoch_cache = crate::caches::EpochCache::new(&post.state, config, pubkey_index)?;
    }
    Ok(())
}
