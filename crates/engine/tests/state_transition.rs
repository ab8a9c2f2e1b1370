//! End-to-end transition scenarios on a small synthetic registry.

use std::collections::HashMap;

use beacon_bls::SecretKey;
use beacon_transition::block::{BeaconBlock, BeaconBlockBody, BlockPayload, SignedBeaconBlock};
use beacon_transition::cached_state::CachedBeaconState;
use beacon_transition::config::BeaconConfig;
use beacon_transition::consts;
use beacon_transition::containers::{
    BlsPublicKey, BlsSignature, FixedVector, Hash256, SyncCommittee, Validator,
};
use beacon_transition::engine::Engine;
use beacon_transition::errors::{BlockError, TransitionError};
use beacon_transition::fork::ForkSeq;
use beacon_transition::helpers::{compute_signing_root, compute_signing_root_for_root, get_domain};
use beacon_transition::payload::ExecutionPayload;
use beacon_transition::state::{BeaconState, StateField};
use beacon_transition::transition::StateTransitionOptions;
use tree_hash::TreeHash;

const VALIDATOR_COUNT: usize = 16;

fn test_config() -> BeaconConfig {
    let mut config = BeaconConfig::minimal();
    // Electra-era chain; Fulu stays scheduled in the future.
    config.fulu_fork_epoch = u64::MAX;
    config
}

fn keypairs() -> Vec<SecretKey> {
    (0..VALIDATOR_COUNT)
        .map(|i| {
            let mut ikm = [0u8; 32];
            ikm[0] = i as u8 + 1;
            SecretKey::key_gen(&ikm).unwrap()
        })
        .collect()
}

fn build_state(config: &BeaconConfig, keys: &[SecretKey]) -> BeaconState {
    let mut state = BeaconState::empty(ForkSeq::Electra, config);
    state.genesis_time = 0;

    for (i, key) in keys.iter().enumerate() {
        let mut credentials = [0u8; 32];
        credentials[0] = consts::ETH1_ADDRESS_WITHDRAWAL_PREFIX;
        credentials[31] = i as u8;
        state
            .validators
            .push(Validator {
                pubkey: BlsPublicKey::from(key.public_key().compress().to_vec()),
                withdrawal_credentials: Hash256::from(credentials),
                effective_balance: consts::MAX_EFFECTIVE_BALANCE,
                slashed: false,
                activation_eligibility_epoch: 0,
                activation_epoch: 0,
                exit_epoch: consts::FAR_FUTURE_EPOCH,
                withdrawable_epoch: consts::FAR_FUTURE_EPOCH,
            })
            .unwrap();
        state.balances.push(consts::MAX_EFFECTIVE_BALANCE).unwrap();
        state.previous_epoch_participation.push(0).unwrap();
        state.current_epoch_participation.push(0).unwrap();
        state.inactivity_scores.push(0).unwrap();
    }

    // Sync committee: registry pubkeys cycled to the committee size.
    let pubkeys: Vec<BlsPublicKey> = (0..consts::SYNC_COMMITTEE_SIZE as usize)
        .map(|i| state.validators[i % keys.len()].pubkey.clone())
        .collect();
    let committee = SyncCommittee {
        pubkeys: FixedVector::from(pubkeys),
        aggregate_pubkey: state.validators[0].pubkey.clone(),
    };
    state.current_sync_committee = committee.clone();
    state.next_sync_committee = committee;

    // Genesis-style header over an empty body, state root pending.
    state.latest_block_header.body_root =
        BeaconBlockBody::empty().hash_tree_root_at(ForkSeq::Electra);
    state
}

fn bootstrapped_engine() -> (Engine, CachedBeaconState, Vec<SecretKey>) {
    let config = test_config();
    let keys = keypairs();
    let state = build_state(&config, &keys);
    let mut engine = Engine::new(config);
    let cached = engine.bind_state(state).unwrap();
    (engine, cached, keys)
}

/// A fully signed empty block on top of `pre`, with the correct post-state
/// root baked in.
fn build_signed_block(
    engine: &mut Engine,
    pre: &CachedBeaconState,
    keys: &[SecretKey],
    slot: u64,
) -> SignedBeaconBlock {
    // Advance a throwaway clone to learn the proposer and parent root.
    let mut probe = pre.clone_in(engine.pool()).unwrap();
    engine.process_slots(&mut probe, slot).unwrap();
    let proposer_index = probe.epoch_cache.get_beacon_proposer(slot) as u64;
    let parent_root = probe.state.latest_block_header.tree_hash_root();

    let epoch = slot / consts::SLOTS_PER_EPOCH;
    let proposer_key = &keys[proposer_index as usize];

    let mut body = BeaconBlockBody::empty();
    let domain = get_domain(&probe.state, consts::DOMAIN_RANDAO, epoch);
    let reveal = proposer_key.sign(compute_signing_root(&epoch, domain).as_slice());
    body.randao_reveal = BlsSignature::from(reveal.compress().to_vec());

    let mut payload = ExecutionPayload::default();
    payload.timestamp = probe.state.genesis_time + slot * engine.config().seconds_per_slot;
    // The payload check reads the mix before this block's reveal lands.
    payload.prev_randao = probe.state.get_randao_mix(epoch);
    body.payload = BlockPayload::Full(payload);
    probe.deinit(engine.pool()).unwrap();

    let mut block = BeaconBlock {
        slot,
        proposer_index,
        parent_root,
        state_root: Hash256::ZERO,
        body,
    };

    // First pass computes the post-state root.
    let unsigned = SignedBeaconBlock {
        message: block.clone(),
        signature: BlsSignature::from(vec![0u8; 96]),
    };
    let mut options = StateTransitionOptions::default();
    options.verify_state_root = false;
    options.verify_proposer = false;
    let mut post = engine.state_transition(pre, &unsigned, options).unwrap();
    block.state_root = post.hash_tree_root(engine.pool()).unwrap();
    post.deinit(engine.pool()).unwrap();

    // Second pass signs the final block.
    let domain = get_domain(&pre.state, consts::DOMAIN_BEACON_PROPOSER, epoch);
    let signing_root = compute_signing_root_for_root(
        block.hash_tree_root_at(ForkSeq::Electra),
        domain,
    );
    let signature = keys[proposer_index as usize].sign(signing_root.as_slice());
    SignedBeaconBlock {
        message: block,
        signature: BlsSignature::from(signature.compress().to_vec()),
    }
}

#[test]
fn empty_block_applies_and_root_checks() {
    let (mut engine, pre, keys) = bootstrapped_engine();
    let signed = build_signed_block(&mut engine, &pre, &keys, 1);

    let mut options = StateTransitionOptions::default();
    options.verify_signatures = true;
    let mut post = engine.state_transition(&pre, &signed, options).unwrap();

    assert_eq!(post.state.slot, 1);
    assert_eq!(post.state.latest_block_header.slot, 1);
    assert_eq!(post.state.latest_block_header.state_root, Hash256::ZERO);
    assert_eq!(
        post.hash_tree_root(engine.pool()).unwrap(),
        signed.message.state_root
    );
    // The pre-state is untouched.
    assert_eq!(pre.state.slot, 0);
}

#[test]
fn wrong_state_root_is_fatal_but_pre_state_survives() {
    let (mut engine, pre, keys) = bootstrapped_engine();
    let mut signed = build_signed_block(&mut engine, &pre, &keys, 1);
    signed.message.state_root = Hash256::repeat_byte(0xBA);

    let mut options = StateTransitionOptions::default();
    options.verify_proposer = false; // the tampered root breaks the signature
    let result = engine.state_transition(&pre, &signed, options);
    assert!(matches!(result, Err(TransitionError::PostStateMismatch { .. })));
    assert_eq!(pre.state.slot, 0);
}

#[test]
fn header_validation_failures() {
    let (mut engine, pre, keys) = bootstrapped_engine();
    let good = build_signed_block(&mut engine, &pre, &keys, 1);

    let mut options = StateTransitionOptions::default();
    options.verify_state_root = false;
    options.verify_proposer = false;

    // A block not newer than the latest header.
    let mut stale = good.clone();
    stale.message.slot = 0;
    let result = engine.state_transition(&pre, &stale, options);
    assert!(matches!(
        result,
        Err(TransitionError::Block(BlockError::BlockNotNewerThanLatestHeader { .. }))
    ));

    // A block with the wrong proposer.
    let mut wrong_proposer = good.clone();
    wrong_proposer.message.proposer_index =
        (wrong_proposer.message.proposer_index + 1) % VALIDATOR_COUNT as u64;
    let result = engine.state_transition(&pre, &wrong_proposer, options);
    assert!(matches!(
        result,
        Err(TransitionError::Block(BlockError::BlockProposerIndexMismatch { .. }))
    ));

    // A block with the wrong parent root.
    let mut wrong_parent = good.clone();
    wrong_parent.message.parent_root = Hash256::repeat_byte(0x77);
    let result = engine.state_transition(&pre, &wrong_parent, options);
    assert!(matches!(
        result,
        Err(TransitionError::Block(BlockError::BlockParentRootMismatch { .. }))
    ));
}

#[test]
fn tampered_proposer_signature_fails_the_batch() {
    let (mut engine, pre, keys) = bootstrapped_engine();
    let mut signed = build_signed_block(&mut engine, &pre, &keys, 1);
    // Sign with the wrong key.
    let intruder = &keys[(signed.message.proposer_index as usize + 1) % VALIDATOR_COUNT];
    let fake = intruder.sign(&[0u8; 32]);
    signed.signature = BlsSignature::from(fake.compress().to_vec());

    let result = engine.state_transition(&pre, &signed, StateTransitionOptions::default());
    assert!(matches!(
        result,
        Err(TransitionError::Block(BlockError::SignatureBatchInvalid))
    ));
}

#[test]
fn epoch_boundary_processing_keeps_tree_and_value_roots_equal() {
    let (mut engine, mut cached, _keys) = bootstrapped_engine();
    let boundary = consts::SLOTS_PER_EPOCH + 2;
    engine.process_slots(&mut cached, boundary).unwrap();

    assert_eq!(cached.state.slot, boundary);
    assert_eq!(cached.epoch_cache.epoch, 1);
    let tree_root = cached.hash_tree_root(engine.pool()).unwrap();
    assert_eq!(tree_root, cached.state.hash_tree_root());
    // Effective balances survive the boundary unchanged for a quiet epoch.
    assert!(cached
        .state
        .validators
        .iter()
        .all(|v| v.effective_balance == consts::MAX_EFFECTIVE_BALANCE));
}

#[test]
fn process_slots_backwards_is_rejected() {
    let (mut engine, mut cached, _keys) = bootstrapped_engine();
    engine.process_slots(&mut cached, 5).unwrap();
    let result = engine.process_slots(&mut cached, 3);
    assert!(matches!(result, Err(TransitionError::SlotBehindState { .. })));
}

#[test]
fn state_root_history_is_maintained() {
    let (mut engine, mut cached, _keys) = bootstrapped_engine();
    engine.process_slots(&mut cached, 3).unwrap();

    // Slot 0's root was cached into the history and backfilled into the
    // genesis header.
    let slot0_root = cached.state.state_roots[0];
    assert_ne!(slot0_root, Hash256::ZERO);
    assert_eq!(cached.state.latest_block_header.state_root, slot0_root);
    let header_root = cached.state.latest_block_header.tree_hash_root();
    assert_eq!(cached.state.block_roots[1], header_root);
    assert_eq!(cached.state.block_roots[2], header_root);
}

#[test]
fn failed_load_leaves_no_pool_nodes_behind() {
    let config = test_config();
    let keys = keypairs();
    let state = build_state(&config, &keys);
    let bytes = state.serialize();

    let mut engine = Engine::new(config);
    engine.pool().zero_node(48).unwrap();
    let baseline = engine.pool().nodes_in_use();

    // An override pointing at a node that does not exist fails the bind;
    // everything allocated on the way is released.
    let mut overrides = HashMap::new();
    overrides.insert(StateField::InactivityScores, beacon_tree::NodeId(9_999_999));
    let result = engine.load_state(ForkSeq::Electra, &bytes, &overrides);
    assert!(result.is_err());
    assert_eq!(engine.pool().nodes_in_use(), baseline);
}

#[test]
fn fork_upgrade_walk_from_phase0_to_fulu() {
    let mut config = BeaconConfig::minimal();
    config.altair_fork_epoch = 1;
    config.bellatrix_fork_epoch = 2;
    config.capella_fork_epoch = 3;
    config.deneb_fork_epoch = 4;
    config.electra_fork_epoch = 5;
    config.fulu_fork_epoch = 6;

    let keys = keypairs();
    let mut state = BeaconState::empty(ForkSeq::Phase0, &config);
    for (i, key) in keys.iter().enumerate() {
        let mut credentials = [0u8; 32];
        credentials[0] = consts::ETH1_ADDRESS_WITHDRAWAL_PREFIX;
        credentials[31] = i as u8;
        state
            .validators
            .push(Validator {
                pubkey: BlsPublicKey::from(key.public_key().compress().to_vec()),
                withdrawal_credentials: Hash256::from(credentials),
                effective_balance: consts::MAX_EFFECTIVE_BALANCE,
                slashed: false,
                activation_eligibility_epoch: 0,
                activation_epoch: 0,
                exit_epoch: consts::FAR_FUTURE_EPOCH,
                withdrawable_epoch: consts::FAR_FUTURE_EPOCH,
            })
            .unwrap();
        state.balances.push(consts::MAX_EFFECTIVE_BALANCE).unwrap();
    }
    state.latest_block_header.body_root =
        BeaconBlockBody::empty().hash_tree_root_at(ForkSeq::Phase0);

    let mut engine = Engine::new(config);
    let mut cached = engine.bind_state(state).unwrap();

    let expectations = [
        (1, ForkSeq::Altair),
        (2, ForkSeq::Bellatrix),
        (3, ForkSeq::Capella),
        (4, ForkSeq::Deneb),
        (5, ForkSeq::Electra),
        (6, ForkSeq::Fulu),
    ];
    for (epoch, fork) in expectations {
        engine
            .process_slots(&mut cached, epoch * consts::SLOTS_PER_EPOCH)
            .unwrap();
        assert_eq!(cached.state.fork_seq, fork, "at epoch {epoch}");
        assert_eq!(
            cached.state.fork.current_version.to_vec(),
            engine.config().fork_version(fork).to_vec()
        );
        // Tree and value roots stay in lockstep through each upgrade.
        assert_eq!(
            cached.hash_tree_root(engine.pool()).unwrap(),
            cached.state.hash_tree_root()
        );
    }

    // Altair onboarding gave every validator participation records.
    assert_eq!(
        cached.state.previous_epoch_participation.len(),
        VALIDATOR_COUNT
    );
    assert_eq!(cached.state.inactivity_scores.len(), VALIDATOR_COUNT);
    // The Fulu upgrade populated the lookahead with live proposers.
    assert!(cached
        .state
        .proposer_lookahead
        .iter()
        .all(|p| (*p as usize) < VALIDATOR_COUNT));
}

#[test]
fn serialized_state_round_trips_through_the_engine() {
    let config = test_config();
    let keys = keypairs();
    let state = build_state(&config, &keys);
    let bytes = state.serialize();

    let mut engine = Engine::new(config);
    let mut cached = engine
        .load_state(ForkSeq::Electra, &bytes, &HashMap::new())
        .unwrap();
    assert_eq!(cached.state, state);
    assert_eq!(
        cached.hash_tree_root(engine.pool()).unwrap(),
        state.hash_tree_root()
    );
    assert_eq!(engine.pubkey_index().size() as usize, VALIDATOR_COUNT);
}
