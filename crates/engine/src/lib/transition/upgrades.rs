//! Irregular state upgrades at fork activation epochs. Each rewrites the
//! fork record, appends the fork's new fields, and bumps the tag.

use crate::caches::epoch_cache::compute_sync_committee;
use crate::caches::EpochCache;
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{fork_version, Fork, VariableList};
use crate::errors::TransitionError;
use crate::fork::ForkSeq;
use crate::helpers::{compute_activation_exit_epoch, decrease_balance};
use crate::payload::ExecutionPayloadHeader;
use crate::state::BeaconState;

fn bump_fork(state: &mut BeaconState, config: &BeaconConfig, to: ForkSeq) {
    state.fork = Fork {
        previous_version: state.fork.current_version.clone(),
        current_version: fork_version(config.fork_version(to)),
        epoch: state.current_epoch(),
    };
    state.fork_seq = to;
}

pub fn upgrade_to_altair(
    state: &mut BeaconState,
    config: &BeaconConfig,
    cache: &EpochCache,
) -> Result<(), TransitionError> {
    let validator_count = state.validators.len();
    state.previous_epoch_participation = VariableList::from(vec![0u8; validator_count]);
    state.current_epoch_participation = VariableList::from(vec![0u8; validator_count]);
    state.inactivity_scores = VariableList::from(vec![0u64; validator_count]);

    translate_participation(state, cache)?;
    state.previous_epoch_attestations = VariableList::empty();
    state.current_epoch_attestations = VariableList::empty();

    bump_fork(state, config, ForkSeq::Altair);

    let (committee, _) = compute_sync_committee(state, state.current_epoch())?;
    state.current_sync_committee = committee.clone();
    state.next_sync_committee = committee;
    Ok(())
}

/// Replay the pre-fork pending attestations into participation flags so the
/// first post-fork epoch transition rewards them.
fn translate_participation(
    state: &mut BeaconState,
    cache: &EpochCache,
) -> Result<(), TransitionError> {
    let attestations = state.previous_epoch_attestations.to_vec();
    for attestation in &attestations {
        let data = &attestation.data;
        let inclusion_delay = attestation.inclusion_delay;
        let committee = cache.get_beacon_committee(data.slot, data.index)?;

        let mut flag_indices = Vec::new();
        if inclusion_delay
            <= crate::helpers::integer_squareroot(consts::SLOTS_PER_EPOCH)
        {
            flag_indices.push(consts::TIMELY_SOURCE_FLAG_INDEX);
        }
        let matching_target = data.target.root == state.get_block_root(data.target.epoch);
        if matching_target && inclusion_delay <= consts::SLOTS_PER_EPOCH {
            flag_indices.push(consts::TIMELY_TARGET_FLAG_INDEX);
        }
        if matching_target
            && data.beacon_block_root == state.get_block_root_at_slot(data.slot)
            && inclusion_delay == consts::MIN_ATTESTATION_INCLUSION_DELAY
        {
            flag_indices.push(consts::TIMELY_HEAD_FLAG_INDEX);
        }

        for (position, validator_index) in committee.iter().enumerate() {
            if !attestation.aggregation_bits.get(position).unwrap_or(false) {
                continue;
            }
            if let Some(flags) = state
                .previous_epoch_participation
                .get_mut(*validator_index as usize)
            {
                for flag_index in &flag_indices {
                    *flags |= 1 << flag_index;
                }
            }
        }
    }
    Ok(())
}

pub fn upgrade_to_bellatrix(state: &mut BeaconState, config: &BeaconConfig) {
    state.latest_execution_payload_header = ExecutionPayloadHeader::default();
    bump_fork(state, config, ForkSeq::Bellatrix);
}

pub fn upgrade_to_capella(state: &mut BeaconState, config: &BeaconConfig) {
    state.next_withdrawal_index = 0;
    state.next_withdrawal_validator_index = 0;
    state.historical_summaries = VariableList::empty();
    bump_fork(state, config, ForkSeq::Capella);
}

pub fn upgrade_to_deneb(state: &mut BeaconState, config: &BeaconConfig) {
    // The payload header's blob-gas fields join zeroed; no state rewrite.
    bump_fork(state, config, ForkSeq::Deneb);
}

pub fn upgrade_to_electra(state: &mut BeaconState, config: &BeaconConfig) {
    let current_epoch = state.current_epoch();

    let mut earliest_exit_epoch = compute_activation_exit_epoch(current_epoch);
    for validator in state.validators.iter() {
        if validator.exit_epoch != consts::FAR_FUTURE_EPOCH
            && validator.exit_epoch > earliest_exit_epoch
        {
            earliest_exit_epoch = validator.exit_epoch;
        }
    }
    earliest_exit_epoch += 1;

    state.deposit_requests_start_index = consts::UNSET_DEPOSIT_REQUESTS_START_INDEX;
    state.deposit_balance_to_consume = 0;
    state.exit_balance_to_consume =
        config.activation_exit_churn_limit(state.get_total_active_balance());
    state.earliest_exit_epoch = earliest_exit_epoch;
    state.consolidation_balance_to_consume = {
        let total = state.get_total_active_balance();
        config
            .balance_churn_limit(total)
            .saturating_sub(config.activation_exit_churn_limit(total))
    };
    state.earliest_consolidation_epoch = compute_activation_exit_epoch(current_epoch);
    state.pending_deposits = VariableList::empty();
    state.pending_partial_withdrawals = VariableList::empty();
    state.pending_consolidations = VariableList::empty();

    bump_fork(state, config, ForkSeq::Electra);

    // Pre-activation stake re-enters through the pending-deposit queue,
    // ordered by eligibility.
    let mut pre_activation: Vec<(u64, usize)> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, v)| v.activation_epoch == consts::FAR_FUTURE_EPOCH)
        .map(|(i, v)| (v.activation_eligibility_epoch, i))
        .collect();
    pre_activation.sort_unstable();
    for (_, index) in pre_activation {
        queue_entire_balance_and_reset_validator(state, index);
    }

    // Compounding validators queue their excess active balance.
    let compounding: Vec<usize> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, v)| v.has_compounding_withdrawal_credential())
        .map(|(i, _)| i)
        .collect();
    for index in compounding {
        queue_excess_active_balance(state, index);
    }
}

fn queue_entire_balance_and_reset_validator(state: &mut BeaconState, index: usize) {
    let balance = state.balances[index];
    decrease_balance(state, index, balance);
    let validator = &mut state.validators[index];
    validator.effective_balance = 0;
    validator.activation_eligibility_epoch = consts::FAR_FUTURE_EPOCH;
    let pending = crate::containers::PendingDeposit {
        pubkey: validator.pubkey.clone(),
        withdrawal_credentials: validator.withdrawal_credentials,
        amount: balance,
        signature: crate::containers::BlsSignature::from(vec![0u8; 96]),
        slot: consts::GENESIS_SLOT,
    };
    state
        .pending_deposits
        .push(pending)
        .expect("pending deposits bounded by PENDING_DEPOSITS_LIMIT");
}

fn queue_excess_active_balance(state: &mut BeaconState, index: usize) {
    let balance = state.balances[index];
    if balance > consts::MIN_ACTIVATION_BALANCE {
        let excess = balance - consts::MIN_ACTIVATION_BALANCE;
        decrease_balance(state, index, excess);
        let validator = &state.validators[index];
        let pending = crate::containers::PendingDeposit {
            pubkey: validator.pubkey.clone(),
            withdrawal_credentials: validator.withdrawal_credentials,
            amount: excess,
            signature: crate::containers::BlsSignature::from(vec![0u8; 96]),
            slot: consts::GENESIS_SLOT,
        };
        state
            .pending_deposits
            .push(pending)
            .expect("pending deposits bounded by PENDING_DEPOSITS_LIMIT");
    }
}

pub fn upgrade_to_fulu(state: &mut BeaconState, config: &BeaconConfig) -> Result<(), TransitionError> {
    bump_fork(state, config, ForkSeq::Fulu);

    // Seed the lookahead with the proposers of the visible epochs.
    use crate::caches::epoch_cache::compute_proposer_index;
    use crate::helpers::get_seed;

    let increments: Vec<u16> = state
        .validators
        .iter()
        .map(|v| (v.effective_balance / consts::EFFECTIVE_BALANCE_INCREMENT) as u16)
        .collect();
    let current_epoch = state.current_epoch();
    let mut position = 0usize;
    for epoch_offset in 0..=consts::MIN_SEED_LOOKAHEAD {
        let epoch = current_epoch + epoch_offset;
        let active = state.get_active_validator_indices(epoch);
        let epoch_seed = get_seed(state, epoch, consts::DOMAIN_BEACON_PROPOSER);
        for slot_in_epoch in 0..consts::SLOTS_PER_EPOCH {
            let slot = epoch * consts::SLOTS_PER_EPOCH + slot_in_epoch;
            let mut preimage = [0u8; 40];
            preimage[..32].copy_from_slice(&epoch_seed);
            preimage[32..].copy_from_slice(&slot.to_le_bytes());
            let digest = ethereum_hashing::hash_fixed(&preimage);
            let proposer = compute_proposer_index(state.fork_seq, &active, &digest, &increments)?;
            state.proposer_lookahead[position] = proposer as u64;
            position += 1;
        }
    }
    Ok(())
}
