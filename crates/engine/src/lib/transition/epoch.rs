//! Epoch-boundary processing, in pipeline order.

use tree_hash::TreeHash;

use crate::caches::epoch_cache::compute_sync_committee;
use crate::caches::{EpochCache, EpochTransitionCache};
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{
    Checkpoint, Epoch, Gwei, HistoricalBatch, HistoricalSummary, PendingAttestation, VariableList,
};
use crate::errors::TransitionError;
use crate::fork::ForkSeq;
use crate::helpers::{
    compute_activation_exit_epoch, compute_signing_root, compute_start_slot_at_epoch,
    decrease_balance, increase_balance, initiate_validator_exit, integer_squareroot,
};
use crate::state::BeaconState;

const BASE_REWARDS_PER_EPOCH: u64 = 4;

pub fn process_epoch(
    state: &mut BeaconState,
    cache: &EpochCache,
    config: &BeaconConfig,
) -> Result<(), TransitionError> {
    let fork = state.fork_seq;
    let mut transition_cache = EpochTransitionCache::new(state);

    process_justification_and_finalization(state, cache, &transition_cache)?;
    if fork.gte(ForkSeq::Altair) {
        process_inactivity_updates(state, &transition_cache);
    }
    process_registry_updates(state, config, &transition_cache)?;
    process_slashings(state, &transition_cache);
    process_rewards_and_penalties(state, cache, &mut transition_cache)?;
    process_eth1_data_reset(state);
    if fork.gte(ForkSeq::Electra) {
        process_pending_deposits(state, config)?;
        process_pending_consolidations(state);
    }
    process_effective_balance_updates(state);
    process_slashings_reset(state);
    process_randao_mixes_reset(state);
    if fork.gte(ForkSeq::Capella) {
        process_historical_summaries_update(state);
    } else {
        process_historical_roots_update(state);
    }
    if fork.gte(ForkSeq::Altair) {
        process_participation_flag_updates(state);
    } else {
        process_participation_record_updates(state);
    }
    if fork.gte(ForkSeq::Altair) {
        process_sync_committee_updates(state)?;
    }
    if fork.gte(ForkSeq::Fulu) {
        process_proposer_lookahead(state)?;
    }
    Ok(())
}

/// Matching-target balances: flag tallies from Altair on, attestation-record
/// walks for Phase0.
fn target_balances(
    state: &BeaconState,
    cache: &EpochCache,
    transition_cache: &EpochTransitionCache,
) -> Result<(Gwei, Gwei), TransitionError> {
    if state.fork_seq.gte(ForkSeq::Altair) {
        return Ok((
            transition_cache.previous_target_balance(),
            transition_cache.current_target_balance(),
        ));
    }
    let previous = attesting_balance(
        state,
        cache,
        &matching_target_attestations(state, state.previous_epoch()),
    )?;
    let current = attesting_balance(
        state,
        cache,
        &matching_target_attestations(state, state.current_epoch()),
    )?;
    Ok((previous, current))
}

pub fn process_justification_and_finalization(
    state: &mut BeaconState,
    cache: &EpochCache,
    transition_cache: &EpochTransitionCache,
) -> Result<(), TransitionError> {
    if state.current_epoch() <= consts::GENESIS_EPOCH + 1 {
        return Ok(());
    }
    let (previous_target, current_target) = target_balances(state, cache, transition_cache)?;
    weigh_justification_and_finalization(
        state,
        transition_cache.total_active_balance(),
        previous_target,
        current_target,
    );
    Ok(())
}

fn weigh_justification_and_finalization(
    state: &mut BeaconState,
    total_active_balance: Gwei,
    previous_target_balance: Gwei,
    current_target_balance: Gwei,
) {
    let previous_epoch = state.previous_epoch();
    let current_epoch = state.current_epoch();
    let old_previous_justified = state.previous_justified_checkpoint;
    let old_current_justified = state.current_justified_checkpoint;

    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    let bits = &mut state.justification_bits;
    for i in (1..bits.len()).rev() {
        let lower = bits.get(i - 1).unwrap_or(false);
        let _ = bits.set(i, lower);
    }
    let _ = bits.set(0, false);

    if previous_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: state.get_block_root(previous_epoch),
        };
        let _ = state.justification_bits.set(1, true);
    }
    if current_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: state.get_block_root(current_epoch),
        };
        let _ = state.justification_bits.set(0, true);
    }

    let bits: Vec<bool> = state.justification_bits.iter().collect();
    // 2nd/3rd/4th most recent epochs all justified and chain back to the
    // candidate.
    if bits[1..4].iter().all(|b| *b) && old_previous_justified.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    if bits[1..3].iter().all(|b| *b) && old_previous_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    if bits[..3].iter().all(|b| *b) && old_current_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
    if bits[..2].iter().all(|b| *b) && old_current_justified.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
}

fn is_in_inactivity_leak(state: &BeaconState) -> bool {
    state.previous_epoch().saturating_sub(state.finalized_checkpoint.epoch)
        > consts::MIN_EPOCHS_TO_INACTIVITY_PENALTY
}

fn previous_target_participant(state: &BeaconState, index: usize) -> bool {
    state
        .previous_epoch_participation
        .get(index)
        .map(|flags| flags & (1 << consts::TIMELY_TARGET_FLAG_INDEX) != 0)
        .unwrap_or(false)
}

pub fn process_inactivity_updates(state: &mut BeaconState, transition_cache: &EpochTransitionCache) {
    if state.current_epoch() == consts::GENESIS_EPOCH {
        return;
    }
    let in_leak = is_in_inactivity_leak(state);
    for index in 0..state.validators.len() {
        if !transition_cache.is_eligible(index) {
            continue;
        }
        let unslashed_target =
            !state.validators[index].slashed && previous_target_participant(state, index);
        let score = &mut state.inactivity_scores[index];
        if unslashed_target {
            *score -= std::cmp::min(1, *score);
        } else {
            *score += consts::INACTIVITY_SCORE_BIAS;
        }
        if !in_leak {
            *score -= std::cmp::min(consts::INACTIVITY_SCORE_RECOVERY_RATE, *score);
        }
    }
}

pub fn process_registry_updates(
    state: &mut BeaconState,
    config: &BeaconConfig,
    transition_cache: &EpochTransitionCache,
) -> Result<(), TransitionError> {
    let current_epoch = state.current_epoch();
    let fork = state.fork_seq;
    let electra = fork.gte(ForkSeq::Electra);

    // Eligibility and ejections.
    let mut to_eject = Vec::new();
    for (index, validator) in state.validators.iter_mut().enumerate() {
        if validator.is_eligible_for_activation_queue(electra) {
            validator.activation_eligibility_epoch = current_epoch + 1;
        }
        if validator.is_active_at(current_epoch)
            && validator.effective_balance <= config.ejection_balance
        {
            to_eject.push(index);
        }
    }
    for index in to_eject {
        initiate_validator_exit(state, config, index)?;
    }

    // Activation queue, ordered by eligibility epoch then index.
    let finalized_epoch = state.finalized_checkpoint.epoch;
    let mut queue: Vec<(Epoch, usize)> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, v)| {
            v.activation_eligibility_epoch <= finalized_epoch
                && v.activation_epoch == consts::FAR_FUTURE_EPOCH
        })
        .map(|(i, v)| (v.activation_eligibility_epoch, i))
        .collect();
    queue.sort_unstable();

    let _ = transition_cache;
    let active_count = state
        .validators
        .iter()
        .filter(|v| v.is_active_at(current_epoch))
        .count() as u64;
    let churn = if electra {
        // Electra activates everything eligible; the churn moved to the
        // pending-deposit queue.
        queue.len() as u64
    } else if fork.gte(ForkSeq::Deneb) {
        config.activation_churn_limit(active_count)
    } else {
        config.churn_limit(active_count)
    };
    let activation_epoch = compute_activation_exit_epoch(current_epoch);
    for (_, index) in queue.into_iter().take(churn as usize) {
        state.validators[index].activation_epoch = activation_epoch;
    }
    Ok(())
}

pub fn process_slashings(state: &mut BeaconState, transition_cache: &EpochTransitionCache) {
    let fork = state.fork_seq;
    let total_balance = transition_cache.total_active_balance();
    let sum_slashings: Gwei = state.slashings.iter().sum();
    let multiplier = if fork.gte(ForkSeq::Bellatrix) {
        consts::PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX
    } else if fork.gte(ForkSeq::Altair) {
        consts::PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR
    } else {
        consts::PROPORTIONAL_SLASHING_MULTIPLIER
    };
    let adjusted_total = std::cmp::min(sum_slashings * multiplier, total_balance);
    let increment = consts::EFFECTIVE_BALANCE_INCREMENT;

    let indices = transition_cache.indices_to_slash.clone();
    for index in indices {
        let effective_balance = state.validators[index as usize].effective_balance;
        let penalty = if fork.gte(ForkSeq::Electra) {
            let penalty_per_increment = adjusted_total / (total_balance / increment);
            (effective_balance / increment) * penalty_per_increment
        } else {
            let penalty_numerator = effective_balance / increment * adjusted_total;
            penalty_numerator / total_balance * increment
        };
        decrease_balance(state, index as usize, penalty);
    }
}

pub fn process_rewards_and_penalties(
    state: &mut BeaconState,
    cache: &EpochCache,
    transition_cache: &mut EpochTransitionCache,
) -> Result<(), TransitionError> {
    if state.current_epoch() == consts::GENESIS_EPOCH {
        return Ok(());
    }
    if state.fork_seq.gte(ForkSeq::Altair) {
        altair_deltas(state, transition_cache);
    } else {
        phase0_deltas(state, cache, transition_cache)?;
    }
    transition_cache.apply_deltas(state);
    Ok(())
}

fn altair_deltas(state: &BeaconState, transition_cache: &mut EpochTransitionCache) {
    let fork = state.fork_seq;
    let in_leak = is_in_inactivity_leak(state);
    let total_increments = transition_cache.total_active_increments;
    let base_reward_per_increment = consts::EFFECTIVE_BALANCE_INCREMENT
        * consts::BASE_REWARD_FACTOR
        / integer_squareroot(transition_cache.total_active_balance());
    let inactivity_quotient = if fork.gte(ForkSeq::Bellatrix) {
        consts::INACTIVITY_PENALTY_QUOTIENT_BELLATRIX
    } else {
        consts::INACTIVITY_PENALTY_QUOTIENT_ALTAIR
    };

    for index in 0..state.validators.len() {
        if !transition_cache.is_eligible(index) {
            continue;
        }
        let validator = &state.validators[index];
        let increments = transition_cache.effective_balance_increments[index] as u64;
        let base_reward = increments * base_reward_per_increment;
        let participation = state
            .previous_epoch_participation
            .get(index)
            .copied()
            .unwrap_or(0);
        let unslashed = !validator.slashed;

        for (flag_index, weight) in consts::PARTICIPATION_FLAG_WEIGHTS.iter().enumerate() {
            let participated = unslashed && participation & (1 << flag_index) != 0;
            if participated {
                if !in_leak {
                    let flag_increments = transition_cache.previous_flag_increments[flag_index];
                    let reward_numerator = base_reward * weight * flag_increments;
                    transition_cache.reward(
                        index,
                        reward_numerator / (total_increments * consts::WEIGHT_DENOMINATOR),
                    );
                }
            } else if flag_index != consts::TIMELY_HEAD_FLAG_INDEX {
                transition_cache.penalize(index, base_reward * weight / consts::WEIGHT_DENOMINATOR);
            }
        }

        // Inactivity penalties track the per-validator score.
        if !(unslashed && previous_target_participant(state, index)) {
            let score = state.inactivity_scores.get(index).copied().unwrap_or(0);
            let penalty_numerator = validator.effective_balance * score;
            let penalty_denominator = consts::INACTIVITY_SCORE_BIAS * inactivity_quotient;
            transition_cache.penalize(index, penalty_numerator / penalty_denominator);
        }
    }
}

fn matching_source_attestations(state: &BeaconState, epoch: Epoch) -> Vec<PendingAttestation> {
    if epoch == state.current_epoch() {
        state.current_epoch_attestations.to_vec()
    } else {
        state.previous_epoch_attestations.to_vec()
    }
}

fn matching_target_attestations(state: &BeaconState, epoch: Epoch) -> Vec<PendingAttestation> {
    let target_root = state.get_block_root(epoch);
    matching_source_attestations(state, epoch)
        .into_iter()
        .filter(|a| a.data.target.root == target_root)
        .collect()
}

fn matching_head_attestations(state: &BeaconState, epoch: Epoch) -> Vec<PendingAttestation> {
    matching_target_attestations(state, epoch)
        .into_iter()
        .filter(|a| a.data.beacon_block_root == state.get_block_root_at_slot(a.data.slot))
        .collect()
}

fn attesting_indices(
    cache: &EpochCache,
    attestation: &PendingAttestation,
) -> Result<Vec<u32>, TransitionError> {
    let committee = cache.get_beacon_committee(attestation.data.slot, attestation.data.index)?;
    Ok(committee
        .iter()
        .enumerate()
        .filter(|(position, _)| attestation.aggregation_bits.get(*position).unwrap_or(false))
        .map(|(_, index)| *index)
        .collect())
}

fn unslashed_attesting_indices(
    state: &BeaconState,
    cache: &EpochCache,
    attestations: &[PendingAttestation],
) -> Result<Vec<u32>, TransitionError> {
    let mut indices: Vec<u32> = Vec::new();
    for attestation in attestations {
        indices.extend(attesting_indices(cache, attestation)?);
    }
    indices.sort_unstable();
    indices.dedup();
    indices.retain(|index| !state.validators[*index as usize].slashed);
    Ok(indices)
}

fn attesting_balance(
    state: &BeaconState,
    cache: &EpochCache,
    attestations: &[PendingAttestation],
) -> Result<Gwei, TransitionError> {
    let indices = unslashed_attesting_indices(state, cache, attestations)?;
    let total: Gwei = indices
        .iter()
        .map(|index| state.validators[*index as usize].effective_balance)
        .sum();
    Ok(std::cmp::max(consts::EFFECTIVE_BALANCE_INCREMENT, total))
}

fn phase0_deltas(
    state: &BeaconState,
    cache: &EpochCache,
    transition_cache: &mut EpochTransitionCache,
) -> Result<(), TransitionError> {
    let previous_epoch = state.previous_epoch();
    let total_balance = transition_cache.total_active_balance();
    let total_increments = total_balance / consts::EFFECTIVE_BALANCE_INCREMENT;
    let sqrt_total = integer_squareroot(total_balance);
    let in_leak = is_in_inactivity_leak(state);
    let finality_delay = previous_epoch.saturating_sub(state.finalized_checkpoint.epoch);

    let source_attestations = matching_source_attestations(state, previous_epoch);
    let target_attestations = matching_target_attestations(state, previous_epoch);
    let head_attestations = matching_head_attestations(state, previous_epoch);

    let source_indices = unslashed_attesting_indices(state, cache, &source_attestations)?;
    let target_indices = unslashed_attesting_indices(state, cache, &target_attestations)?;
    let head_indices = unslashed_attesting_indices(state, cache, &head_attestations)?;

    let component_balances = [
        attesting_balance(state, cache, &source_attestations)?,
        attesting_balance(state, cache, &target_attestations)?,
        attesting_balance(state, cache, &head_attestations)?,
    ];
    let component_indices = [&source_indices, &target_indices, &head_indices];

    // Earliest-inclusion attestation per source attester.
    let mut earliest_inclusion: std::collections::HashMap<u32, &PendingAttestation> =
        std::collections::HashMap::new();
    for attestation in &source_attestations {
        for index in attesting_indices(cache, attestation)? {
            match earliest_inclusion.get(&index) {
                Some(existing) if existing.inclusion_delay <= attestation.inclusion_delay => {}
                _ => {
                    earliest_inclusion.insert(index, attestation);
                }
            }
        }
    }

    for index in 0..state.validators.len() {
        if !transition_cache.is_eligible(index) {
            continue;
        }
        let effective_balance = state.validators[index].effective_balance;
        let base_reward = effective_balance * consts::BASE_REWARD_FACTOR
            / sqrt_total
            / BASE_REWARDS_PER_EPOCH;
        let unslashed = !state.validators[index].slashed;

        for (component, balance) in component_indices.iter().zip(component_balances) {
            let attested = unslashed && component.binary_search(&(index as u32)).is_ok();
            if attested {
                if in_leak {
                    transition_cache.reward(index, base_reward);
                } else {
                    let increments = balance / consts::EFFECTIVE_BALANCE_INCREMENT;
                    transition_cache.reward(index, base_reward * increments / total_increments);
                }
            } else {
                transition_cache.penalize(index, base_reward);
            }
        }

        // Inclusion-delay reward follows the earliest source inclusion.
        if let Some(attestation) = earliest_inclusion.get(&(index as u32)) {
            if unslashed {
                let proposer_reward = base_reward / consts::PROPOSER_REWARD_QUOTIENT;
                transition_cache.reward(attestation.proposer_index as usize, proposer_reward);
                let max_attester_reward = base_reward - proposer_reward;
                transition_cache
                    .reward(index, max_attester_reward / attestation.inclusion_delay.max(1));
            }
        }

        if in_leak {
            transition_cache.penalize(index, BASE_REWARDS_PER_EPOCH * base_reward);
            let in_target = unslashed && target_indices.binary_search(&(index as u32)).is_ok();
            if !in_target {
                transition_cache.penalize(
                    index,
                    effective_balance * finality_delay / consts::INACTIVITY_PENALTY_QUOTIENT,
                );
            }
        }
    }
    Ok(())
}

pub fn process_eth1_data_reset(state: &mut BeaconState) {
    let next_epoch = state.current_epoch() + 1;
    if next_epoch % consts::EPOCHS_PER_ETH1_VOTING_PERIOD == 0 {
        state.eth1_data_votes = VariableList::empty();
    }
}

pub fn process_pending_deposits(
    state: &mut BeaconState,
    config: &BeaconConfig,
) -> Result<(), TransitionError> {
    let next_epoch = state.current_epoch() + 1;
    let available_for_processing =
        state.deposit_balance_to_consume + config.activation_exit_churn_limit(state.get_total_active_balance());
    let finalized_slot = compute_start_slot_at_epoch(state.finalized_checkpoint.epoch);

    let mut processed_amount: Gwei = 0;
    let mut next_deposit_index = 0usize;
    let mut deposits_to_postpone = Vec::new();
    let mut churn_limit_reached = false;

    let pending: Vec<_> = state.pending_deposits.to_vec();
    for deposit in &pending {
        // Eth1-bridge deposits must drain before request-sourced ones apply.
        if deposit.slot > consts::GENESIS_SLOT
            && state.eth1_deposit_index < state.deposit_requests_start_index
        {
            break;
        }
        if deposit.slot > finalized_slot {
            break;
        }
        if next_deposit_index as u64 >= consts::MAX_PENDING_DEPOSITS_PER_EPOCH {
            break;
        }

        let known = state
            .validators
            .iter()
            .position(|v| v.pubkey == deposit.pubkey);
        let (is_exited, is_withdrawn) = match known {
            Some(index) => {
                let validator = &state.validators[index];
                (
                    validator.exit_epoch < consts::FAR_FUTURE_EPOCH,
                    validator.withdrawable_epoch < next_epoch,
                )
            }
            None => (false, false),
        };

        if is_withdrawn {
            // Balance can never activate again; apply without churn.
            apply_pending_deposit(state, config, deposit);
        } else if is_exited {
            deposits_to_postpone.push(deposit.clone());
        } else {
            churn_limit_reached = processed_amount + deposit.amount > available_for_processing;
            if churn_limit_reached {
                break;
            }
            processed_amount += deposit.amount;
            apply_pending_deposit(state, config, deposit);
        }
        next_deposit_index += 1;
    }

    let mut remaining: Vec<_> = pending[next_deposit_index..].to_vec();
    remaining.extend(deposits_to_postpone);
    state.pending_deposits = VariableList::from(remaining);

    state.deposit_balance_to_consume = if churn_limit_reached {
        available_for_processing - processed_amount
    } else {
        0
    };
    Ok(())
}

fn apply_pending_deposit(
    state: &mut BeaconState,
    config: &BeaconConfig,
    deposit: &crate::containers::PendingDeposit,
) {
    use crate::transition::block::add_validator_to_registry;

    match state.validators.iter().position(|v| v.pubkey == deposit.pubkey) {
        Some(index) => increase_balance(state, index, deposit.amount),
        None => {
            if is_valid_deposit_signature(
                config,
                &deposit.pubkey,
                deposit.withdrawal_credentials,
                deposit.amount,
                &deposit.signature,
            ) {
                add_validator_to_registry(
                    state,
                    deposit.pubkey.clone(),
                    deposit.withdrawal_credentials,
                    deposit.amount,
                );
            }
        }
    }
}

pub(crate) fn is_valid_deposit_signature(
    config: &BeaconConfig,
    pubkey: &crate::containers::BlsPublicKey,
    withdrawal_credentials: crate::containers::Hash256,
    amount: Gwei,
    signature: &crate::containers::BlsSignature,
) -> bool {
    use crate::containers::DepositMessage;
    // Deposits are valid across forks: the domain binds the genesis version
    // and an empty validators root.
    let domain = crate::helpers::compute_domain(
        consts::DOMAIN_DEPOSIT,
        config.genesis_fork_version,
        crate::containers::Hash256::ZERO,
    );
    let message = DepositMessage {
        pubkey: pubkey.clone(),
        withdrawal_credentials,
        amount,
    };
    let signing_root = compute_signing_root(&message, domain);
    let (Ok(pk), Ok(sig)) = (
        beacon_bls::PublicKey::deserialize(pubkey),
        beacon_bls::Signature::deserialize(signature),
    ) else {
        return false;
    };
    sig.verify(&pk, signing_root.as_slice())
}

pub fn process_pending_consolidations(state: &mut BeaconState) {
    let next_epoch = state.current_epoch() + 1;
    let mut processed = 0usize;
    let pending = state.pending_consolidations.to_vec();
    for consolidation in &pending {
        let source = &state.validators[consolidation.source_index as usize];
        if source.slashed {
            processed += 1;
            continue;
        }
        if source.withdrawable_epoch > next_epoch {
            break;
        }
        let source_index = consolidation.source_index as usize;
        let target_index = consolidation.target_index as usize;
        let balance = std::cmp::min(
            state.balances[source_index],
            state.validators[source_index].effective_balance,
        );
        decrease_balance(state, source_index, balance);
        increase_balance(state, target_index, balance);
        processed += 1;
    }
    state.pending_consolidations = VariableList::from(pending[processed..].to_vec());
}

pub fn process_effective_balance_updates(state: &mut BeaconState) {
    let electra = state.fork_seq.gte(ForkSeq::Electra);
    let hysteresis_increment = consts::EFFECTIVE_BALANCE_INCREMENT / consts::HYSTERESIS_QUOTIENT;
    let downward = hysteresis_increment * consts::HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward = hysteresis_increment * consts::HYSTERESIS_UPWARD_MULTIPLIER;

    for index in 0..state.validators.len() {
        let balance = state.balances.get(index).copied().unwrap_or(0);
        let validator = &mut state.validators[index];
        let max_effective = validator.max_effective_balance(electra);
        if balance + downward < validator.effective_balance
            || validator.effective_balance + upward < balance
        {
            validator.effective_balance = std::cmp::min(
                balance - balance % consts::EFFECTIVE_BALANCE_INCREMENT,
                max_effective,
            );
        }
    }
}

pub fn process_slashings_reset(state: &mut BeaconState) {
    let next_epoch = state.current_epoch() + 1;
    state.slashings[(next_epoch % consts::EPOCHS_PER_SLASHINGS_VECTOR) as usize] = 0;
}

pub fn process_randao_mixes_reset(state: &mut BeaconState) {
    let current_epoch = state.current_epoch();
    let next_epoch = current_epoch + 1;
    let mix = state.get_randao_mix(current_epoch);
    state.set_randao_mix(next_epoch, mix);
}

pub fn process_historical_roots_update(state: &mut BeaconState) {
    let next_epoch = state.current_epoch() + 1;
    if next_epoch % (consts::SLOTS_PER_HISTORICAL_ROOT / consts::SLOTS_PER_EPOCH) == 0 {
        let batch = HistoricalBatch {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };
        state
            .historical_roots
            .push(batch.tree_hash_root())
            .expect("history bounded by HISTORICAL_ROOTS_LIMIT");
    }
}

pub fn process_historical_summaries_update(state: &mut BeaconState) {
    let next_epoch = state.current_epoch() + 1;
    if next_epoch % (consts::SLOTS_PER_HISTORICAL_ROOT / consts::SLOTS_PER_EPOCH) == 0 {
        let summary = HistoricalSummary {
            block_summary_root: state.block_roots.tree_hash_root(),
            state_summary_root: state.state_roots.tree_hash_root(),
        };
        state
            .historical_summaries
            .push(summary)
            .expect("history bounded by HISTORICAL_ROOTS_LIMIT");
    }
}

pub fn process_participation_record_updates(state: &mut BeaconState) {
    state.previous_epoch_attestations =
        std::mem::replace(&mut state.current_epoch_attestations, VariableList::empty());
}

pub fn process_participation_flag_updates(state: &mut BeaconState) {
    let zeroed = VariableList::from(vec![0u8; state.validators.len()]);
    state.previous_epoch_participation =
        std::mem::replace(&mut state.current_epoch_participation, zeroed);
}

pub fn process_sync_committee_updates(state: &mut BeaconState) -> Result<(), TransitionError> {
    let next_epoch = state.current_epoch() + 1;
    if next_epoch % consts::EPOCHS_PER_SYNC_COMMITTEE_PERIOD == 0 {
        let (committee, _indices) = compute_sync_committee(state, next_epoch)?;
        state.current_sync_committee =
            std::mem::replace(&mut state.next_sync_committee, committee);
    }
    Ok(())
}

pub fn process_proposer_lookahead(state: &mut BeaconState) -> Result<(), TransitionError> {
    use crate::caches::epoch_cache::compute_proposer_index;
    use crate::helpers::get_seed;

    let slots = consts::SLOTS_PER_EPOCH as usize;
    let total = state.proposer_lookahead.len();
    // Shift one epoch out.
    for i in 0..(total - slots) {
        state.proposer_lookahead[i] = state.proposer_lookahead[i + slots];
    }

    // Fill the tail with the newly-visible epoch.
    let target_epoch = state.current_epoch() + consts::MIN_SEED_LOOKAHEAD + 1;
    let active = state.get_active_validator_indices(target_epoch);
    let epoch_seed = get_seed(state, target_epoch, consts::DOMAIN_BEACON_PROPOSER);
    // The registry may have grown this epoch; derive increments fresh.
    let increments: Vec<u16> = state
        .validators
        .iter()
        .map(|v| (v.effective_balance / consts::EFFECTIVE_BALANCE_INCREMENT) as u16)
        .collect();
    for slot_in_epoch in 0..slots {
        let slot = target_epoch * consts::SLOTS_PER_EPOCH + slot_in_epoch as u64;
        let mut preimage = [0u8; 40];
        preimage[..32].copy_from_slice(&epoch_seed);
        preimage[32..].copy_from_slice(&slot.to_le_bytes());
        let digest = ethereum_hashing::hash_fixed(&preimage);
        let proposer =
            compute_proposer_index(state.fork_seq, &active, &digest, &increments)?;
        state.proposer_lookahead[total - slots + slot_in_epoch] = proposer as u64;
    }
    Ok(())
}

