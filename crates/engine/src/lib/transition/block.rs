//! Per-block processing.
//!
//! Signature policy: structural and stateful checks run here; BLS checks are
//! collected into one batch by `transition::signatures` and verified before
//! the block is applied. The two exceptions are deposit proofs of
//! possession, which are always checked per deposit because an invalid one
//! skips registry onboarding instead of aborting the block, and the
//! sync-aggregate infinity rule for empty participation.

use ethereum_hashing::hash;
use tree_hash::TreeHash;

use beacon_bls::Signature;
use beacon_tree::gindex::Gindex;
use beacon_tree::proof::verify_single;

use crate::caches::EpochCache;
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{
    Attestation, AttestationData, AttesterSlashing, BeaconBlockHeader, BlsPublicKey, Deposit,
    Gwei, Hash256, IndexedAttestation, PendingAttestation, PendingDeposit,
    PendingPartialWithdrawal, ProposerSlashing, SignedBlsToExecutionChange, SignedVoluntaryExit,
    Validator, Withdrawal,
};
use crate::eth_spec::Unsigned;
use crate::errors::{BlockError, ExecutionError, TransitionError};
use crate::fork::ForkSeq;
use crate::helpers::{
    compute_consolidation_epoch_and_update_churn, compute_epoch_at_slot,
    compute_exit_epoch_and_update_churn, compute_timestamp_at_slot, decrease_balance,
    increase_balance, initiate_validator_exit, integer_squareroot, slash_validator,
};
use crate::block::{BeaconBlock, BeaconBlockBody, BlockPayload};
use crate::state::BeaconState;
use crate::transition::epoch::is_valid_deposit_signature;

pub fn process_block(
    state: &mut BeaconState,
    cache: &EpochCache,
    config: &BeaconConfig,
    block: &BeaconBlock,
) -> Result<(), TransitionError> {
    let fork = state.fork_seq;
    process_block_header(state, cache, block)?;
    if fork.gte(ForkSeq::Capella) {
        process_withdrawals(state, &block.body)?;
    }
    if fork.gte(ForkSeq::Bellatrix) {
        process_execution_payload(state, config, &block.body)?;
    }
    process_randao(state, &block.body.randao_reveal);
    process_eth1_data(state, &block.body);
    process_operations(state, cache, config, &block.body)?;
    if fork.gte(ForkSeq::Altair) {
        process_sync_aggregate(state, cache, &block.body)?;
    }
    Ok(())
}

pub fn process_block_header(
    state: &mut BeaconState,
    cache: &EpochCache,
    block: &BeaconBlock,
) -> Result<(), TransitionError> {
    if block.slot != state.slot {
        return Err(BlockError::BlockSlotMismatch {
            block_slot: block.slot,
            state_slot: state.slot,
        }
        .into());
    }
    if block.slot <= state.latest_block_header.slot {
        return Err(BlockError::BlockNotNewerThanLatestHeader {
            block_slot: block.slot,
            header_slot: state.latest_block_header.slot,
        }
        .into());
    }
    let expected_proposer = cache.get_beacon_proposer(state.slot) as u64;
    if block.proposer_index != expected_proposer {
        return Err(BlockError::BlockProposerIndexMismatch {
            block_proposer: block.proposer_index,
            expected: expected_proposer,
        }
        .into());
    }
    let expected_parent = state.latest_block_header.tree_hash_root();
    if block.parent_root != expected_parent {
        return Err(BlockError::BlockParentRootMismatch {
            block_parent: block.parent_root,
            expected: expected_parent,
        }
        .into());
    }

    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        proposer_index: block.proposer_index,
        parent_root: block.parent_root,
        // Zeroed until the next process_slot fills it with this block's
        // post-state root.
        state_root: Hash256::ZERO,
        body_root: block.body.hash_tree_root_at(state.fork_seq),
    };

    let proposer = &state.validators[block.proposer_index as usize];
    if proposer.slashed {
        return Err(BlockError::BlockProposerSlashed(block.proposer_index).into());
    }
    Ok(())
}

pub fn process_randao(state: &mut BeaconState, randao_reveal: &[u8]) {
    let epoch = state.current_epoch();
    let mix = state.get_randao_mix(epoch);
    let reveal_digest = hash(randao_reveal);
    let mut mixed = [0u8; 32];
    for (i, byte) in mixed.iter_mut().enumerate() {
        *byte = mix.0[i] ^ reveal_digest[i];
    }
    state.set_randao_mix(epoch, Hash256::from(mixed));
}

pub fn process_eth1_data(state: &mut BeaconState, body: &BeaconBlockBody) {
    state
        .eth1_data_votes
        .push(body.eth1_data.clone())
        .expect("eth1 data votes bounded by SLOTS_PER_ETH1_VOTING_PERIOD");
    let vote_count = state
        .eth1_data_votes
        .iter()
        .filter(|vote| **vote == body.eth1_data)
        .count() as u64;
    if vote_count * 2 > consts::EPOCHS_PER_ETH1_VOTING_PERIOD * consts::SLOTS_PER_EPOCH {
        state.eth1_data = body.eth1_data.clone();
    }
}

pub fn process_operations(
    state: &mut BeaconState,
    cache: &EpochCache,
    config: &BeaconConfig,
    body: &BeaconBlockBody,
) -> Result<(), TransitionError> {
    let fork = state.fork_seq;

    // Outstanding eth1 deposits must be drained at the mandated rate.
    let eth1_deposit_index_limit = if fork.gte(ForkSeq::Electra) {
        std::cmp::min(state.eth1_data.deposit_count, state.deposit_requests_start_index)
    } else {
        state.eth1_data.deposit_count
    };
    let expected_deposits = if state.eth1_deposit_index < eth1_deposit_index_limit {
        std::cmp::min(
            consts::MAX_DEPOSITS,
            eth1_deposit_index_limit - state.eth1_deposit_index,
        )
    } else {
        0
    };
    if body.deposits.len() as u64 != expected_deposits {
        return Err(BlockError::InvalidDepositCount {
            expected: expected_deposits,
            actual: body.deposits.len() as u64,
        }
        .into());
    }

    if body.attester_slashings.len() as u64 > BeaconBlockBody::max_attester_slashings(fork) {
        return Err(operation_error("too many attester slashings"));
    }
    if body.attestations.len() as u64 > BeaconBlockBody::max_attestations(fork) {
        return Err(operation_error("too many attestations"));
    }

    for slashing in body.proposer_slashings.iter() {
        process_proposer_slashing(state, config, slashing)?;
    }
    for slashing in body.attester_slashings.iter() {
        process_attester_slashing(state, config, slashing)?;
    }
    for attestation in body.attestations.iter() {
        process_attestation(state, cache, attestation)?;
    }
    for deposit in body.deposits.iter() {
        process_deposit(state, config, deposit)?;
    }
    for exit in body.voluntary_exits.iter() {
        process_voluntary_exit(state, config, exit)?;
    }
    if fork.gte(ForkSeq::Capella) {
        for change in body.bls_to_execution_changes.iter() {
            process_bls_to_execution_change(state, change)?;
        }
    }
    if fork.gte(ForkSeq::Electra) {
        for request in body.execution_requests.deposits.iter() {
            process_deposit_request(state, request);
        }
        for request in body.execution_requests.withdrawals.iter() {
            process_withdrawal_request(state, config, request)?;
        }
        for request in body.execution_requests.consolidations.iter() {
            process_consolidation_request(state, config, request)?;
        }
    }
    Ok(())
}

fn operation_error(message: &str) -> TransitionError {
    BlockError::InvalidOperation(message.to_string()).into()
}

pub fn process_proposer_slashing(
    state: &mut BeaconState,
    config: &BeaconConfig,
    slashing: &ProposerSlashing,
) -> Result<(), TransitionError> {
    let header_1 = &slashing.signed_header_1.message;
    let header_2 = &slashing.signed_header_2.message;
    if header_1.slot != header_2.slot {
        return Err(operation_error("proposer slashing header slots differ"));
    }
    if header_1.proposer_index != header_2.proposer_index {
        return Err(operation_error("proposer slashing proposer indices differ"));
    }
    if header_1 == header_2 {
        return Err(operation_error("proposer slashing headers are identical"));
    }
    let proposer_index = header_1.proposer_index as usize;
    let current_epoch = state.current_epoch();
    let slashable = state
        .validators
        .get(proposer_index)
        .map(|v| v.is_slashable_at(current_epoch))
        .unwrap_or(false);
    if !slashable {
        return Err(operation_error("proposer is not slashable"));
    }
    let block_proposer = state.latest_block_header.proposer_index as usize;
    slash_validator(state, config, proposer_index, block_proposer)?;
    Ok(())
}

fn is_slashable_attestation_data(data_1: &AttestationData, data_2: &AttestationData) -> bool {
    // Double vote, or surround vote.
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch)
        || (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

/// Structural validity of an indexed attestation; the signature itself goes
/// through the block batch.
fn check_indexed_attestation(
    state: &BeaconState,
    indexed: &IndexedAttestation,
) -> Result<(), TransitionError> {
    if indexed.attesting_indices.is_empty() {
        return Err(operation_error("indexed attestation has no attesters"));
    }
    let sorted_unique = indexed
        .attesting_indices
        .windows(2)
        .all(|pair| pair[0] < pair[1]);
    if !sorted_unique {
        return Err(operation_error("attesting indices not sorted and unique"));
    }
    if indexed
        .attesting_indices
        .iter()
        .any(|index| *index as usize >= state.validators.len())
    {
        return Err(operation_error("attesting index out of range"));
    }
    Ok(())
}

pub fn process_attester_slashing(
    state: &mut BeaconState,
    config: &BeaconConfig,
    slashing: &AttesterSlashing,
) -> Result<(), TransitionError> {
    let attestation_1 = &slashing.attestation_1;
    let attestation_2 = &slashing.attestation_2;
    if !is_slashable_attestation_data(&attestation_1.data, &attestation_2.data) {
        return Err(operation_error("attestation data is not slashable"));
    }
    check_indexed_attestation(state, attestation_1)?;
    check_indexed_attestation(state, attestation_2)?;

    let indices_2: std::collections::BTreeSet<u64> =
        attestation_2.attesting_indices.iter().copied().collect();
    let current_epoch = state.current_epoch();
    let block_proposer = state.latest_block_header.proposer_index as usize;

    let mut slashed_any = false;
    for index in attestation_1.attesting_indices.iter() {
        if !indices_2.contains(index) {
            continue;
        }
        if state.validators[*index as usize].is_slashable_at(current_epoch) {
            slash_validator(state, config, *index as usize, block_proposer)?;
            slashed_any = true;
        }
    }
    if !slashed_any {
        return Err(operation_error("attester slashing slashed nobody"));
    }
    Ok(())
}

/// Validator indices voting in `attestation`, committee order.
pub fn get_attesting_indices(
    state: &BeaconState,
    cache: &EpochCache,
    attestation: &Attestation,
) -> Result<Vec<u32>, TransitionError> {
    let data = &attestation.data;
    if state.fork_seq.gte(ForkSeq::Electra) {
        let committee_indices = attestation.committee_indices();
        let committees_per_slot = cache
            .shuffling_at(data.target.epoch)?
            .committees_per_slot;
        let mut output = Vec::new();
        let mut committee_offset = 0usize;
        for committee_index in committee_indices {
            if committee_index >= committees_per_slot {
                return Err(operation_error("committee bit beyond committee count"));
            }
            let committee = cache.get_beacon_committee(data.slot, committee_index)?;
            for (position, validator_index) in committee.iter().enumerate() {
                if attestation
                    .aggregation_bits
                    .get(committee_offset + position)
                    .unwrap_or(false)
                {
                    output.push(*validator_index);
                }
            }
            committee_offset += committee.len();
        }
        if attestation.aggregation_bits.len() != committee_offset {
            return Err(operation_error("aggregation bits do not span the committees"));
        }
        Ok(output)
    } else {
        let committee = cache.get_beacon_committee(data.slot, data.index)?;
        if attestation.aggregation_bits.len() != committee.len() {
            return Err(operation_error("aggregation bits do not match committee size"));
        }
        Ok(committee
            .iter()
            .enumerate()
            .filter(|(position, _)| attestation.aggregation_bits.get(*position).unwrap_or(false))
            .map(|(_, index)| *index)
            .collect())
    }
}

/// Timeliness flags earned by an attestation included after
/// `inclusion_delay` slots.
fn participation_flag_indices(
    state: &BeaconState,
    data: &AttestationData,
    inclusion_delay: u64,
) -> Result<Vec<usize>, TransitionError> {
    let justified = if data.target.epoch == state.current_epoch() {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != justified {
        return Err(operation_error("attestation source does not match justified checkpoint"));
    }
    let is_matching_target = data.target.root == state.get_block_root(data.target.epoch);
    let is_matching_head =
        is_matching_target && data.beacon_block_root == state.get_block_root_at_slot(data.slot);

    let mut flags = Vec::new();
    if inclusion_delay <= integer_squareroot(consts::SLOTS_PER_EPOCH) {
        flags.push(consts::TIMELY_SOURCE_FLAG_INDEX);
    }
    let target_in_time = if state.fork_seq.gte(ForkSeq::Deneb) {
        // EIP-7045 removed the target inclusion bound.
        true
    } else {
        inclusion_delay <= consts::SLOTS_PER_EPOCH
    };
    if is_matching_target && target_in_time {
        flags.push(consts::TIMELY_TARGET_FLAG_INDEX);
    }
    if is_matching_head && inclusion_delay == consts::MIN_ATTESTATION_INCLUSION_DELAY {
        flags.push(consts::TIMELY_HEAD_FLAG_INDEX);
    }
    Ok(flags)
}

pub fn process_attestation(
    state: &mut BeaconState,
    cache: &EpochCache,
    attestation: &Attestation,
) -> Result<(), TransitionError> {
    let data = &attestation.data;
    let fork = state.fork_seq;
    let current_epoch = state.current_epoch();
    let previous_epoch = state.previous_epoch();

    if data.target.epoch != current_epoch && data.target.epoch != previous_epoch {
        return Err(operation_error("attestation target epoch out of range"));
    }
    if data.target.epoch != compute_epoch_at_slot(data.slot) {
        return Err(operation_error("attestation target epoch does not match its slot"));
    }
    if data.slot + consts::MIN_ATTESTATION_INCLUSION_DELAY > state.slot {
        return Err(operation_error("attestation included too early"));
    }
    if !fork.gte(ForkSeq::Deneb) && state.slot > data.slot + consts::SLOTS_PER_EPOCH {
        return Err(operation_error("attestation included too late"));
    }
    if fork.gte(ForkSeq::Electra) {
        if data.index != 0 {
            return Err(operation_error("electra attestations carry committees in bits"));
        }
    } else {
        let committees_per_slot = cache.shuffling_at(data.target.epoch)?.committees_per_slot;
        if data.index >= committees_per_slot {
            return Err(operation_error("attestation committee index out of range"));
        }
    }

    let attesting = get_attesting_indices(state, cache, attestation)?;
    let inclusion_delay = state.slot - data.slot;

    if fork.gte(ForkSeq::Altair) {
        let flag_indices = participation_flag_indices(state, data, inclusion_delay)?;
        let base_reward_per_increment = cache.base_reward_per_increment;
        let increments = cache.get_effective_balance_increments();

        let mut proposer_reward_numerator: u64 = 0;
        let current = data.target.epoch == current_epoch;
        for index in &attesting {
            let index = *index as usize;
            let participation = if current {
                &mut state.current_epoch_participation
            } else {
                &mut state.previous_epoch_participation
            };
            let flags = participation
                .get_mut(index)
                .ok_or_else(|| operation_error("attester index beyond participation list"))?;
            let base_reward = increments.get(index).copied().unwrap_or(0) as u64
                * base_reward_per_increment;
            for (flag_index, weight) in consts::PARTICIPATION_FLAG_WEIGHTS.iter().enumerate() {
                if flag_indices.contains(&flag_index) && *flags & (1 << flag_index) == 0 {
                    *flags |= 1 << flag_index;
                    proposer_reward_numerator += base_reward * weight;
                }
            }
        }

        let proposer_reward_denominator = (consts::WEIGHT_DENOMINATOR - consts::PROPOSER_WEIGHT)
            * consts::WEIGHT_DENOMINATOR
            / consts::PROPOSER_WEIGHT;
        let proposer_reward = proposer_reward_numerator / proposer_reward_denominator;
        let proposer_index = state.latest_block_header.proposer_index as usize;
        increase_balance(state, proposer_index, proposer_reward);
    } else {
        let pending = PendingAttestation {
            aggregation_bits: {
                let mut bits =
                    crate::containers::BitList::with_capacity(attestation.aggregation_bits.len())
                        .map_err(|_| operation_error("aggregation bits exceed committee limit"))?;
                for (i, bit) in attestation.aggregation_bits.iter().enumerate() {
                    let _ = bits.set(i, bit);
                }
                bits
            },
            data: *data,
            inclusion_delay,
            proposer_index: state.latest_block_header.proposer_index,
        };
        if data.target.epoch == current_epoch {
            if data.source != state.current_justified_checkpoint {
                return Err(operation_error("attestation source does not match justified checkpoint"));
            }
            state
                .current_epoch_attestations
                .push(pending)
                .expect("pending attestations bounded by MAX_ATTESTATIONS * SLOTS_PER_EPOCH");
        } else {
            if data.source != state.previous_justified_checkpoint {
                return Err(operation_error("attestation source does not match justified checkpoint"));
            }
            state
                .previous_epoch_attestations
                .push(pending)
                .expect("pending attestations bounded by MAX_ATTESTATIONS * SLOTS_PER_EPOCH");
        }
    }
    Ok(())
}

/// Registry onboarding shared by deposits and pending deposits.
pub fn add_validator_to_registry(
    state: &mut BeaconState,
    pubkey: BlsPublicKey,
    withdrawal_credentials: Hash256,
    amount: Gwei,
) {
    let fork_gte_electra = state.fork_seq.gte(ForkSeq::Electra);
    let mut validator = Validator {
        pubkey,
        withdrawal_credentials,
        effective_balance: 0,
        slashed: false,
        activation_eligibility_epoch: consts::FAR_FUTURE_EPOCH,
        activation_epoch: consts::FAR_FUTURE_EPOCH,
        exit_epoch: consts::FAR_FUTURE_EPOCH,
        withdrawable_epoch: consts::FAR_FUTURE_EPOCH,
    };
    let max_effective = validator.max_effective_balance(fork_gte_electra);
    validator.effective_balance = std::cmp::min(
        amount - amount % consts::EFFECTIVE_BALANCE_INCREMENT,
        max_effective,
    );
    state
        .validators
        .push(validator)
        .expect("registry bounded by VALIDATOR_REGISTRY_LIMIT");
    state
        .balances
        .push(amount)
        .expect("balances bounded by VALIDATOR_REGISTRY_LIMIT");
    if state.fork_seq.gte(ForkSeq::Altair) {
        state
            .previous_epoch_participation
            .push(0)
            .expect("participation bounded by VALIDATOR_REGISTRY_LIMIT");
        state
            .current_epoch_participation
            .push(0)
            .expect("participation bounded by VALIDATOR_REGISTRY_LIMIT");
        state
            .inactivity_scores
            .push(0)
            .expect("inactivity scores bounded by VALIDATOR_REGISTRY_LIMIT");
    }
}

pub fn process_deposit(
    state: &mut BeaconState,
    config: &BeaconConfig,
    deposit: &Deposit,
) -> Result<(), TransitionError> {
    let leaf = deposit.data.tree_hash_root();
    let gindex = Gindex::from_depth(
        consts::DEPOSIT_CONTRACT_TREE_DEPTH + 1,
        state.eth1_deposit_index,
    );
    let branch: Vec<[u8; 32]> = deposit.proof.iter().map(|h| h.0).collect();
    verify_single(&state.eth1_data.deposit_root.0, &leaf.0, gindex, &branch)
        .map_err(|_| operation_error("deposit merkle proof invalid"))?;

    // Deposits apply in contract order.
    state.eth1_deposit_index += 1;

    apply_deposit(
        state,
        config,
        deposit.data.pubkey.clone(),
        deposit.data.withdrawal_credentials,
        deposit.data.amount,
        &deposit.data.signature,
    );
    Ok(())
}

fn apply_deposit(
    state: &mut BeaconState,
    config: &BeaconConfig,
    pubkey: BlsPublicKey,
    withdrawal_credentials: Hash256,
    amount: Gwei,
    signature: &crate::containers::BlsSignature,
) {
    let known = state.validators.iter().position(|v| v.pubkey == pubkey);
    if state.fork_seq.gte(ForkSeq::Electra) {
        if known.is_none() {
            if !is_valid_deposit_signature(
                config,
                &pubkey,
                withdrawal_credentials,
                amount,
                signature,
            ) {
                return;
            }
            add_validator_to_registry(state, pubkey.clone(), withdrawal_credentials, 0);
        }
        // Balance activates through the pending queue, churn-limited.
        state
            .pending_deposits
            .push(PendingDeposit {
                pubkey,
                withdrawal_credentials,
                amount,
                signature: signature.clone(),
                slot: consts::GENESIS_SLOT,
            })
            .expect("pending deposits bounded by PENDING_DEPOSITS_LIMIT");
    } else {
        match known {
            Some(index) => increase_balance(state, index, amount),
            None => {
                if is_valid_deposit_signature(
                    config,
                    &pubkey,
                    withdrawal_credentials,
                    amount,
                    signature,
                ) {
                    add_validator_to_registry(state, pubkey, withdrawal_credentials, amount);
                }
            }
        }
    }
}

/// Electra pending partial withdrawals still queued for `validator_index`.
fn pending_balance_to_withdraw(state: &BeaconState, validator_index: u64) -> Gwei {
    state
        .pending_partial_withdrawals
        .iter()
        .filter(|w| w.validator_index == validator_index)
        .map(|w| w.amount)
        .sum()
}

pub fn process_voluntary_exit(
    state: &mut BeaconState,
    config: &BeaconConfig,
    signed_exit: &SignedVoluntaryExit,
) -> Result<(), TransitionError> {
    let exit = &signed_exit.message;
    let current_epoch = state.current_epoch();
    let validator = state
        .validators
        .get(exit.validator_index as usize)
        .ok_or_else(|| operation_error("voluntary exit validator unknown"))?;

    if !validator.is_active_at(current_epoch) {
        return Err(operation_error("exiting validator is not active"));
    }
    if validator.exit_epoch != consts::FAR_FUTURE_EPOCH {
        return Err(operation_error("validator already exiting"));
    }
    if current_epoch < exit.epoch {
        return Err(operation_error("exit is not yet valid"));
    }
    if current_epoch < validator.activation_epoch + consts::SHARD_COMMITTEE_PERIOD {
        return Err(operation_error("validator has not been active long enough"));
    }
    if state.fork_seq.gte(ForkSeq::Electra)
        && pending_balance_to_withdraw(state, exit.validator_index) != 0
    {
        return Err(operation_error("exit blocked by pending partial withdrawals"));
    }

    initiate_validator_exit(state, config, exit.validator_index as usize)?;
    Ok(())
}

pub fn process_bls_to_execution_change(
    state: &mut BeaconState,
    signed_change: &SignedBlsToExecutionChange,
) -> Result<(), TransitionError> {
    let change = &signed_change.message;
    let index = change.validator_index as usize;
    if index >= state.validators.len() {
        return Err(operation_error("bls change validator unknown"));
    }
    let credentials = state.validators[index].withdrawal_credentials;
    if credentials.0[0] != consts::BLS_WITHDRAWAL_PREFIX {
        return Err(operation_error("validator does not have BLS withdrawal credentials"));
    }
    let pubkey_digest = hash(&change.from_bls_pubkey);
    if credentials.0[1..] != pubkey_digest[1..] {
        return Err(operation_error("bls change pubkey does not match credentials"));
    }

    let mut updated = [0u8; 32];
    updated[0] = consts::ETH1_ADDRESS_WITHDRAWAL_PREFIX;
    updated[12..].copy_from_slice(change.to_execution_address.as_slice());
    state.validators[index].withdrawal_credentials = Hash256::from(updated);
    Ok(())
}

/// Withdrawals the payload must carry, plus the number of pending partial
/// withdrawals consumed.
pub fn get_expected_withdrawals(state: &BeaconState) -> (Vec<Withdrawal>, usize) {
    let epoch = state.current_epoch();
    let electra = state.fork_seq.gte(ForkSeq::Electra);
    let mut withdrawal_index = state.next_withdrawal_index;
    let mut withdrawals: Vec<Withdrawal> = Vec::new();
    let mut processed_partials = 0usize;

    if electra {
        for pending in state.pending_partial_withdrawals.iter() {
            if pending.withdrawable_epoch > epoch
                || withdrawals.len() as u64 == consts::MAX_PENDING_PARTIALS_PER_WITHDRAWALS_SWEEP
            {
                break;
            }
            let validator = &state.validators[pending.validator_index as usize];
            let already_withdrawn: Gwei = withdrawals
                .iter()
                .filter(|w| w.validator_index == pending.validator_index)
                .map(|w| w.amount)
                .sum();
            let balance = state.balances[pending.validator_index as usize] - already_withdrawn;
            let has_sufficient_effective_balance =
                validator.effective_balance >= consts::MIN_ACTIVATION_BALANCE;
            let has_excess_balance = balance > consts::MIN_ACTIVATION_BALANCE;
            if validator.exit_epoch == consts::FAR_FUTURE_EPOCH
                && has_sufficient_effective_balance
                && has_excess_balance
            {
                withdrawals.push(Withdrawal {
                    index: withdrawal_index,
                    validator_index: pending.validator_index,
                    address: withdrawal_address(validator),
                    amount: std::cmp::min(balance - consts::MIN_ACTIVATION_BALANCE, pending.amount),
                });
                withdrawal_index += 1;
            }
            processed_partials += 1;
        }
    }

    let validator_count = state.validators.len() as u64;
    let bound = std::cmp::min(validator_count, consts::MAX_VALIDATORS_PER_WITHDRAWALS_SWEEP);
    let mut validator_index = state.next_withdrawal_validator_index;
    for _ in 0..bound {
        if withdrawals.len() as u64 == consts::MAX_WITHDRAWALS_PER_PAYLOAD {
            break;
        }
        let validator = &state.validators[validator_index as usize];
        let already_withdrawn: Gwei = withdrawals
            .iter()
            .filter(|w| w.validator_index == validator_index)
            .map(|w| w.amount)
            .sum();
        let balance = state.balances[validator_index as usize].saturating_sub(already_withdrawn);
        if validator.is_fully_withdrawable_at(balance, epoch) {
            withdrawals.push(Withdrawal {
                index: withdrawal_index,
                validator_index,
                address: withdrawal_address(validator),
                amount: balance,
            });
            withdrawal_index += 1;
        } else if validator.is_partially_withdrawable(balance, electra) {
            withdrawals.push(Withdrawal {
                index: withdrawal_index,
                validator_index,
                address: withdrawal_address(validator),
                amount: balance - validator.max_effective_balance(electra),
            });
            withdrawal_index += 1;
        }
        validator_index = (validator_index + 1) % validator_count;
    }

    (withdrawals, processed_partials)
}

fn withdrawal_address(validator: &Validator) -> crate::containers::Address {
    crate::containers::Address::from_slice(&validator.withdrawal_credentials.0[12..])
}

pub fn process_withdrawals(
    state: &mut BeaconState,
    body: &BeaconBlockBody,
) -> Result<(), TransitionError> {
    let (expected, processed_partials) = get_expected_withdrawals(state);

    if let BlockPayload::Full(payload) = &body.payload {
        if payload.withdrawals.to_vec() != expected {
            return Err(ExecutionError::InvalidExecutionPayload(
                "payload withdrawals do not match the expected set",
            )
            .into());
        }
    }

    for withdrawal in &expected {
        decrease_balance(state, withdrawal.validator_index as usize, withdrawal.amount);
    }

    if state.fork_seq.gte(ForkSeq::Electra) && processed_partials > 0 {
        let remaining: Vec<PendingPartialWithdrawal> =
            state.pending_partial_withdrawals[processed_partials..].to_vec();
        state.pending_partial_withdrawals = crate::containers::VariableList::from(remaining);
    }

    if let Some(last) = expected.last() {
        state.next_withdrawal_index = last.index + 1;
    }
    let validator_count = state.validators.len() as u64;
    match expected.last() {
        Some(last) if expected.len() as u64 == consts::MAX_WITHDRAWALS_PER_PAYLOAD => {
            state.next_withdrawal_validator_index = (last.validator_index + 1) % validator_count;
        }
        _ => {
            state.next_withdrawal_validator_index = (state.next_withdrawal_validator_index
                + consts::MAX_VALIDATORS_PER_WITHDRAWALS_SWEEP)
                % validator_count;
        }
    }
    Ok(())
}

pub fn process_execution_payload(
    state: &mut BeaconState,
    config: &BeaconConfig,
    body: &BeaconBlockBody,
) -> Result<(), TransitionError> {
    let fork = state.fork_seq;
    let payload = &body.payload;

    let merge_complete = state.latest_execution_payload_header
        != crate::payload::ExecutionPayloadHeader::default();
    if merge_complete {
        let expected_parent = state.latest_execution_payload_header.block_hash;
        if payload.parent_hash() != expected_parent {
            return Err(ExecutionError::InvalidExecutionPayloadParentHash {
                expected: expected_parent,
                actual: payload.parent_hash(),
            }
            .into());
        }
    }
    let expected_randao = state.get_randao_mix(state.current_epoch());
    if payload.prev_randao() != expected_randao {
        return Err(ExecutionError::InvalidExecutionPayloadRandom {
            expected: expected_randao,
            actual: payload.prev_randao(),
        }
        .into());
    }
    let expected_timestamp = compute_timestamp_at_slot(state, config, state.slot);
    if payload.timestamp() != expected_timestamp {
        return Err(ExecutionError::InvalidExecutionPayloadTimestamp {
            expected: expected_timestamp,
            actual: payload.timestamp(),
        }
        .into());
    }
    if fork.gte(ForkSeq::Deneb) {
        let limit = config.max_blobs_per_block(fork);
        if body.blob_kzg_commitments.len() as u64 > limit {
            return Err(ExecutionError::BlobKzgCommitmentsExceedsLimit {
                limit,
                actual: body.blob_kzg_commitments.len() as u64,
            }
            .into());
        }
    }

    state.latest_execution_payload_header = payload.header_at(fork);
    Ok(())
}

pub fn process_sync_aggregate(
    state: &mut BeaconState,
    cache: &EpochCache,
    body: &BeaconBlockBody,
) -> Result<(), TransitionError> {
    let aggregate = &body.sync_aggregate;
    let committee = cache.sync_committee_indexed();

    if aggregate.sync_committee_bits.num_set_bits() == 0 {
        let signature = Signature::deserialize(&aggregate.sync_committee_signature)
            .map_err(|_| BlockError::SyncCommitteeSignatureInvalid)?;
        if !signature.is_infinity() {
            return Err(BlockError::EmptySyncCommitteeSignatureIsNotInfinity.into());
        }
    }

    let participant_reward = cache.sync_participant_reward;
    let proposer_reward = cache.sync_proposer_reward;
    let proposer_index = state.latest_block_header.proposer_index as usize;

    let mut proposer_total: Gwei = 0;
    for (position, validator_index) in committee.validator_indices.iter().enumerate() {
        let participated = aggregate
            .sync_committee_bits
            .get(position)
            .unwrap_or(false);
        if participated {
            increase_balance(state, *validator_index as usize, participant_reward);
            proposer_total += proposer_reward;
        } else {
            decrease_balance(state, *validator_index as usize, participant_reward);
        }
    }
    // One proposer reward per participant, applied after the committee walk.
    increase_balance(state, proposer_index, proposer_total);
    Ok(())
}

// Electra execution-layer requests.

pub fn process_deposit_request(
    state: &mut BeaconState,
    request: &crate::containers::DepositRequest,
) {
    if state.deposit_requests_start_index == consts::UNSET_DEPOSIT_REQUESTS_START_INDEX {
        state.deposit_requests_start_index = request.index;
    }
    state
        .pending_deposits
        .push(PendingDeposit {
            pubkey: request.pubkey.clone(),
            withdrawal_credentials: request.withdrawal_credentials,
            amount: request.amount,
            signature: request.signature.clone(),
            slot: state.slot,
        })
        .expect("pending deposits bounded by PENDING_DEPOSITS_LIMIT");
}

pub fn process_withdrawal_request(
    state: &mut BeaconState,
    config: &BeaconConfig,
    request: &crate::containers::WithdrawalRequest,
) -> Result<(), TransitionError> {
    let amount = request.amount;
    let is_full_exit = amount == consts::FULL_EXIT_REQUEST_AMOUNT;

    // A full queue only admits full exits.
    if state.pending_partial_withdrawals.len()
        == crate::eth_spec::PendingPartialWithdrawalsLimit::to_usize()
        && !is_full_exit
    {
        return Ok(());
    }

    let Some(index) = state
        .validators
        .iter()
        .position(|v| v.pubkey[..] == request.validator_pubkey[..])
    else {
        return Ok(());
    };
    let validator = &state.validators[index];

    // The source address must control the withdrawal credentials.
    let has_correct_credential = validator.has_execution_withdrawal_credential()
        && validator.withdrawal_credentials.0[12..] == request.source_address.as_slice()[..];
    if !has_correct_credential {
        return Ok(());
    }
    if !validator.is_active_at(state.current_epoch()) {
        return Ok(());
    }
    if validator.exit_epoch != consts::FAR_FUTURE_EPOCH {
        return Ok(());
    }
    if state.current_epoch() < validator.activation_epoch + consts::SHARD_COMMITTEE_PERIOD {
        return Ok(());
    }

    let pending_withdrawals = pending_balance_to_withdraw(state, index as u64);
    if is_full_exit {
        if pending_withdrawals == 0 {
            initiate_validator_exit(state, config, index)?;
        }
        return Ok(());
    }

    let balance = state.balances[index];
    let has_compounding = validator.has_compounding_withdrawal_credential();
    let has_sufficient_effective_balance =
        validator.effective_balance >= consts::MIN_ACTIVATION_BALANCE;
    let has_excess_balance =
        balance > consts::MIN_ACTIVATION_BALANCE + pending_withdrawals;
    if has_compounding && has_sufficient_effective_balance && has_excess_balance {
        let to_withdraw = std::cmp::min(
            balance - consts::MIN_ACTIVATION_BALANCE - pending_withdrawals,
            amount,
        );
        let exit_queue_epoch = compute_exit_epoch_and_update_churn(state, config, to_withdraw);
        let withdrawable_epoch = exit_queue_epoch + consts::MIN_VALIDATOR_WITHDRAWABILITY_DELAY;
        state
            .pending_partial_withdrawals
            .push(PendingPartialWithdrawal {
                validator_index: index as u64,
                amount: to_withdraw,
                withdrawable_epoch,
            })
            .expect("queue fullness checked against PENDING_PARTIAL_WITHDRAWALS_LIMIT above");
    }
    Ok(())
}

pub fn process_consolidation_request(
    state: &mut BeaconState,
    config: &BeaconConfig,
    request: &crate::containers::ConsolidationRequest,
) -> Result<(), TransitionError> {
    // Switch-to-compounding requests name themselves as both source and
    // target.
    if request.source_pubkey == request.target_pubkey {
        if let Some(index) = state
            .validators
            .iter()
            .position(|v| v.pubkey == request.source_pubkey)
        {
            let validator = &state.validators[index];
            let authorized = validator.has_eth1_withdrawal_credential()
                && validator.withdrawal_credentials.0[12..]
                    == request.source_address.as_slice()[..]
                && validator.is_active_at(state.current_epoch());
            if authorized {
                switch_to_compounding(state, index);
            }
        }
        return Ok(());
    }

    // Consolidations stall while the exit churn is saturated or the queue is
    // full.
    if state.pending_consolidations.len()
        == crate::eth_spec::PendingConsolidationsLimit::to_usize()
    {
        return Ok(());
    }
    let total_active = state.get_total_active_balance();
    let consolidation_churn = config
        .balance_churn_limit(total_active)
        .saturating_sub(config.activation_exit_churn_limit(total_active));
    if consolidation_churn <= consts::MIN_ACTIVATION_BALANCE {
        return Ok(());
    }

    let (Some(source_index), Some(target_index)) = (
        state.validators.iter().position(|v| v.pubkey == request.source_pubkey),
        state.validators.iter().position(|v| v.pubkey == request.target_pubkey),
    ) else {
        return Ok(());
    };

    let current_epoch = state.current_epoch();
    let source = &state.validators[source_index];
    let target = &state.validators[target_index];

    let source_authorized = source.has_execution_withdrawal_credential()
        && source.withdrawal_credentials.0[12..] == request.source_address.as_slice()[..];
    let valid = source_authorized
        && target.has_compounding_withdrawal_credential()
        && source.is_active_at(current_epoch)
        && target.is_active_at(current_epoch)
        && source.exit_epoch == consts::FAR_FUTURE_EPOCH
        && target.exit_epoch == consts::FAR_FUTURE_EPOCH
        && current_epoch >= source.activation_epoch + consts::SHARD_COMMITTEE_PERIOD
        && pending_balance_to_withdraw(state, source_index as u64) == 0;
    if !valid {
        return Ok(());
    }

    let source_effective_balance = state.validators[source_index].effective_balance;
    let exit_epoch =
        compute_consolidation_epoch_and_update_churn(state, config, source_effective_balance);
    let source = &mut state.validators[source_index];
    source.exit_epoch = exit_epoch;
    source.withdrawable_epoch = exit_epoch + consts::MIN_VALIDATOR_WITHDRAWABILITY_DELAY;

    state
        .pending_consolidations
        .push(crate::containers::PendingConsolidation {
            source_index: source_index as u64,
            target_index: target_index as u64,
        })
        .expect("queue fullness checked against PENDING_CONSOLIDATIONS_LIMIT above");
    Ok(())
}

/// Move a validator to 0x02 credentials and queue its excess balance.
fn switch_to_compounding(state: &mut BeaconState, index: usize) {
    let mut credentials = state.validators[index].withdrawal_credentials;
    credentials.0[0] = consts::COMPOUNDING_WITHDRAWAL_PREFIX;
    state.validators[index].withdrawal_credentials = credentials;

    // Excess over the pre-compounding ceiling re-enters through the pending
    // deposit queue.
    let balance = state.balances[index];
    let excess = balance.saturating_sub(consts::MIN_ACTIVATION_BALANCE);
    if excess > 0 {
        decrease_balance(state, index, excess);
        let validator = &state.validators[index];
        let pending = PendingDeposit {
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

