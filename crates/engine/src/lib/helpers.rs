//! Consensus-spec helper functions shared by block and epoch processing.

use ethereum_hashing::hash;
use tree_hash::TreeHash;

use crate::config::BeaconConfig;
use crate::consts::{self, DomainType};
use crate::containers::{Epoch, ForkData, Hash256, Root, SigningData, Slot, fork_version};
use crate::errors::CacheError;
use crate::fork::ForkSeq;
use crate::state::BeaconState;

pub fn compute_epoch_at_slot(slot: Slot) -> Epoch {
    slot / consts::SLOTS_PER_EPOCH
}

pub fn compute_start_slot_at_epoch(epoch: Epoch) -> Slot {
    epoch * consts::SLOTS_PER_EPOCH
}

/// Epoch at which activations and exits initiated in `epoch` take effect.
pub fn compute_activation_exit_epoch(epoch: Epoch) -> Epoch {
    epoch + 1 + consts::MAX_SEED_LOOKAHEAD
}

pub fn compute_sync_committee_period(epoch: Epoch) -> u64 {
    epoch / consts::EPOCHS_PER_SYNC_COMMITTEE_PERIOD
}

pub fn compute_timestamp_at_slot(state: &BeaconState, config: &BeaconConfig, slot: Slot) -> u64 {
    state.genesis_time + slot * config.seconds_per_slot
}

pub fn integer_squareroot(n: u64) -> u64 {
    if n == u64::MAX {
        // Guard the +1 overflow in the Newton step.
        return 4_294_967_295;
    }
    let mut x = n;
    let mut y = x.div_ceil(2);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

pub fn bytes_to_u64(slice: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = slice.len().min(8);
    bytes[..len].copy_from_slice(&slice[..len]);
    u64::from_le_bytes(bytes)
}

pub fn compute_fork_data_root(current_version: [u8; 4], genesis_validators_root: Root) -> Hash256 {
    ForkData {
        current_version: fork_version(current_version),
        genesis_validators_root,
    }
    .tree_hash_root()
}

pub fn compute_domain(
    domain_type: DomainType,
    current_version: [u8; 4],
    genesis_validators_root: Root,
) -> Hash256 {
    let fork_data_root = compute_fork_data_root(current_version, genesis_validators_root);
    let mut domain = [0u8; 32];
    domain[..4].copy_from_slice(&domain_type);
    domain[4..].copy_from_slice(&fork_data_root.0[..28]);
    Hash256::from(domain)
}

/// Domain for `epoch`, picking the previous fork version before the state's
/// fork epoch.
pub fn get_domain(state: &BeaconState, domain_type: DomainType, epoch: Epoch) -> Hash256 {
    let version = if epoch < state.fork.epoch {
        &state.fork.previous_version
    } else {
        &state.fork.current_version
    };
    let mut raw = [0u8; 4];
    raw.copy_from_slice(version);
    compute_domain(domain_type, raw, state.genesis_validators_root)
}

pub fn compute_signing_root<T: TreeHash>(object: &T, domain: Hash256) -> Hash256 {
    SigningData { object_root: object.tree_hash_root(), domain }.tree_hash_root()
}

pub fn compute_signing_root_for_root(object_root: Root, domain: Hash256) -> Hash256 {
    SigningData { object_root, domain }.tree_hash_root()
}

/// RANDAO-based seed for `epoch`:
/// `hash(domain_type ++ epoch_le ++ mix(epoch + vector_len - lookahead - 1))`.
pub fn get_seed(state: &BeaconState, epoch: Epoch, domain_type: DomainType) -> [u8; 32] {
    let mix = state.get_randao_mix(
        epoch + consts::EPOCHS_PER_HISTORICAL_VECTOR - consts::MIN_SEED_LOOKAHEAD - 1,
    );
    let mut preimage = [0u8; 4 + 8 + 32];
    preimage[..4].copy_from_slice(&domain_type);
    preimage[4..12].copy_from_slice(&epoch.to_le_bytes());
    preimage[12..].copy_from_slice(mix.as_slice());
    let digest = hash(&preimage);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn increase_balance(state: &mut BeaconState, index: usize, delta: u64) {
    if let Some(balance) = state.balances.get_mut(index) {
        *balance = balance.saturating_add(delta);
    }
}

pub fn decrease_balance(state: &mut BeaconState, index: usize, delta: u64) {
    if let Some(balance) = state.balances.get_mut(index) {
        *balance = balance.saturating_sub(delta);
    }
}

/// Earliest epoch a new exit can be scheduled for, by churn.
pub fn initiate_validator_exit(
    state: &mut BeaconState,
    config: &BeaconConfig,
    index: usize,
) -> Result<(), CacheError> {
    if state
        .validators
        .get(index)
        .map(|v| v.exit_epoch != consts::FAR_FUTURE_EPOCH)
        .unwrap_or(true)
    {
        return Ok(());
    }

    let exit_epoch = if state.fork_seq.gte(ForkSeq::Electra) {
        let effective_balance = state.validators[index].effective_balance;
        compute_exit_epoch_and_update_churn(state, config, effective_balance)
    } else {
        // Pre-Electra: count-based churn against the busiest exit epoch.
        let mut exit_epochs: Vec<Epoch> = state
            .validators
            .iter()
            .filter(|v| v.exit_epoch != consts::FAR_FUTURE_EPOCH)
            .map(|v| v.exit_epoch)
            .collect();
        exit_epochs.push(compute_activation_exit_epoch(state.current_epoch()));
        let mut exit_queue_epoch = exit_epochs.iter().copied().max().unwrap_or(0);
        let exit_queue_churn = state
            .validators
            .iter()
            .filter(|v| v.exit_epoch == exit_queue_epoch)
            .count() as u64;
        let churn_limit =
            config.churn_limit(state.get_active_validator_indices(state.current_epoch()).len() as u64);
        if exit_queue_churn >= churn_limit {
            exit_queue_epoch += 1;
        }
        exit_queue_epoch
    };

    let validator = &mut state.validators[index];
    validator.exit_epoch = exit_epoch;
    validator.withdrawable_epoch = exit_epoch + consts::MIN_VALIDATOR_WITHDRAWABILITY_DELAY;
    Ok(())
}

/// Electra balance-churn exit scheduling; consumes `exit_balance_to_consume`.
pub fn compute_exit_epoch_and_update_churn(
    state: &mut BeaconState,
    config: &BeaconConfig,
    exit_balance: u64,
) -> Epoch {
    let earliest_exit_epoch = std::cmp::max(
        state.earliest_exit_epoch,
        compute_activation_exit_epoch(state.current_epoch()),
    );
    let per_epoch_churn = config.activation_exit_churn_limit(state.get_total_active_balance());
    let mut exit_balance_to_consume = if state.earliest_exit_epoch < earliest_exit_epoch {
        per_epoch_churn
    } else {
        state.exit_balance_to_consume
    };
    let mut exit_epoch = earliest_exit_epoch;

    if exit_balance > exit_balance_to_consume {
        let balance_to_process = exit_balance - exit_balance_to_consume;
        let additional_epochs = (balance_to_process - 1) / per_epoch_churn + 1;
        exit_epoch += additional_epochs;
        exit_balance_to_consume += additional_epochs * per_epoch_churn;
    }

    state.exit_balance_to_consume = exit_balance_to_consume - exit_balance;
    state.earliest_exit_epoch = exit_epoch;
    exit_epoch
}

/// Electra consolidation churn, mirroring the exit path.
pub fn compute_consolidation_epoch_and_update_churn(
    state: &mut BeaconState,
    config: &BeaconConfig,
    consolidation_balance: u64,
) -> Epoch {
    let earliest_consolidation_epoch = std::cmp::max(
        state.earliest_consolidation_epoch,
        compute_activation_exit_epoch(state.current_epoch()),
    );
    let total_active = state.get_total_active_balance();
    let per_epoch_churn = config.balance_churn_limit(total_active)
        - config.activation_exit_churn_limit(total_active);
    let per_epoch_churn = std::cmp::max(per_epoch_churn, 1);
    let mut balance_to_consume = if state.earliest_consolidation_epoch < earliest_consolidation_epoch
    {
        per_epoch_churn
    } else {
        state.consolidation_balance_to_consume
    };
    let mut epoch = earliest_consolidation_epoch;

    if consolidation_balance > balance_to_consume {
        let balance_to_process = consolidation_balance - balance_to_consume;
        let additional_epochs = (balance_to_process - 1) / per_epoch_churn + 1;
        epoch += additional_epochs;
        balance_to_consume += additional_epochs * per_epoch_churn;
    }

    state.consolidation_balance_to_consume = balance_to_consume - consolidation_balance;
    state.earliest_consolidation_epoch = epoch;
    epoch
}

/// Slash a validator: exit it, mark it slashed, burn the penalty and pay the
/// proposer/whistleblower rewards.
pub fn slash_validator(
    state: &mut BeaconState,
    config: &BeaconConfig,
    slashed_index: usize,
    proposer_index: usize,
) -> Result<(), CacheError> {
    let epoch = state.current_epoch();
    initiate_validator_exit(state, config, slashed_index)?;

    let fork = state.fork_seq;
    let validator = &mut state.validators[slashed_index];
    validator.slashed = true;
    validator.withdrawable_epoch = std::cmp::max(
        validator.withdrawable_epoch,
        epoch + consts::EPOCHS_PER_SLASHINGS_VECTOR,
    );
    let effective_balance = validator.effective_balance;

    let slash_index = (epoch % consts::EPOCHS_PER_SLASHINGS_VECTOR) as usize;
    state.slashings[slash_index] += effective_balance;

    let min_slashing_quotient = if fork.gte(ForkSeq::Electra) {
        consts::MIN_SLASHING_PENALTY_QUOTIENT_ELECTRA
    } else if fork.gte(ForkSeq::Bellatrix) {
        consts::MIN_SLASHING_PENALTY_QUOTIENT_BELLATRIX
    } else if fork.gte(ForkSeq::Altair) {
        consts::MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR
    } else {
        consts::MIN_SLASHING_PENALTY_QUOTIENT
    };
    decrease_balance(state, slashed_index, effective_balance / min_slashing_quotient);

    let whistleblower_quotient = if fork.gte(ForkSeq::Electra) {
        consts::WHISTLEBLOWER_REWARD_QUOTIENT_ELECTRA
    } else {
        consts::WHISTLEBLOWER_REWARD_QUOTIENT
    };
    let whistleblower_reward = effective_balance / whistleblower_quotient;
    let proposer_reward = if fork.gte(ForkSeq::Altair) {
        whistleblower_reward * consts::PROPOSER_WEIGHT / consts::WEIGHT_DENOMINATOR
    } else {
        whistleblower_reward / consts::PROPOSER_REWARD_QUOTIENT
    };
    increase_balance(state, proposer_index, proposer_reward);
    increase_balance(state, proposer_index, whistleblower_reward - proposer_reward);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn squareroot_edge_cases() {
        assert_eq!(integer_squareroot(0), 0);
        assert_eq!(integer_squareroot(1), 1);
        assert_eq!(integer_squareroot(3), 1);
        assert_eq!(integer_squareroot(4), 2);
        assert_eq!(integer_squareroot(1_000_000), 1000);
        assert_eq!(integer_squareroot(u64::MAX), 4_294_967_295);
    }

    #[test]
    fn epoch_slot_math() {
        assert_eq!(compute_epoch_at_slot(0), 0);
        assert_eq!(compute_epoch_at_slot(31), 0);
        assert_eq!(compute_epoch_at_slot(32), 1);
        assert_eq!(compute_start_slot_at_epoch(3), 96);
        assert_eq!(compute_activation_exit_epoch(5), 10);
    }

    #[test]
    fn domain_embeds_type_and_fork_digest() {
        let domain = compute_domain(consts::DOMAIN_RANDAO, [1, 2, 3, 4], Hash256::repeat_byte(9));
        assert_eq!(&domain.0[..4], &consts::DOMAIN_RANDAO);
        let other = compute_domain(consts::DOMAIN_DEPOSIT, [1, 2, 3, 4], Hash256::repeat_byte(9));
        assert_eq!(&domain.0[4..], &other.0[4..]);
        assert_ne!(domain, other);
    }

    #[test]
    fn bytes_to_u64_is_little_endian() {
        assert_eq!(bytes_to_u64(&[1, 0, 0, 0, 0, 0, 0, 0]), 1);
        assert_eq!(bytes_to_u64(&[0, 1]), 256);
        assert_eq!(bytes_to_u64(&[0xFF; 8]), u64::MAX);
    }
}
