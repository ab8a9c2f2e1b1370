//! Per-epoch derived state: proposers, shufflings, sync committee view,
//! effective-balance increments and reward constants.

use std::sync::Arc;

use ethereum_hashing::{hash, hash_fixed};

use beacon_bls::{AggregatePublicKey, PublicKey, PubkeyIndex};

use crate::caches::shuffling::EpochShuffling;
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{BlsPublicKey, Epoch, FixedVector, Slot, SyncCommittee};
use crate::errors::CacheError;
use crate::fork::ForkSeq;
use crate::helpers::{bytes_to_u64, compute_epoch_at_slot, get_seed, integer_squareroot};
use crate::state::BeaconState;

/// Spec `compute_shuffled_index`: where one index lands after the full
/// forward shuffle.
pub fn compute_shuffled_index(mut index: u64, index_count: u64, seed: &[u8; 32]) -> u64 {
    debug_assert!(index < index_count);
    for round in 0..consts::SHUFFLE_ROUND_COUNT {
        let mut pivot_preimage = [0u8; 33];
        pivot_preimage[..32].copy_from_slice(seed);
        pivot_preimage[32] = round;
        let pivot = bytes_to_u64(&hash_fixed(&pivot_preimage)[..8]) % index_count;

        let flip = (pivot + index_count - index) % index_count;
        let position = std::cmp::max(index, flip);
        let mut source_preimage = [0u8; 37];
        source_preimage[..33].copy_from_slice(&pivot_preimage);
        source_preimage[33..].copy_from_slice(&((position / 256) as u32).to_le_bytes());
        let source = hash_fixed(&source_preimage);
        let byte_value = source[((position % 256) / 8) as usize];
        if (byte_value >> (position % 8)) & 1 == 1 {
            index = flip;
        }
    }
    index
}

/// Effective-balance-weighted candidate sampling: 8-bit before Electra,
/// 16-bit from Electra on (the larger max effective balance needs the
/// resolution).
pub fn compute_proposer_index(
    fork: ForkSeq,
    active_indices: &[u32],
    seed: &[u8; 32],
    effective_balance_increments: &[u16],
) -> Result<u32, CacheError> {
    if active_indices.is_empty() {
        return Err(CacheError::InvalidIndicesType { index: 0, count: 0 });
    }
    let total = active_indices.len() as u64;
    let max_increments_pre = consts::MAX_EFFECTIVE_BALANCE / consts::EFFECTIVE_BALANCE_INCREMENT;
    let max_increments_electra =
        consts::MAX_EFFECTIVE_BALANCE_ELECTRA / consts::EFFECTIVE_BALANCE_INCREMENT;

    let mut i: u64 = 0;
    loop {
        let candidate =
            active_indices[compute_shuffled_index(i % total, total, seed) as usize];
        let increments = *effective_balance_increments
            .get(candidate as usize)
            .ok_or(CacheError::InvalidIndicesType {
                index: candidate as u64,
                count: effective_balance_increments.len() as u64,
            })? as u64;

        if fork.gte(ForkSeq::Electra) {
            let mut preimage = [0u8; 40];
            preimage[..32].copy_from_slice(seed);
            preimage[32..].copy_from_slice(&(i / 16).to_le_bytes());
            let digest = hash_fixed(&preimage);
            let offset = ((i % 16) * 2) as usize;
            let random_value = u16::from_le_bytes([digest[offset], digest[offset + 1]]) as u64;
            if increments * 0xFFFF >= max_increments_electra * random_value {
                return Ok(candidate);
            }
        } else {
            let mut preimage = [0u8; 40];
            preimage[..32].copy_from_slice(seed);
            preimage[32..].copy_from_slice(&(i / 32).to_le_bytes());
            let random_byte = hash_fixed(&preimage)[(i % 32) as usize] as u64;
            if increments * 255 >= max_increments_pre * random_byte {
                return Ok(candidate);
            }
        }
        i += 1;
    }
}

/// Balance-weighted sync-committee sampling at the period boundary.
pub fn compute_sync_committee(
    state: &BeaconState,
    epoch: Epoch,
) -> Result<(SyncCommittee, Vec<u32>), CacheError> {
    let base_epoch = epoch - epoch % consts::EPOCHS_PER_SYNC_COMMITTEE_PERIOD;
    let active_indices = state.get_active_validator_indices(base_epoch);
    let seed = get_seed(state, base_epoch, consts::DOMAIN_SYNC_COMMITTEE);
    let total = active_indices.len() as u64;
    if total == 0 {
        return Err(CacheError::InvalidIndicesType { index: 0, count: 0 });
    }

    let fork_gte_electra = state.fork_seq.gte(ForkSeq::Electra);
    let max_balance = if fork_gte_electra {
        consts::MAX_EFFECTIVE_BALANCE_ELECTRA
    } else {
        consts::MAX_EFFECTIVE_BALANCE
    };

    let mut indices: Vec<u32> = Vec::with_capacity(consts::SYNC_COMMITTEE_SIZE as usize);
    let mut i: u64 = 0;
    while (indices.len() as u64) < consts::SYNC_COMMITTEE_SIZE {
        let candidate = active_indices
            [compute_shuffled_index(i % total, total, &seed) as usize];
        let effective_balance = state.validators[candidate as usize].effective_balance;

        let selected = if fork_gte_electra {
            let mut preimage = [0u8; 40];
            preimage[..32].copy_from_slice(&seed);
            preimage[32..].copy_from_slice(&(i / 16).to_le_bytes());
            let digest = hash_fixed(&preimage);
            let offset = ((i % 16) * 2) as usize;
            let random_value = u16::from_le_bytes([digest[offset], digest[offset + 1]]) as u64;
            effective_balance * 0xFFFF >= max_balance * random_value
        } else {
            let mut preimage = [0u8; 40];
            preimage[..32].copy_from_slice(&seed);
            preimage[32..].copy_from_slice(&(i / 32).to_le_bytes());
            let random_byte = hash_fixed(&preimage)[(i % 32) as usize] as u64;
            effective_balance * 255 >= max_balance * random_byte
        };
        if selected {
            indices.push(candidate);
        }
        i += 1;
    }

    let pubkeys: Vec<BlsPublicKey> = indices
        .iter()
        .map(|index| state.validators[*index as usize].pubkey.clone())
        .collect();
    let deserialized: Vec<PublicKey> = pubkeys
        .iter()
        .map(|pk| PublicKey::deserialize(pk))
        .collect::<Result<_, _>>()?;
    let refs: Vec<&PublicKey> = deserialized.iter().collect();
    let aggregate = AggregatePublicKey::aggregate(&refs)?.to_public_key();

    let committee = SyncCommittee {
        pubkeys: FixedVector::from(pubkeys),
        aggregate_pubkey: BlsPublicKey::from(aggregate.compress().to_vec()),
    };
    Ok((committee, indices))
}

/// The indexed view of the current sync committee: validator indices plus
/// the aggregate pubkey, resolved once per rotation.
#[derive(Debug, Clone)]
pub struct SyncCommitteeIndexed {
    pub validator_indices: Vec<u32>,
    pub aggregate_pubkey: [u8; 48],
}

#[derive(Debug, Clone)]
pub struct EpochCache {
    pub epoch: Epoch,
    previous: Arc<EpochShuffling>,
    current: Arc<EpochShuffling>,
    next: Arc<EpochShuffling>,
    proposers: [u32; consts::SLOTS_PER_EPOCH as usize],
    /// `MIN_SEED_LOOKAHEAD + 1` epochs of proposers, mirrored from the Fulu
    /// state field.
    proposer_lookahead: Vec<u32>,
    sync_committee: SyncCommitteeIndexed,
    effective_balance_increments: Vec<u16>,
    pub churn_limit: u64,
    pub activation_churn_limit: u64,
    pub base_reward_per_increment: u64,
    pub sync_participant_reward: u64,
    pub sync_proposer_reward: u64,
}

impl EpochCache {
    pub fn new(
        state: &BeaconState,
        config: &BeaconConfig,
        pubkey_index: &PubkeyIndex,
    ) -> Result<Self, CacheError> {
        let epoch = state.current_epoch();
        let previous = Self::build_shuffling(state, config, epoch.saturating_sub(1))?;
        let current = Self::build_shuffling(state, config, epoch)?;
        let next = Self::build_shuffling(state, config, epoch + 1)?;
        Self::assemble(state, config, pubkey_index, previous, current, next)
    }

    /// Epoch-boundary rotation: previous ← current ← next, next recomputed.
    /// Shufflings are shared; the dropped previous frees with its last
    /// holder.
    pub fn rotated(
        &self,
        state: &BeaconState,
        config: &BeaconConfig,
        pubkey_index: &PubkeyIndex,
    ) -> Result<Self, CacheError> {
        let epoch = state.current_epoch();
        debug_assert_eq!(epoch, self.epoch + 1);
        let next = Self::build_shuffling(state, config, epoch + 1)?;
        Self::assemble(
            state,
            config,
            pubkey_index,
            Arc::clone(&self.current),
            Arc::clone(&self.next),
            next,
        )
    }

    fn build_shuffling(
        state: &BeaconState,
        config: &BeaconConfig,
        epoch: Epoch,
    ) -> Result<Arc<EpochShuffling>, CacheError> {
        let seed = get_seed(state, epoch, consts::DOMAIN_BEACON_ATTESTER);
        EpochShuffling::init(&seed, epoch, state.get_active_validator_indices(epoch), config)
    }

    fn assemble(
        state: &BeaconState,
        config: &BeaconConfig,
        pubkey_index: &PubkeyIndex,
        previous: Arc<EpochShuffling>,
        current: Arc<EpochShuffling>,
        next: Arc<EpochShuffling>,
    ) -> Result<Self, CacheError> {
        let epoch = state.current_epoch();
        let fork = state.fork_seq;

        let effective_balance_increments: Vec<u16> = state
            .validators
            .iter()
            .map(|v| (v.effective_balance / consts::EFFECTIVE_BALANCE_INCREMENT) as u16)
            .collect();

        // Proposers for every slot of the epoch.
        let mut proposers = [0u32; consts::SLOTS_PER_EPOCH as usize];
        let epoch_seed = get_seed(state, epoch, consts::DOMAIN_BEACON_PROPOSER);
        for (slot_in_epoch, proposer) in proposers.iter_mut().enumerate() {
            let slot = epoch * consts::SLOTS_PER_EPOCH + slot_in_epoch as u64;
            let seed = slot_proposer_seed(&epoch_seed, slot);
            *proposer = compute_proposer_index(
                fork,
                &current.active_indices,
                &seed,
                &effective_balance_increments,
            )?;
        }

        let proposer_lookahead = if fork.gte(ForkSeq::Fulu) {
            state.proposer_lookahead.iter().map(|v| *v as u32).collect()
        } else {
            Vec::new()
        };

        // Indexed sync committee (Altair+); the genesis committee of earlier
        // forks stays empty.
        let sync_committee = if fork.gte(ForkSeq::Altair) {
            Self::index_sync_committee(state, pubkey_index)?
        } else {
            SyncCommitteeIndexed { validator_indices: Vec::new(), aggregate_pubkey: [0u8; 48] }
        };

        let total_active_balance = state.get_total_active_balance();
        let total_active_increments = total_active_balance / consts::EFFECTIVE_BALANCE_INCREMENT;
        let base_reward_per_increment = consts::EFFECTIVE_BALANCE_INCREMENT
            * consts::BASE_REWARD_FACTOR
            / integer_squareroot(total_active_balance);
        let total_base_rewards = base_reward_per_increment * total_active_increments;
        let max_participant_rewards = total_base_rewards * consts::SYNC_REWARD_WEIGHT
            / consts::WEIGHT_DENOMINATOR
            / consts::SLOTS_PER_EPOCH;
        let sync_participant_reward = max_participant_rewards / consts::SYNC_COMMITTEE_SIZE;
        let sync_proposer_reward = sync_participant_reward * consts::PROPOSER_WEIGHT
            / (consts::WEIGHT_DENOMINATOR - consts::PROPOSER_WEIGHT);

        let active_count = current.active_indices.len() as u64;
        Ok(EpochCache {
            epoch,
            previous,
            current,
            next,
            proposers,
            proposer_lookahead,
            sync_committee,
            effective_balance_increments,
            churn_limit: config.churn_limit(active_count),
            activation_churn_limit: config.activation_churn_limit(active_count),
            base_reward_per_increment,
            sync_participant_reward,
            sync_proposer_reward,
        })
    }

    fn index_sync_committee(
        state: &BeaconState,
        pubkey_index: &PubkeyIndex,
    ) -> Result<SyncCommitteeIndexed, CacheError> {
        if !pubkey_index.is_initialized() {
            return Err(CacheError::PubkeyIndexNotInitialized);
        }
        let mut validator_indices =
            Vec::with_capacity(state.current_sync_committee.pubkeys.len());
        for pubkey in state.current_sync_committee.pubkeys.iter() {
            let index = pubkey_index
                .get_index(pubkey)?
                .ok_or(CacheError::PubkeyIndexNotInitialized)?;
            validator_indices.push(index);
        }
        let mut aggregate_pubkey = [0u8; 48];
        aggregate_pubkey
            .copy_from_slice(&state.current_sync_committee.aggregate_pubkey[..]);
        Ok(SyncCommitteeIndexed { validator_indices, aggregate_pubkey })
    }

    pub fn get_beacon_proposer(&self, slot: Slot) -> u32 {
        self.proposers[(slot % consts::SLOTS_PER_EPOCH) as usize]
    }

    /// Fulu lookahead: proposers for this epoch and the next
    /// `MIN_SEED_LOOKAHEAD` epochs.
    pub fn get_proposer_lookahead(&self, slot: Slot) -> Option<u32> {
        let epoch_offset = compute_epoch_at_slot(slot).checked_sub(self.epoch)?;
        let position = epoch_offset * consts::SLOTS_PER_EPOCH + slot % consts::SLOTS_PER_EPOCH;
        self.proposer_lookahead.get(position as usize).copied()
    }

    pub fn get_effective_balance_increments(&self) -> &[u16] {
        &self.effective_balance_increments
    }

    pub fn get_current_epoch_shuffling(&self) -> &Arc<EpochShuffling> {
        &self.current
    }

    pub fn get_previous_epoch_shuffling(&self) -> &Arc<EpochShuffling> {
        &self.previous
    }

    pub fn get_next_epoch_shuffling(&self) -> &Arc<EpochShuffling> {
        &self.next
    }

    pub fn shuffling_at(&self, epoch: Epoch) -> Result<&Arc<EpochShuffling>, CacheError> {
        if epoch == self.current.epoch {
            Ok(&self.current)
        } else if epoch == self.previous.epoch {
            Ok(&self.previous)
        } else if epoch == self.next.epoch {
            Ok(&self.next)
        } else {
            Err(CacheError::EpochShufflingNotFound(epoch))
        }
    }

    /// Beacon committee for an attestation slot.
    pub fn get_beacon_committee(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> Result<&[u32], CacheError> {
        let epoch = compute_epoch_at_slot(slot);
        let shuffling = self.shuffling_at(epoch)?;
        shuffling
            .committee(slot % consts::SLOTS_PER_EPOCH, committee_index)
            .ok_or(CacheError::EpochShufflingNotFound(epoch))
    }

    pub fn sync_committee_indexed(&self) -> &SyncCommitteeIndexed {
        &self.sync_committee
    }

    /// Swap in a freshly rotated sync committee (sync-committee update
    /// epoch boundaries).
    pub fn rotate_sync_committee_indexed(&mut self, indices: Vec<u32>, aggregate_pubkey: [u8; 48]) {
        self.sync_committee = SyncCommitteeIndexed {
            validator_indices: indices,
            aggregate_pubkey,
        };
    }
}

fn slot_proposer_seed(epoch_seed: &[u8; 32], slot: Slot) -> [u8; 32] {
    let mut preimage = [0u8; 40];
    preimage[..32].copy_from_slice(epoch_seed);
    preimage[32..].copy_from_slice(&slot.to_le_bytes());
    let digest = hash(&preimage);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shuffled_index_is_a_permutation() {
        let seed = [9u8; 32];
        let count = 100u64;
        let mut seen = vec![false; count as usize];
        for index in 0..count {
            let shuffled = compute_shuffled_index(index, count, &seed);
            assert!(shuffled < count);
            assert!(!seen[shuffled as usize], "duplicate target {shuffled}");
            seen[shuffled as usize] = true;
        }
    }

    #[test]
    fn single_index_matches_list_unshuffle() {
        use crate::caches::shuffling::inner_shuffle_list;
        let seed = [4u8; 32];
        let count = 67u32;
        let mut list: Vec<u32> = (0..count).collect();
        inner_shuffle_list(&mut list, &seed, consts::SHUFFLE_ROUND_COUNT as u64, false).unwrap();
        for index in 0..count as u64 {
            assert_eq!(
                list[index as usize] as u64,
                compute_shuffled_index(index, count as u64, &seed)
            );
        }
    }

    #[test]
    fn proposer_sampling_is_deterministic_and_in_range() {
        let active: Vec<u32> = (0..50).collect();
        let increments = vec![32u16; 50];
        let seed = [2u8; 32];
        let a = compute_proposer_index(ForkSeq::Deneb, &active, &seed, &increments).unwrap();
        let b = compute_proposer_index(ForkSeq::Deneb, &active, &seed, &increments).unwrap();
        assert_eq!(a, b);
        assert!(active.contains(&a));

        let electra =
            compute_proposer_index(ForkSeq::Electra, &active, &seed, &increments).unwrap();
        assert!(active.contains(&electra));
    }

    #[test]
    fn empty_active_set_is_rejected() {
        assert!(compute_proposer_index(ForkSeq::Deneb, &[], &[0u8; 32], &[]).is_err());
    }
}
