//! Signature-set collection for batched block verification.
//!
//! Every BLS check a block implies is materialized as a
//! (pubkey, message, signature) triple; the batch verifier reduces them to a
//! single pairing product. Collection runs against the slot-advanced
//! pre-state, before any block mutation.

use beacon_bls::{AggregatePublicKey, PublicKey, PubkeyIndex, Signature};
use tree_hash::TreeHash;

use crate::block::SignedBeaconBlock;
use crate::caches::EpochCache;
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{Hash256, IndexedAttestation};
use crate::errors::{BlockError, TransitionError};
use crate::fork::ForkSeq;
use crate::helpers::{
    compute_domain, compute_epoch_at_slot, compute_signing_root, compute_signing_root_for_root,
    get_domain,
};
use crate::state::BeaconState;
use crate::transition::block::get_attesting_indices;

#[derive(Default)]
pub struct SignatureSets {
    pub pubkeys: Vec<PublicKey>,
    pub messages: Vec<[u8; 32]>,
    pub signatures: Vec<Signature>,
}

impl SignatureSets {
    pub fn is_empty(&self) -> bool {
        self.pubkeys.is_empty()
    }

    fn push(&mut self, pubkey: PublicKey, message: Hash256, signature: &[u8]) -> Result<(), TransitionError> {
        self.pubkeys.push(pubkey);
        self.messages.push(message.0);
        self.signatures.push(
            Signature::deserialize(signature).map_err(|_| BlockError::SignatureBatchInvalid)?,
        );
        Ok(())
    }
}

fn validator_pubkey(
    state: &BeaconState,
    pubkey_index: &PubkeyIndex,
    index: u64,
) -> Result<PublicKey, TransitionError> {
    if let Some(pubkey) = pubkey_index.get(index as u32) {
        return Ok(pubkey.clone());
    }
    let validator = state
        .validators
        .get(index as usize)
        .ok_or(BlockError::SignatureBatchInvalid)?;
    PublicKey::deserialize(&validator.pubkey).map_err(TransitionError::from)
}

fn aggregate_pubkeys(
    state: &BeaconState,
    pubkey_index: &PubkeyIndex,
    indices: &[u64],
) -> Result<PublicKey, TransitionError> {
    let members: Vec<PublicKey> = indices
        .iter()
        .map(|index| validator_pubkey(state, pubkey_index, *index))
        .collect::<Result<_, _>>()?;
    let refs: Vec<&PublicKey> = members.iter().collect();
    Ok(AggregatePublicKey::aggregate(&refs)?.to_public_key())
}

fn indexed_attestation_set(
    sets: &mut SignatureSets,
    state: &BeaconState,
    pubkey_index: &PubkeyIndex,
    indexed: &IndexedAttestation,
) -> Result<(), TransitionError> {
    let domain = get_domain(state, consts::DOMAIN_BEACON_ATTESTER, indexed.data.target.epoch);
    let message = compute_signing_root(&indexed.data, domain);
    let aggregate = aggregate_pubkeys(state, pubkey_index, &indexed.attesting_indices)?;
    sets.push(aggregate, message, &indexed.signature)
}

/// Gather the block's proposer signature set.
pub fn proposer_signature_set(
    state: &BeaconState,
    pubkey_index: &PubkeyIndex,
    signed_block: &SignedBeaconBlock,
) -> Result<SignatureSets, TransitionError> {
    let mut sets = SignatureSets::default();
    let block = &signed_block.message;
    let epoch = compute_epoch_at_slot(block.slot);
    let domain = get_domain(state, consts::DOMAIN_BEACON_PROPOSER, epoch);
    let message =
        compute_signing_root_for_root(block.hash_tree_root_at(state.fork_seq), domain);
    let pubkey = validator_pubkey(state, pubkey_index, block.proposer_index)?;
    sets.push(pubkey, message, &signed_block.signature)?;
    Ok(sets)
}

/// Gather every signature set inside the block body.
pub fn block_signature_sets(
    state: &BeaconState,
    cache: &EpochCache,
    config: &BeaconConfig,
    pubkey_index: &PubkeyIndex,
    signed_block: &SignedBeaconBlock,
) -> Result<SignatureSets, TransitionError> {
    let mut sets = SignatureSets::default();
    let block = &signed_block.message;
    let body = &block.body;
    let epoch = state.current_epoch();
    let fork = state.fork_seq;

    // Randao reveal: the proposer signs the epoch number.
    {
        let domain = get_domain(state, consts::DOMAIN_RANDAO, epoch);
        let message = compute_signing_root(&epoch, domain);
        let pubkey = validator_pubkey(state, pubkey_index, block.proposer_index)?;
        sets.push(pubkey, message, &body.randao_reveal)?;
    }

    for slashing in body.proposer_slashings.iter() {
        for signed_header in [&slashing.signed_header_1, &slashing.signed_header_2] {
            let header_epoch = compute_epoch_at_slot(signed_header.message.slot);
            let domain = get_domain(state, consts::DOMAIN_BEACON_PROPOSER, header_epoch);
            let message = compute_signing_root(&signed_header.message, domain);
            let pubkey =
                validator_pubkey(state, pubkey_index, signed_header.message.proposer_index)?;
            sets.push(pubkey, message, &signed_header.signature)?;
        }
    }

    for slashing in body.attester_slashings.iter() {
        indexed_attestation_set(&mut sets, state, pubkey_index, &slashing.attestation_1)?;
        indexed_attestation_set(&mut sets, state, pubkey_index, &slashing.attestation_2)?;
    }

    for attestation in body.attestations.iter() {
        let attesting = get_attesting_indices(state, cache, attestation)?;
        let indices: Vec<u64> = attesting.iter().map(|i| *i as u64).collect();
        let domain =
            get_domain(state, consts::DOMAIN_BEACON_ATTESTER, attestation.data.target.epoch);
        let message = compute_signing_root(&attestation.data, domain);
        let aggregate = aggregate_pubkeys(state, pubkey_index, &indices)?;
        sets.push(aggregate, message, &attestation.signature)?;
    }

    for exit in body.voluntary_exits.iter() {
        // EIP-7044: exits sign under the Capella domain from Deneb on, so
        // they stay valid across later forks.
        let domain = if fork.gte(ForkSeq::Deneb) {
            compute_domain(
                consts::DOMAIN_VOLUNTARY_EXIT,
                config.capella_fork_version,
                state.genesis_validators_root,
            )
        } else {
            get_domain(state, consts::DOMAIN_VOLUNTARY_EXIT, exit.message.epoch)
        };
        let message = compute_signing_root(&exit.message, domain);
        let pubkey = validator_pubkey(state, pubkey_index, exit.message.validator_index)?;
        sets.push(pubkey, message, &exit.signature)?;
    }

    if fork.gte(ForkSeq::Capella) {
        for change in body.bls_to_execution_changes.iter() {
            // Bound to the genesis fork so changes survive forks unsigned
            // validators prepared long ago.
            let domain = compute_domain(
                consts::DOMAIN_BLS_TO_EXECUTION_CHANGE,
                config.genesis_fork_version,
                state.genesis_validators_root,
            );
            let message = compute_signing_root(&change.message, domain);
            let pubkey = PublicKey::deserialize(&change.message.from_bls_pubkey)?;
            sets.push(pubkey, message, &change.signature)?;
        }
    }

    if fork.gte(ForkSeq::Altair) && body.sync_aggregate.sync_committee_bits.num_set_bits() > 0 {
        let committee = cache.sync_committee_indexed();
        let mut participants = Vec::new();
        for (position, validator_index) in committee.validator_indices.iter().enumerate() {
            if body.sync_aggregate.sync_committee_bits.get(position).unwrap_or(false) {
                participants.push(*validator_index as u64);
            }
        }
        let previous_slot = state.slot.max(1) - 1;
        let domain = get_domain(
            state,
            consts::DOMAIN_SYNC_COMMITTEE,
            compute_epoch_at_slot(previous_slot),
        );
        let message =
            compute_signing_root_for_root(state.get_block_root_at_slot(previous_slot), domain);
        let aggregate = aggregate_pubkeys(state, pubkey_index, &participants)?;
        sets.push(aggregate, message, &body.sync_aggregate.sync_committee_signature)?;
    }

    Ok(sets)
}
