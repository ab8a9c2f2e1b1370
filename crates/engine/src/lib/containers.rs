//! Consensus-layer containers.
//!
//! Single-struct modeling: containers whose layout grew across forks carry
//! their newest fields, and the per-fork codecs in `block`/`state` gate what
//! goes on the wire. Field order everywhere is the SSZ field order.

use derive_more::Debug;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
pub use ssz_types::{typenum, typenum::Unsigned, BitList, BitVector, FixedVector, VariableList};
use tree_hash_derive::TreeHash;

use crate::consts;
use crate::eth_spec;

pub type Address = alloy_primitives::Address;
pub type Hash256 = alloy_primitives::B256;
pub type Uint256 = alloy_primitives::U256;
pub type Root = Hash256;

pub type Slot = u64;
pub type Epoch = u64;
pub type CommitteeIndex = u64;
pub type ValidatorIndex = u64;
pub type WithdrawalIndex = u64;
pub type Gwei = u64;
pub type ParticipationFlags = u8;
pub type WithdrawalCredentials = Hash256;

/// Raw fork version, as the config carries it.
pub type Version = [u8; 4];
/// Fork version in SSZ containers.
pub type ForkVersion = FixedVector<u8, typenum::U4>;
pub type BlsPublicKey = FixedVector<u8, typenum::U48>;
pub type BlsSignature = FixedVector<u8, typenum::U96>;
pub type KzgCommitment = FixedVector<u8, typenum::U48>;
pub type Graffiti = Hash256;

pub type Validators = VariableList<Validator, eth_spec::ValidatorRegistryLimit>;
pub type Balances = VariableList<Gwei, eth_spec::ValidatorRegistryLimit>;
pub type Participation = VariableList<ParticipationFlags, eth_spec::ValidatorRegistryLimit>;
pub type InactivityScores = VariableList<u64, eth_spec::ValidatorRegistryLimit>;
pub type JustificationBits = BitVector<eth_spec::JustificationBitsLength>;

pub fn fork_version(version: Version) -> ForkVersion {
    ForkVersion::from(version.to_vec())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Fork {
    pub previous_version: ForkVersion,
    pub current_version: ForkVersion,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ForkData {
    pub current_version: ForkVersion,
    pub genesis_validators_root: Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SigningData {
    pub object_root: Root,
    pub domain: Hash256,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Root,
    pub state_root: Root,
    pub body_root: Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: BlsSignature,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Eth1Data {
    pub deposit_root: Root,
    pub deposit_count: u64,
    pub block_hash: Hash256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Validator {
    #[debug("{:#?}", hex::encode(pubkey.to_vec()))]
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Validator {
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn is_slashable_at(&self, epoch: Epoch) -> bool {
        !self.slashed
            && self.activation_epoch <= epoch
            && epoch < self.withdrawable_epoch
    }

    pub fn is_eligible_for_activation_queue(&self, fork_gte_electra: bool) -> bool {
        let threshold = if fork_gte_electra {
            consts::MIN_ACTIVATION_BALANCE
        } else {
            consts::MAX_EFFECTIVE_BALANCE
        };
        self.activation_eligibility_epoch == consts::FAR_FUTURE_EPOCH
            && self.effective_balance >= threshold
    }

    pub fn has_eth1_withdrawal_credential(&self) -> bool {
        self.withdrawal_credentials[0] == consts::ETH1_ADDRESS_WITHDRAWAL_PREFIX
    }

    pub fn has_compounding_withdrawal_credential(&self) -> bool {
        self.withdrawal_credentials[0] == consts::COMPOUNDING_WITHDRAWAL_PREFIX
    }

    /// Either prefix that can receive automatic withdrawals.
    pub fn has_execution_withdrawal_credential(&self) -> bool {
        self.has_eth1_withdrawal_credential() || self.has_compounding_withdrawal_credential()
    }

    pub fn max_effective_balance(&self, fork_gte_electra: bool) -> Gwei {
        if fork_gte_electra && self.has_compounding_withdrawal_credential() {
            consts::MAX_EFFECTIVE_BALANCE_ELECTRA
        } else if fork_gte_electra {
            consts::MIN_ACTIVATION_BALANCE
        } else {
            consts::MAX_EFFECTIVE_BALANCE
        }
    }

    pub fn is_fully_withdrawable_at(&self, balance: Gwei, epoch: Epoch) -> bool {
        self.has_execution_withdrawal_credential()
            && self.withdrawable_epoch <= epoch
            && balance > 0
    }

    pub fn is_partially_withdrawable(&self, balance: Gwei, fork_gte_electra: bool) -> bool {
        let max_effective = self.max_effective_balance(fork_gte_electra);
        self.has_execution_withdrawal_credential()
            && self.effective_balance == max_effective
            && balance > max_effective
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub beacon_block_root: Root,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

/// Merged attestation: `committee_bits` joined in Electra. The body codec
/// writes the three-field layout for earlier forks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Attestation {
    pub aggregation_bits: BitList<eth_spec::MaxAggregationBits>,
    pub data: AttestationData,
    #[debug("{:#?}", hex::encode(signature.to_vec()))]
    pub signature: BlsSignature,
    pub committee_bits: BitVector<eth_spec::MaxCommitteesPerSlot>,
}

impl Attestation {
    /// Committees addressed by an Electra aggregate.
    pub fn committee_indices(&self) -> Vec<CommitteeIndex> {
        self.committee_bits
            .iter()
            .enumerate()
            .filter_map(|(i, bit)| bit.then_some(i as CommitteeIndex))
            .collect()
    }
}

/// Merged indexed attestation; the index-list limit is the Electra one, the
/// pre-Electra bound is enforced where attestations are validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct IndexedAttestation {
    pub attesting_indices: VariableList<u64, eth_spec::MaxAggregationBits>,
    pub data: AttestationData,
    pub signature: BlsSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PendingAttestation {
    pub aggregation_bits: BitList<eth_spec::MaxValidatorsPerCommittee>,
    pub data: AttestationData,
    pub inclusion_delay: Slot,
    pub proposer_index: ValidatorIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ProposerSlashing {
    pub signed_header_1: SignedBeaconBlockHeader,
    pub signed_header_2: SignedBeaconBlockHeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct DepositMessage {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub amount: Gwei,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct DepositData {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub amount: Gwei,
    pub signature: BlsSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Deposit {
    /// Branch against the deposit-contract tree plus its length mixin.
    pub proof: FixedVector<Hash256, typenum::U33>,
    pub data: DepositData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct VoluntaryExit {
    pub epoch: Epoch,
    pub validator_index: ValidatorIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: BlsSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BlsToExecutionChange {
    pub validator_index: ValidatorIndex,
    pub from_bls_pubkey: BlsPublicKey,
    pub to_execution_address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBlsToExecutionChange {
    pub message: BlsToExecutionChange,
    pub signature: BlsSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncAggregate {
    pub sync_committee_bits: BitVector<eth_spec::SyncCommitteeSize>,
    pub sync_committee_signature: BlsSignature,
}

impl SyncAggregate {
    pub fn empty() -> Self {
        SyncAggregate {
            sync_committee_bits: BitVector::new(),
            sync_committee_signature: BlsSignature::from(
                beacon_bls::INFINITY_SIGNATURE.to_vec(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncCommittee {
    pub pubkeys: FixedVector<BlsPublicKey, eth_spec::SyncCommitteeSize>,
    pub aggregate_pubkey: BlsPublicKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Withdrawal {
    pub index: WithdrawalIndex,
    pub validator_index: ValidatorIndex,
    pub address: Address,
    pub amount: Gwei,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct HistoricalBatch {
    pub block_roots: FixedVector<Hash256, eth_spec::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<Hash256, eth_spec::SlotsPerHistoricalRoot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct HistoricalSummary {
    pub block_summary_root: Root,
    pub state_summary_root: Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PendingDeposit {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub amount: Gwei,
    pub signature: BlsSignature,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PendingPartialWithdrawal {
    pub validator_index: ValidatorIndex,
    pub amount: Gwei,
    pub withdrawable_epoch: Epoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PendingConsolidation {
    pub source_index: ValidatorIndex,
    pub target_index: ValidatorIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct DepositRequest {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub amount: Gwei,
    pub signature: BlsSignature,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct WithdrawalRequest {
    pub source_address: Address,
    pub validator_pubkey: BlsPublicKey,
    pub amount: Gwei,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ConsolidationRequest {
    pub source_address: Address,
    pub source_pubkey: BlsPublicKey,
    pub target_pubkey: BlsPublicKey,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ExecutionRequests {
    pub deposits: VariableList<DepositRequest, eth_spec::MaxDepositRequestsPerPayload>,
    pub withdrawals: VariableList<WithdrawalRequest, eth_spec::MaxWithdrawalRequestsPerPayload>,
    pub consolidations:
        VariableList<ConsolidationRequest, eth_spec::MaxConsolidationRequestsPerPayload>,
}

#[cfg(test)]
mod test {
    use super::*;
    use ssz::{Decode, Encode};
    use tree_hash::TreeHash;

    #[test]
    fn checkpoint_ssz_layout() {
        let checkpoint = Checkpoint { epoch: 42, root: Hash256::repeat_byte(1) };
        let bytes = checkpoint.as_ssz_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..8], &42u64.to_le_bytes());
        assert_eq!(&bytes[8..], &[1u8; 32][..]);
        assert_eq!(Checkpoint::from_ssz_bytes(&bytes).unwrap(), checkpoint);
    }

    #[test]
    fn checkpoint_root_is_two_leaves() {
        let checkpoint = Checkpoint { epoch: 42, root: Hash256::repeat_byte(1) };
        let mut epoch_leaf = [0u8; 32];
        epoch_leaf[..8].copy_from_slice(&42u64.to_le_bytes());
        let expected = ethereum_hashing::hash32_concat(&epoch_leaf, &[1u8; 32]);
        assert_eq!(checkpoint.tree_hash_root().0, expected);
    }

    #[test]
    fn validator_predicates() {
        let mut validator = Validator {
            pubkey: BlsPublicKey::from(vec![0u8; 48]),
            withdrawal_credentials: Hash256::ZERO,
            effective_balance: consts::MAX_EFFECTIVE_BALANCE,
            slashed: false,
            activation_eligibility_epoch: 0,
            activation_epoch: 5,
            exit_epoch: 10,
            withdrawable_epoch: 20,
        };
        assert!(!validator.is_active_at(4));
        assert!(validator.is_active_at(5));
        assert!(validator.is_active_at(9));
        assert!(!validator.is_active_at(10));

        assert!(validator.is_slashable_at(9));
        assert!(validator.is_slashable_at(19));
        assert!(!validator.is_slashable_at(20));
        validator.slashed = true;
        assert!(!validator.is_slashable_at(9));

        assert!(!validator.has_execution_withdrawal_credential());
        validator.withdrawal_credentials.0[0] = consts::ETH1_ADDRESS_WITHDRAWAL_PREFIX;
        assert!(validator.has_eth1_withdrawal_credential());
        validator.withdrawal_credentials.0[0] = consts::COMPOUNDING_WITHDRAWAL_PREFIX;
        assert!(validator.has_compounding_withdrawal_credential());
        assert_eq!(
            validator.max_effective_balance(true),
            consts::MAX_EFFECTIVE_BALANCE_ELECTRA
        );
        assert_eq!(validator.max_effective_balance(false), consts::MAX_EFFECTIVE_BALANCE);
    }

    #[test]
    fn empty_sync_aggregate_carries_infinity() {
        let aggregate = SyncAggregate::empty();
        assert_eq!(aggregate.sync_committee_bits.num_set_bits(), 0);
        assert_eq!(aggregate.sync_committee_signature[0], 0xc0);
    }

    #[test]
    fn validator_ssz_round_trip() {
        let validator = Validator {
            pubkey: BlsPublicKey::from(vec![7u8; 48]),
            withdrawal_credentials: Hash256::repeat_byte(2),
            effective_balance: 32_000_000_000,
            slashed: true,
            activation_eligibility_epoch: 1,
            activation_epoch: 2,
            exit_epoch: 3,
            withdrawable_epoch: 4,
        };
        let bytes = validator.as_ssz_bytes();
        assert_eq!(bytes.len(), 121);
        assert_eq!(Validator::from_ssz_bytes(&bytes).unwrap(), validator);
    }
}
