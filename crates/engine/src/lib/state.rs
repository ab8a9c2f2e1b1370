//! The beacon state, merged across all seven forks.
//!
//! One struct carries every field that any fork defines; `fork_seq` gates
//! which positions exist. Field positions are stable across forks (the
//! participation records at 15/16 change *type* at Altair but keep their
//! position; later forks only append), so one ordered field table per fork
//! drives the wire format, the byte-range overlay, and the container depth.

use serde::{Deserialize, Serialize};
use ssz::{Decode, Encode};
use tree_hash::TreeHash;

use crate::codec::{self, ContainerWriter, FieldKind};
use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{
    Balances, BeaconBlockHeader, Checkpoint, Epoch, Eth1Data, FixedVector, Fork, Gwei, Hash256,
    HistoricalSummary, InactivityScores, JustificationBits, Participation, PendingAttestation,
    PendingConsolidation, PendingDeposit, PendingPartialWithdrawal, Root, Slot, SyncCommittee,
    Validators, VariableList, fork_version,
};
use crate::errors::SszError;
use crate::eth_spec;
use crate::fork::ForkSeq;
use crate::payload::ExecutionPayloadHeader;

pub type BlockRoots = FixedVector<Hash256, eth_spec::SlotsPerHistoricalRoot>;
pub type StateRoots = FixedVector<Hash256, eth_spec::SlotsPerHistoricalRoot>;
pub type HistoricalRoots = VariableList<Hash256, eth_spec::HistoricalRootsLimit>;
pub type Eth1DataVotes = VariableList<Eth1Data, eth_spec::SlotsPerEth1VotingPeriod>;
pub type RandaoMixes = FixedVector<Hash256, eth_spec::EpochsPerHistoricalVector>;
pub type Slashings = FixedVector<Gwei, eth_spec::EpochsPerSlashingsVector>;
pub type EpochAttestations = VariableList<PendingAttestation, eth_spec::MaxPendingAttestations>;
pub type HistoricalSummaries = VariableList<HistoricalSummary, eth_spec::HistoricalRootsLimit>;
pub type PendingDeposits = VariableList<PendingDeposit, eth_spec::PendingDepositsLimit>;
pub type PendingPartialWithdrawals =
    VariableList<PendingPartialWithdrawal, eth_spec::PendingPartialWithdrawalsLimit>;
pub type PendingConsolidations =
    VariableList<PendingConsolidation, eth_spec::PendingConsolidationsLimit>;
pub type ProposerLookahead = FixedVector<u64, eth_spec::ProposerLookaheadSlots>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconState {
    pub fork_seq: ForkSeq,

    // Versioning
    pub genesis_time: u64,
    pub genesis_validators_root: Hash256,
    pub slot: Slot,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: BlockRoots,
    pub state_roots: StateRoots,
    pub historical_roots: HistoricalRoots,

    // Ethereum 1.0 chain data
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Eth1DataVotes,
    pub eth1_deposit_index: u64,

    // Registry
    pub validators: Validators,
    pub balances: Balances,

    // Randomness
    pub randao_mixes: RandaoMixes,

    // Slashings
    pub slashings: Slashings,

    // Participation: attestation records in Phase0, flags from Altair. The
    // pairs share positions 15/16.
    pub previous_epoch_attestations: EpochAttestations,
    pub current_epoch_attestations: EpochAttestations,
    pub previous_epoch_participation: Participation,
    pub current_epoch_participation: Participation,

    // Finality
    pub justification_bits: JustificationBits,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // Altair
    pub inactivity_scores: InactivityScores,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,

    // Bellatrix
    pub latest_execution_payload_header: ExecutionPayloadHeader,

    // Capella
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: HistoricalSummaries,

    // Electra
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: Gwei,
    pub exit_balance_to_consume: Gwei,
    pub earliest_exit_epoch: Epoch,
    pub consolidation_balance_to_consume: Gwei,
    pub earliest_consolidation_epoch: Epoch,
    pub pending_deposits: PendingDeposits,
    pub pending_partial_withdrawals: PendingPartialWithdrawals,
    pub pending_consolidations: PendingConsolidations,

    // Fulu
    pub proposer_lookahead: ProposerLookahead,
}

/// Semantic field identifiers; `state_fields` orders the ones a fork has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    GenesisTime,
    GenesisValidatorsRoot,
    Slot,
    Fork,
    LatestBlockHeader,
    BlockRoots,
    StateRoots,
    HistoricalRoots,
    Eth1Data,
    Eth1DataVotes,
    Eth1DepositIndex,
    Validators,
    Balances,
    RandaoMixes,
    Slashings,
    PreviousEpochAttestations,
    CurrentEpochAttestations,
    PreviousEpochParticipation,
    CurrentEpochParticipation,
    JustificationBits,
    PreviousJustifiedCheckpoint,
    CurrentJustifiedCheckpoint,
    FinalizedCheckpoint,
    InactivityScores,
    CurrentSyncCommittee,
    NextSyncCommittee,
    LatestExecutionPayloadHeader,
    NextWithdrawalIndex,
    NextWithdrawalValidatorIndex,
    HistoricalSummaries,
    DepositRequestsStartIndex,
    DepositBalanceToConsume,
    ExitBalanceToConsume,
    EarliestExitEpoch,
    ConsolidationBalanceToConsume,
    EarliestConsolidationEpoch,
    PendingDeposits,
    PendingPartialWithdrawals,
    PendingConsolidations,
    ProposerLookahead,
}

impl StateField {
    pub fn name(self) -> &'static str {
        match self {
            StateField::GenesisTime => "genesis_time",
            StateField::GenesisValidatorsRoot => "genesis_validators_root",
            StateField::Slot => "slot",
            StateField::Fork => "fork",
            StateField::LatestBlockHeader => "latest_block_header",
            StateField::BlockRoots => "block_roots",
            StateField::StateRoots => "state_roots",
            StateField::HistoricalRoots => "historical_roots",
            StateField::Eth1Data => "eth1_data",
            StateField::Eth1DataVotes => "eth1_data_votes",
            StateField::Eth1DepositIndex => "eth1_deposit_index",
            StateField::Validators => "validators",
            StateField::Balances => "balances",
            StateField::RandaoMixes => "randao_mixes",
            StateField::Slashings => "slashings",
            StateField::PreviousEpochAttestations => "previous_epoch_attestations",
            StateField::CurrentEpochAttestations => "current_epoch_attestations",
            StateField::PreviousEpochParticipation => "previous_epoch_participation",
            StateField::CurrentEpochParticipation => "current_epoch_participation",
            StateField::JustificationBits => "justification_bits",
            StateField::PreviousJustifiedCheckpoint => "previous_justified_checkpoint",
            StateField::CurrentJustifiedCheckpoint => "current_justified_checkpoint",
            StateField::FinalizedCheckpoint => "finalized_checkpoint",
            StateField::InactivityScores => "inactivity_scores",
            StateField::CurrentSyncCommittee => "current_sync_committee",
            StateField::NextSyncCommittee => "next_sync_committee",
            StateField::LatestExecutionPayloadHeader => "latest_execution_payload_header",
            StateField::NextWithdrawalIndex => "next_withdrawal_index",
            StateField::NextWithdrawalValidatorIndex => "next_withdrawal_validator_index",
            StateField::HistoricalSummaries => "historical_summaries",
            StateField::DepositRequestsStartIndex => "deposit_requests_start_index",
            StateField::DepositBalanceToConsume => "deposit_balance_to_consume",
            StateField::ExitBalanceToConsume => "exit_balance_to_consume",
            StateField::EarliestExitEpoch => "earliest_exit_epoch",
            StateField::ConsolidationBalanceToConsume => "consolidation_balance_to_consume",
            StateField::EarliestConsolidationEpoch => "earliest_consolidation_epoch",
            StateField::PendingDeposits => "pending_deposits",
            StateField::PendingPartialWithdrawals => "pending_partial_withdrawals",
            StateField::PendingConsolidations => "pending_consolidations",
            StateField::ProposerLookahead => "proposer_lookahead",
        }
    }
}

/// Ordered field positions of the fork's state container.
pub fn state_fields(fork: ForkSeq) -> Vec<StateField> {
    let mut fields = vec![
        StateField::GenesisTime,
        StateField::GenesisValidatorsRoot,
        StateField::Slot,
        StateField::Fork,
        StateField::LatestBlockHeader,
        StateField::BlockRoots,
        StateField::StateRoots,
        StateField::HistoricalRoots,
        StateField::Eth1Data,
        StateField::Eth1DataVotes,
        StateField::Eth1DepositIndex,
        StateField::Validators,
        StateField::Balances,
        StateField::RandaoMixes,
        StateField::Slashings,
    ];
    if fork.gte(ForkSeq::Altair) {
        fields.push(StateField::PreviousEpochParticipation);
        fields.push(StateField::CurrentEpochParticipation);
    } else {
        fields.push(StateField::PreviousEpochAttestations);
        fields.push(StateField::CurrentEpochAttestations);
    }
    fields.push(StateField::JustificationBits);
    fields.push(StateField::PreviousJustifiedCheckpoint);
    fields.push(StateField::CurrentJustifiedCheckpoint);
    fields.push(StateField::FinalizedCheckpoint);
    if fork.gte(ForkSeq::Altair) {
        fields.push(StateField::InactivityScores);
        fields.push(StateField::CurrentSyncCommittee);
        fields.push(StateField::NextSyncCommittee);
    }
    if fork.gte(ForkSeq::Bellatrix) {
        fields.push(StateField::LatestExecutionPayloadHeader);
    }
    if fork.gte(ForkSeq::Capella) {
        fields.push(StateField::NextWithdrawalIndex);
        fields.push(StateField::NextWithdrawalValidatorIndex);
        fields.push(StateField::HistoricalSummaries);
    }
    if fork.gte(ForkSeq::Electra) {
        fields.push(StateField::DepositRequestsStartIndex);
        fields.push(StateField::DepositBalanceToConsume);
        fields.push(StateField::ExitBalanceToConsume);
        fields.push(StateField::EarliestExitEpoch);
        fields.push(StateField::ConsolidationBalanceToConsume);
        fields.push(StateField::EarliestConsolidationEpoch);
        fields.push(StateField::PendingDeposits);
        fields.push(StateField::PendingPartialWithdrawals);
        fields.push(StateField::PendingConsolidations);
    }
    if fork.gte(ForkSeq::Fulu) {
        fields.push(StateField::ProposerLookahead);
    }
    fields
}

fn field_kind(field: StateField) -> FieldKind {
    match field {
        StateField::GenesisTime
        | StateField::Slot
        | StateField::Eth1DepositIndex
        | StateField::NextWithdrawalIndex
        | StateField::NextWithdrawalValidatorIndex
        | StateField::DepositRequestsStartIndex
        | StateField::DepositBalanceToConsume
        | StateField::ExitBalanceToConsume
        | StateField::EarliestExitEpoch
        | StateField::ConsolidationBalanceToConsume
        | StateField::EarliestConsolidationEpoch => FieldKind::Fixed(8),
        StateField::GenesisValidatorsRoot => FieldKind::Fixed(32),
        StateField::Fork => FieldKind::Fixed(16),
        StateField::LatestBlockHeader => FieldKind::Fixed(112),
        StateField::BlockRoots | StateField::StateRoots => FieldKind::Fixed(8192 * 32),
        StateField::Eth1Data => FieldKind::Fixed(72),
        StateField::RandaoMixes => FieldKind::Fixed(65536 * 32),
        StateField::Slashings => FieldKind::Fixed(8192 * 8),
        StateField::JustificationBits => FieldKind::Fixed(1),
        StateField::PreviousJustifiedCheckpoint
        | StateField::CurrentJustifiedCheckpoint
        | StateField::FinalizedCheckpoint => FieldKind::Fixed(40),
        StateField::CurrentSyncCommittee | StateField::NextSyncCommittee => {
            FieldKind::Fixed(512 * 48 + 48)
        }
        StateField::ProposerLookahead => FieldKind::Fixed(64 * 8),
        StateField::HistoricalRoots
        | StateField::Eth1DataVotes
        | StateField::Validators
        | StateField::Balances
        | StateField::PreviousEpochAttestations
        | StateField::CurrentEpochAttestations
        | StateField::PreviousEpochParticipation
        | StateField::CurrentEpochParticipation
        | StateField::InactivityScores
        | StateField::LatestExecutionPayloadHeader
        | StateField::HistoricalSummaries
        | StateField::PendingDeposits
        | StateField::PendingPartialWithdrawals
        | StateField::PendingConsolidations => FieldKind::Variable,
    }
}

pub fn state_field_kinds(fork: ForkSeq) -> Vec<FieldKind> {
    state_fields(fork).into_iter().map(field_kind).collect()
}

/// Byte range of every field of a serialized state at `fork`; the overlay
/// hook used by the deserialization override.
pub fn read_field_ranges(
    fork: ForkSeq,
    bytes: &[u8],
) -> Result<Vec<(StateField, std::ops::Range<usize>)>, SszError> {
    let fields = state_fields(fork);
    let kinds = state_field_kinds(fork);
    let ranges = codec::read_field_ranges(&kinds, bytes)?;
    Ok(fields.into_iter().zip(ranges).collect())
}

fn empty_sync_committee() -> SyncCommittee {
    SyncCommittee {
        pubkeys: FixedVector::default(),
        aggregate_pubkey: FixedVector::default(),
    }
}

impl BeaconState {
    /// A defaulted state at the given fork, with fork versions taken from
    /// the config's schedule.
    pub fn empty(fork: ForkSeq, config: &BeaconConfig) -> Self {
        let previous = match fork {
            ForkSeq::Phase0 => ForkSeq::Phase0,
            other => ForkSeq::at_epoch(config, config.fork_epoch(other).saturating_sub(1)),
        };
        BeaconState {
            fork_seq: fork,
            genesis_time: 0,
            genesis_validators_root: Hash256::ZERO,
            slot: 0,
            fork: Fork {
                previous_version: fork_version(config.fork_version(previous)),
                current_version: fork_version(config.fork_version(fork)),
                epoch: config.fork_epoch(fork),
            },
            latest_block_header: BeaconBlockHeader::default(),
            block_roots: FixedVector::default(),
            state_roots: FixedVector::default(),
            historical_roots: VariableList::empty(),
            eth1_data: Eth1Data::default(),
            eth1_data_votes: VariableList::empty(),
            eth1_deposit_index: 0,
            validators: VariableList::empty(),
            balances: VariableList::empty(),
            randao_mixes: FixedVector::default(),
            slashings: FixedVector::default(),
            previous_epoch_attestations: VariableList::empty(),
            current_epoch_attestations: VariableList::empty(),
            previous_epoch_participation: VariableList::empty(),
            current_epoch_participation: VariableList::empty(),
            justification_bits: JustificationBits::new(),
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
            inactivity_scores: VariableList::empty(),
            current_sync_committee: empty_sync_committee(),
            next_sync_committee: empty_sync_committee(),
            latest_execution_payload_header: ExecutionPayloadHeader::default(),
            next_withdrawal_index: 0,
            next_withdrawal_validator_index: 0,
            historical_summaries: VariableList::empty(),
            deposit_requests_start_index: consts::UNSET_DEPOSIT_REQUESTS_START_INDEX,
            deposit_balance_to_consume: 0,
            exit_balance_to_consume: 0,
            earliest_exit_epoch: 0,
            consolidation_balance_to_consume: 0,
            earliest_consolidation_epoch: 0,
            pending_deposits: VariableList::empty(),
            pending_partial_withdrawals: VariableList::empty(),
            pending_consolidations: VariableList::empty(),
            proposer_lookahead: FixedVector::default(),
        }
    }

    pub fn current_epoch(&self) -> Epoch {
        self.slot / consts::SLOTS_PER_EPOCH
    }

    pub fn previous_epoch(&self) -> Epoch {
        self.current_epoch().saturating_sub(1)
    }

    pub fn get_randao_mix(&self, epoch: Epoch) -> Hash256 {
        self.randao_mixes[(epoch % consts::EPOCHS_PER_HISTORICAL_VECTOR) as usize]
    }

    pub fn set_randao_mix(&mut self, epoch: Epoch, mix: Hash256) {
        self.randao_mixes[(epoch % consts::EPOCHS_PER_HISTORICAL_VECTOR) as usize] = mix;
    }

    pub fn get_block_root_at_slot(&self, slot: Slot) -> Root {
        self.block_roots[(slot % consts::SLOTS_PER_HISTORICAL_ROOT) as usize]
    }

    pub fn get_block_root(&self, epoch: Epoch) -> Root {
        self.get_block_root_at_slot(epoch * consts::SLOTS_PER_EPOCH)
    }

    /// Active validator indices at `epoch`, registry order.
    pub fn get_active_validator_indices(&self, epoch: Epoch) -> Vec<u32> {
        self.validators
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_active_at(epoch))
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Sum of active effective balances, floored at one increment.
    pub fn get_total_active_balance(&self) -> Gwei {
        let epoch = self.current_epoch();
        let total: Gwei = self
            .validators
            .iter()
            .filter(|v| v.is_active_at(epoch))
            .map(|v| v.effective_balance)
            .sum();
        std::cmp::max(consts::EFFECTIVE_BALANCE_INCREMENT, total)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let fork = self.fork_seq;
        let mut writer = ContainerWriter::new();
        for field in state_fields(fork) {
            match field_kind(field) {
                FieldKind::Fixed(_) => writer.fixed(self.field_ssz_bytes(field)),
                FieldKind::Variable => writer.variable(self.field_ssz_bytes(field)),
            }
        }
        writer.finish()
    }

    fn field_ssz_bytes(&self, field: StateField) -> Vec<u8> {
        match field {
            StateField::GenesisTime => self.genesis_time.as_ssz_bytes(),
            StateField::GenesisValidatorsRoot => self.genesis_validators_root.as_ssz_bytes(),
            StateField::Slot => self.slot.as_ssz_bytes(),
            StateField::Fork => self.fork.as_ssz_bytes(),
            StateField::LatestBlockHeader => self.latest_block_header.as_ssz_bytes(),
            StateField::BlockRoots => self.block_roots.as_ssz_bytes(),
            StateField::StateRoots => self.state_roots.as_ssz_bytes(),
            StateField::HistoricalRoots => self.historical_roots.as_ssz_bytes(),
            StateField::Eth1Data => self.eth1_data.as_ssz_bytes(),
            StateField::Eth1DataVotes => self.eth1_data_votes.as_ssz_bytes(),
            StateField::Eth1DepositIndex => self.eth1_deposit_index.as_ssz_bytes(),
            StateField::Validators => self.validators.as_ssz_bytes(),
            StateField::Balances => self.balances.as_ssz_bytes(),
            StateField::RandaoMixes => self.randao_mixes.as_ssz_bytes(),
            StateField::Slashings => self.slashings.as_ssz_bytes(),
            StateField::PreviousEpochAttestations => {
                self.previous_epoch_attestations.as_ssz_bytes()
            }
            StateField::CurrentEpochAttestations => self.current_epoch_attestations.as_ssz_bytes(),
            StateField::PreviousEpochParticipation => {
                self.previous_epoch_participation.as_ssz_bytes()
            }
            StateField::CurrentEpochParticipation => {
                self.current_epoch_participation.as_ssz_bytes()
            }
            StateField::JustificationBits => self.justification_bits.as_ssz_bytes(),
            StateField::PreviousJustifiedCheckpoint => {
                self.previous_justified_checkpoint.as_ssz_bytes()
            }
            StateField::CurrentJustifiedCheckpoint => {
                self.current_justified_checkpoint.as_ssz_bytes()
            }
            StateField::FinalizedCheckpoint => self.finalized_checkpoint.as_ssz_bytes(),
            StateField::InactivityScores => self.inactivity_scores.as_ssz_bytes(),
            StateField::CurrentSyncCommittee => self.current_sync_committee.as_ssz_bytes(),
            StateField::NextSyncCommittee => self.next_sync_committee.as_ssz_bytes(),
            StateField::LatestExecutionPayloadHeader => {
                self.latest_execution_payload_header.serialize_at(self.fork_seq)
            }
            StateField::NextWithdrawalIndex => self.next_withdrawal_index.as_ssz_bytes(),
            StateField::NextWithdrawalValidatorIndex => {
                self.next_withdrawal_validator_index.as_ssz_bytes()
            }
            StateField::HistoricalSummaries => self.historical_summaries.as_ssz_bytes(),
            StateField::DepositRequestsStartIndex => {
                self.deposit_requests_start_index.as_ssz_bytes()
            }
            StateField::DepositBalanceToConsume => self.deposit_balance_to_consume.as_ssz_bytes(),
            StateField::ExitBalanceToConsume => self.exit_balance_to_consume.as_ssz_bytes(),
            StateField::EarliestExitEpoch => self.earliest_exit_epoch.as_ssz_bytes(),
            StateField::ConsolidationBalanceToConsume => {
                self.consolidation_balance_to_consume.as_ssz_bytes()
            }
            StateField::EarliestConsolidationEpoch => {
                self.earliest_consolidation_epoch.as_ssz_bytes()
            }
            StateField::PendingDeposits => self.pending_deposits.as_ssz_bytes(),
            StateField::PendingPartialWithdrawals => {
                self.pending_partial_withdrawals.as_ssz_bytes()
            }
            StateField::PendingConsolidations => self.pending_consolidations.as_ssz_bytes(),
            StateField::ProposerLookahead => self.proposer_lookahead.as_ssz_bytes(),
        }
    }

    pub fn deserialize(fork: ForkSeq, config: &BeaconConfig, bytes: &[u8]) -> Result<Self, SszError> {
        let mut state = BeaconState::empty(fork, config);
        for (field, range) in read_field_ranges(fork, bytes)? {
            state.set_field_from_ssz(field, &bytes[range])?;
        }
        state.fork_seq = fork;
        Ok(state)
    }

    pub(crate) fn set_field_from_ssz(
        &mut self,
        field: StateField,
        bytes: &[u8],
    ) -> Result<(), SszError> {
        match field {
            StateField::GenesisTime => self.genesis_time = u64::from_ssz_bytes(bytes)?,
            StateField::GenesisValidatorsRoot => {
                self.genesis_validators_root = Hash256::from_ssz_bytes(bytes)?
            }
            StateField::Slot => self.slot = Slot::from_ssz_bytes(bytes)?,
            StateField::Fork => self.fork = Fork::from_ssz_bytes(bytes)?,
            StateField::LatestBlockHeader => {
                self.latest_block_header = BeaconBlockHeader::from_ssz_bytes(bytes)?
            }
            StateField::BlockRoots => self.block_roots = BlockRoots::from_ssz_bytes(bytes)?,
            StateField::StateRoots => self.state_roots = StateRoots::from_ssz_bytes(bytes)?,
            StateField::HistoricalRoots => {
                self.historical_roots = HistoricalRoots::from_ssz_bytes(bytes)?
            }
            StateField::Eth1Data => self.eth1_data = Eth1Data::from_ssz_bytes(bytes)?,
            StateField::Eth1DataVotes => {
                self.eth1_data_votes = Eth1DataVotes::from_ssz_bytes(bytes)?
            }
            StateField::Eth1DepositIndex => self.eth1_deposit_index = u64::from_ssz_bytes(bytes)?,
            StateField::Validators => self.validators = Validators::from_ssz_bytes(bytes)?,
            StateField::Balances => self.balances = Balances::from_ssz_bytes(bytes)?,
            StateField::RandaoMixes => self.randao_mixes = RandaoMixes::from_ssz_bytes(bytes)?,
            StateField::Slashings => self.slashings = Slashings::from_ssz_bytes(bytes)?,
            StateField::PreviousEpochAttestations => {
                self.previous_epoch_attestations = EpochAttestations::from_ssz_bytes(bytes)?
            }
            StateField::CurrentEpochAttestations => {
                self.current_epoch_attestations = EpochAttestations::from_ssz_bytes(bytes)?
            }
            StateField::PreviousEpochParticipation => {
                self.previous_epoch_participation = Participation::from_ssz_bytes(bytes)?
            }
            StateField::CurrentEpochParticipation => {
                self.current_epoch_participation = Participation::from_ssz_bytes(bytes)?
            }
            StateField::JustificationBits => {
                self.justification_bits = JustificationBits::from_ssz_bytes(bytes)?
            }
            StateField::PreviousJustifiedCheckpoint => {
                self.previous_justified_checkpoint = Checkpoint::from_ssz_bytes(bytes)?
            }
            StateField::CurrentJustifiedCheckpoint => {
                self.current_justified_checkpoint = Checkpoint::from_ssz_bytes(bytes)?
            }
            StateField::FinalizedCheckpoint => {
                self.finalized_checkpoint = Checkpoint::from_ssz_bytes(bytes)?
            }
            StateField::InactivityScores => {
                self.inactivity_scores = InactivityScores::from_ssz_bytes(bytes)?
            }
            StateField::CurrentSyncCommittee => {
                self.current_sync_committee = SyncCommittee::from_ssz_bytes(bytes)?
            }
            StateField::NextSyncCommittee => {
                self.next_sync_committee = SyncCommittee::from_ssz_bytes(bytes)?
            }
            StateField::LatestExecutionPayloadHeader => {
                self.latest_execution_payload_header =
                    ExecutionPayloadHeader::deserialize_at(self.fork_seq, bytes)?
            }
            StateField::NextWithdrawalIndex => {
                self.next_withdrawal_index = u64::from_ssz_bytes(bytes)?
            }
            StateField::NextWithdrawalValidatorIndex => {
                self.next_withdrawal_validator_index = u64::from_ssz_bytes(bytes)?
            }
            StateField::HistoricalSummaries => {
                self.historical_summaries = HistoricalSummaries::from_ssz_bytes(bytes)?
            }
            StateField::DepositRequestsStartIndex => {
                self.deposit_requests_start_index = u64::from_ssz_bytes(bytes)?
            }
            StateField::DepositBalanceToConsume => {
                self.deposit_balance_to_consume = u64::from_ssz_bytes(bytes)?
            }
            StateField::ExitBalanceToConsume => {
                self.exit_balance_to_consume = u64::from_ssz_bytes(bytes)?
            }
            StateField::EarliestExitEpoch => self.earliest_exit_epoch = u64::from_ssz_bytes(bytes)?,
            StateField::ConsolidationBalanceToConsume => {
                self.consolidation_balance_to_consume = u64::from_ssz_bytes(bytes)?
            }
            StateField::EarliestConsolidationEpoch => {
                self.earliest_consolidation_epoch = u64::from_ssz_bytes(bytes)?
            }
            StateField::PendingDeposits => {
                self.pending_deposits = PendingDeposits::from_ssz_bytes(bytes)?
            }
            StateField::PendingPartialWithdrawals => {
                self.pending_partial_withdrawals = PendingPartialWithdrawals::from_ssz_bytes(bytes)?
            }
            StateField::PendingConsolidations => {
                self.pending_consolidations = PendingConsolidations::from_ssz_bytes(bytes)?
            }
            StateField::ProposerLookahead => {
                self.proposer_lookahead = ProposerLookahead::from_ssz_bytes(bytes)?
            }
        }
        Ok(())
    }

    /// Hash tree root of one field's subtree.
    pub fn field_root(&self, field: StateField) -> Hash256 {
        match field {
            StateField::LatestExecutionPayloadHeader => {
                self.latest_execution_payload_header.hash_tree_root_at(self.fork_seq)
            }
            StateField::GenesisTime => self.genesis_time.tree_hash_root(),
            StateField::GenesisValidatorsRoot => self.genesis_validators_root.tree_hash_root(),
            StateField::Slot => self.slot.tree_hash_root(),
            StateField::Fork => self.fork.tree_hash_root(),
            StateField::LatestBlockHeader => self.latest_block_header.tree_hash_root(),
            StateField::BlockRoots => self.block_roots.tree_hash_root(),
            StateField::StateRoots => self.state_roots.tree_hash_root(),
            StateField::HistoricalRoots => self.historical_roots.tree_hash_root(),
            StateField::Eth1Data => self.eth1_data.tree_hash_root(),
            StateField::Eth1DataVotes => self.eth1_data_votes.tree_hash_root(),
            StateField::Eth1DepositIndex => self.eth1_deposit_index.tree_hash_root(),
            StateField::Validators => self.validators.tree_hash_root(),
            StateField::Balances => self.balances.tree_hash_root(),
            StateField::RandaoMixes => self.randao_mixes.tree_hash_root(),
            StateField::Slashings => self.slashings.tree_hash_root(),
            StateField::PreviousEpochAttestations => {
                self.previous_epoch_attestations.tree_hash_root()
            }
            StateField::CurrentEpochAttestations => {
                self.current_epoch_attestations.tree_hash_root()
            }
            StateField::PreviousEpochParticipation => {
                self.previous_epoch_participation.tree_hash_root()
            }
            StateField::CurrentEpochParticipation => {
                self.current_epoch_participation.tree_hash_root()
            }
            StateField::JustificationBits => self.justification_bits.tree_hash_root(),
            StateField::PreviousJustifiedCheckpoint => {
                self.previous_justified_checkpoint.tree_hash_root()
            }
            StateField::CurrentJustifiedCheckpoint => {
                self.current_justified_checkpoint.tree_hash_root()
            }
            StateField::FinalizedCheckpoint => self.finalized_checkpoint.tree_hash_root(),
            StateField::InactivityScores => self.inactivity_scores.tree_hash_root(),
            StateField::CurrentSyncCommittee => self.current_sync_committee.tree_hash_root(),
            StateField::NextSyncCommittee => self.next_sync_committee.tree_hash_root(),
            StateField::NextWithdrawalIndex => self.next_withdrawal_index.tree_hash_root(),
            StateField::NextWithdrawalValidatorIndex => {
                self.next_withdrawal_validator_index.tree_hash_root()
            }
            StateField::HistoricalSummaries => self.historical_summaries.tree_hash_root(),
            StateField::DepositRequestsStartIndex => {
                self.deposit_requests_start_index.tree_hash_root()
            }
            StateField::DepositBalanceToConsume => self.deposit_balance_to_consume.tree_hash_root(),
            StateField::ExitBalanceToConsume => self.exit_balance_to_consume.tree_hash_root(),
            StateField::EarliestExitEpoch => self.earliest_exit_epoch.tree_hash_root(),
            StateField::ConsolidationBalanceToConsume => {
                self.consolidation_balance_to_consume.tree_hash_root()
            }
            StateField::EarliestConsolidationEpoch => {
                self.earliest_consolidation_epoch.tree_hash_root()
            }
            StateField::PendingDeposits => self.pending_deposits.tree_hash_root(),
            StateField::PendingPartialWithdrawals => {
                self.pending_partial_withdrawals.tree_hash_root()
            }
            StateField::PendingConsolidations => self.pending_consolidations.tree_hash_root(),
            StateField::ProposerLookahead => self.proposer_lookahead.tree_hash_root(),
        }
    }

    /// Full value-side hash tree root at the state's fork. The pool-backed
    /// tree computes the same root incrementally during transitions.
    pub fn hash_tree_root(&self) -> Hash256 {
        let roots: Vec<Hash256> =
            state_fields(self.fork_seq).into_iter().map(|f| self.field_root(f)).collect();
        codec::container_root(&roots)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn field_counts_per_fork() {
        assert_eq!(state_fields(ForkSeq::Phase0).len(), 21);
        assert_eq!(state_fields(ForkSeq::Altair).len(), 24);
        assert_eq!(state_fields(ForkSeq::Bellatrix).len(), 25);
        assert_eq!(state_fields(ForkSeq::Capella).len(), 28);
        assert_eq!(state_fields(ForkSeq::Deneb).len(), 28);
        assert_eq!(state_fields(ForkSeq::Electra).len(), 37);
        assert_eq!(state_fields(ForkSeq::Fulu).len(), 38);
    }

    #[test]
    fn stable_positions() {
        for fork in ForkSeq::ALL {
            let fields = state_fields(fork);
            assert_eq!(fields[11], StateField::Validators);
            if fork.gte(ForkSeq::Altair) {
                assert_eq!(fields[21], StateField::InactivityScores);
            }
        }
    }

    #[test]
    fn empty_state_round_trips_per_fork() {
        let config = BeaconConfig::minimal();
        for fork in ForkSeq::ALL {
            let state = BeaconState::empty(fork, &config);
            let bytes = state.serialize();
            let decoded = BeaconState::deserialize(fork, &config, &bytes).unwrap();
            assert_eq!(decoded.serialize(), bytes);
            assert_eq!(decoded.hash_tree_root(), state.hash_tree_root());
        }
    }

    #[test]
    fn forks_disagree_on_wire_and_root() {
        let config = BeaconConfig::minimal();
        let phase0 = BeaconState::empty(ForkSeq::Phase0, &config);
        let electra = BeaconState::empty(ForkSeq::Electra, &config);
        assert_ne!(phase0.serialize().len(), electra.serialize().len());
        assert_ne!(phase0.hash_tree_root(), electra.hash_tree_root());
    }

    #[test]
    fn field_ranges_locate_the_slot() {
        let config = BeaconConfig::minimal();
        let mut state = BeaconState::empty(ForkSeq::Electra, &config);
        state.slot = 0x0102030405060708;
        let bytes = state.serialize();
        let ranges = read_field_ranges(ForkSeq::Electra, &bytes).unwrap();
        let (field, range) = &ranges[2];
        assert_eq!(*field, StateField::Slot);
        assert_eq!(&bytes[range.clone()], &state.slot.to_le_bytes());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let config = BeaconConfig::minimal();
        let state = BeaconState::empty(ForkSeq::Fulu, &config);
        let mut bytes = state.serialize();
        bytes.push(0xFF);
        assert!(BeaconState::deserialize(ForkSeq::Fulu, &config, &bytes).is_err());
    }
}
