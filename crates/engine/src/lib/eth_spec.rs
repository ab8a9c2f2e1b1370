//! Mainnet-preset SSZ type-level limits.

pub use typenum::*;

pub type MaxValidatorsPerCommittee = U2048;
pub type MaxCommitteesPerSlot = U64;
/// Electra on-chain aggregates span every committee of a slot.
pub type MaxAggregationBits = U131072;
pub type SlotsPerEth1VotingPeriod = U2048; // 64 epochs * 32 slots per epoch
pub type SlotsPerHistoricalRoot = U8192;
pub type EpochsPerHistoricalVector = U65536;
pub type EpochsPerSlashingsVector = U8192;
pub type HistoricalRootsLimit = U16777216;
pub type ValidatorRegistryLimit = U1099511627776;
pub type SyncCommitteeSize = U512;
pub type BytesPerLogBloom = U256;
pub type MaxExtraDataBytes = U32;
pub type MaxBytesPerTransaction = U1073741824;
pub type MaxTransactionsPerPayload = U1048576;
pub type MaxWithdrawalsPerPayload = U16;

pub type SlotsPerEpoch = U32;

pub type JustificationBitsLength = U4;

pub type MaxProposerSlashings = U16;
pub type MaxAttesterSlashings = U2;
pub type MaxAttesterSlashingsElectra = U1;
pub type MaxAttestations = U128;
pub type MaxAttestationsElectra = U8;
pub type MaxDeposits = U16;
pub type MaxVoluntaryExits = U16;
pub type MaxBlsToExecutionChanges = U16;
pub type MaxBlobCommitmentsPerBlock = U4096;
/// Attestations retained per epoch in the Phase0 participation records.
pub type MaxPendingAttestations = U4096; // MaxAttestations * SlotsPerEpoch

pub type MaxDepositRequestsPerPayload = U8192;
pub type MaxWithdrawalRequestsPerPayload = U16;
pub type MaxConsolidationRequestsPerPayload = U2;

pub type PendingDepositsLimit = U134217728; // 2 ^ 27
pub type PendingPartialWithdrawalsLimit = U134217728; // 2 ^ 27
pub type PendingConsolidationsLimit = U262144; // 2 ^ 18

pub type MinSeedLookahead = U1;
/// (MIN_SEED_LOOKAHEAD + 1) * SLOTS_PER_EPOCH
pub type ProposerLookaheadSlots = U64;
