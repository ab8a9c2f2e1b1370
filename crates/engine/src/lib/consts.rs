//! Mainnet-preset constants and protocol domain tags.

pub type DomainType = [u8; 4];

pub const DOMAIN_BEACON_PROPOSER: DomainType = [0, 0, 0, 0];
pub const DOMAIN_BEACON_ATTESTER: DomainType = [1, 0, 0, 0];
pub const DOMAIN_RANDAO: DomainType = [2, 0, 0, 0];
pub const DOMAIN_DEPOSIT: DomainType = [3, 0, 0, 0];
pub const DOMAIN_VOLUNTARY_EXIT: DomainType = [4, 0, 0, 0];
pub const DOMAIN_SELECTION_PROOF: DomainType = [5, 0, 0, 0];
pub const DOMAIN_AGGREGATE_AND_PROOF: DomainType = [6, 0, 0, 0];
pub const DOMAIN_SYNC_COMMITTEE: DomainType = [7, 0, 0, 0];
pub const DOMAIN_SYNC_COMMITTEE_SELECTION_PROOF: DomainType = [8, 0, 0, 0];
pub const DOMAIN_CONTRIBUTION_AND_PROOF: DomainType = [9, 0, 0, 0];
pub const DOMAIN_BLS_TO_EXECUTION_CHANGE: DomainType = [10, 0, 0, 0];

// Time
pub const SLOTS_PER_EPOCH: u64 = 32;
pub const SECONDS_PER_SLOT: u64 = 12;
pub const MIN_ATTESTATION_INCLUSION_DELAY: u64 = 1;
pub const MIN_SEED_LOOKAHEAD: u64 = 1;
pub const MAX_SEED_LOOKAHEAD: u64 = 4;
pub const MIN_VALIDATOR_WITHDRAWABILITY_DELAY: u64 = 256;
pub const SHARD_COMMITTEE_PERIOD: u64 = 256;
pub const EPOCHS_PER_ETH1_VOTING_PERIOD: u64 = 64;
pub const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: u64 = 256;

// State list lengths
pub const SLOTS_PER_HISTORICAL_ROOT: u64 = 8192;
pub const EPOCHS_PER_HISTORICAL_VECTOR: u64 = 65536;
pub const EPOCHS_PER_SLASHINGS_VECTOR: u64 = 8192;
pub const VALIDATOR_REGISTRY_LIMIT: u64 = 1 << 40;

// Committees
pub const SHUFFLE_ROUND_COUNT: u8 = 90;
pub const TARGET_COMMITTEE_SIZE: u64 = 128;
pub const MAX_COMMITTEES_PER_SLOT: u64 = 64;
pub const MAX_VALIDATORS_PER_COMMITTEE: u64 = 2048;
pub const SYNC_COMMITTEE_SIZE: u64 = 512;

// Gwei values
pub const EFFECTIVE_BALANCE_INCREMENT: u64 = 1_000_000_000;
pub const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;
pub const MAX_EFFECTIVE_BALANCE_ELECTRA: u64 = 2_048_000_000_000;
pub const MIN_ACTIVATION_BALANCE: u64 = 32_000_000_000;
pub const EJECTION_BALANCE: u64 = 16_000_000_000;
pub const MIN_DEPOSIT_AMOUNT: u64 = 1_000_000_000;
pub const FULL_EXIT_REQUEST_AMOUNT: u64 = 0;

// Rewards and penalties
pub const BASE_REWARD_FACTOR: u64 = 64;
pub const PROPOSER_REWARD_QUOTIENT: u64 = 8;
pub const WHISTLEBLOWER_REWARD_QUOTIENT: u64 = 512;
pub const WHISTLEBLOWER_REWARD_QUOTIENT_ELECTRA: u64 = 4096;
pub const HYSTERESIS_QUOTIENT: u64 = 4;
pub const HYSTERESIS_DOWNWARD_MULTIPLIER: u64 = 1;
pub const HYSTERESIS_UPWARD_MULTIPLIER: u64 = 5;
pub const MIN_EPOCHS_TO_INACTIVITY_PENALTY: u64 = 4;
pub const INACTIVITY_SCORE_BIAS: u64 = 4;
pub const INACTIVITY_SCORE_RECOVERY_RATE: u64 = 16;

pub const INACTIVITY_PENALTY_QUOTIENT: u64 = 1 << 26;
pub const INACTIVITY_PENALTY_QUOTIENT_ALTAIR: u64 = 3 * (1 << 24);
pub const INACTIVITY_PENALTY_QUOTIENT_BELLATRIX: u64 = 1 << 24;

pub const MIN_SLASHING_PENALTY_QUOTIENT: u64 = 128;
pub const MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR: u64 = 64;
pub const MIN_SLASHING_PENALTY_QUOTIENT_BELLATRIX: u64 = 32;
pub const MIN_SLASHING_PENALTY_QUOTIENT_ELECTRA: u64 = 4096;

pub const PROPORTIONAL_SLASHING_MULTIPLIER: u64 = 1;
pub const PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR: u64 = 2;
pub const PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX: u64 = 3;

// Participation flags (Altair+)
pub const TIMELY_SOURCE_FLAG_INDEX: usize = 0;
pub const TIMELY_TARGET_FLAG_INDEX: usize = 1;
pub const TIMELY_HEAD_FLAG_INDEX: usize = 2;
pub const TIMELY_SOURCE_WEIGHT: u64 = 14;
pub const TIMELY_TARGET_WEIGHT: u64 = 26;
pub const TIMELY_HEAD_WEIGHT: u64 = 14;
pub const SYNC_REWARD_WEIGHT: u64 = 2;
pub const PROPOSER_WEIGHT: u64 = 8;
pub const WEIGHT_DENOMINATOR: u64 = 64;
pub const PARTICIPATION_FLAG_WEIGHTS: [u64; 3] =
    [TIMELY_SOURCE_WEIGHT, TIMELY_TARGET_WEIGHT, TIMELY_HEAD_WEIGHT];

// Max operations per block
pub const MAX_PROPOSER_SLASHINGS: u64 = 16;
pub const MAX_ATTESTER_SLASHINGS: u64 = 2;
pub const MAX_ATTESTER_SLASHINGS_ELECTRA: u64 = 1;
pub const MAX_ATTESTATIONS: u64 = 128;
pub const MAX_ATTESTATIONS_ELECTRA: u64 = 8;
pub const MAX_DEPOSITS: u64 = 16;
pub const MAX_VOLUNTARY_EXITS: u64 = 16;
pub const MAX_BLS_TO_EXECUTION_CHANGES: u64 = 16;

// Withdrawals (Capella+)
pub const MAX_WITHDRAWALS_PER_PAYLOAD: u64 = 16;
pub const MAX_VALIDATORS_PER_WITHDRAWALS_SWEEP: u64 = 16384;
pub const MAX_PENDING_PARTIALS_PER_WITHDRAWALS_SWEEP: u64 = 8;

// Churn
pub const MIN_PER_EPOCH_CHURN_LIMIT: u64 = 4;
pub const CHURN_LIMIT_QUOTIENT: u64 = 65536;
pub const MAX_PER_EPOCH_ACTIVATION_CHURN_LIMIT: u64 = 8;
pub const MIN_PER_EPOCH_CHURN_LIMIT_ELECTRA: u64 = 128_000_000_000;
pub const MAX_PER_EPOCH_ACTIVATION_EXIT_CHURN_LIMIT: u64 = 256_000_000_000;

// Deposits / requests (Electra+)
pub const MAX_PENDING_DEPOSITS_PER_EPOCH: u64 = 16;
pub const UNSET_DEPOSIT_REQUESTS_START_INDEX: u64 = u64::MAX;
pub const DEPOSIT_CONTRACT_TREE_DEPTH: usize = 32;

// Blobs
pub const MAX_BLOBS_PER_BLOCK: u64 = 6;
pub const MAX_BLOBS_PER_BLOCK_ELECTRA: u64 = 9;
pub const MAX_BLOBS_PER_BLOCK_FULU: u64 = 12;
pub const BYTES_PER_KZG_COMMITMENT: usize = 48;

// Withdrawal credential prefixes
pub const BLS_WITHDRAWAL_PREFIX: u8 = 0x00;
pub const ETH1_ADDRESS_WITHDRAWAL_PREFIX: u8 = 0x01;
pub const COMPOUNDING_WITHDRAWAL_PREFIX: u8 = 0x02;

pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;
pub const GENESIS_SLOT: u64 = 0;
pub const GENESIS_EPOCH: u64 = 0;
pub const MIN_GENESIS_ACTIVE_VALIDATOR_COUNT: u64 = 16384;
pub const ETH1_FOLLOW_DISTANCE: u64 = 2048;
pub const GENESIS_DELAY: u64 = 604800;
