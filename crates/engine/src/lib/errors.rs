//! Error taxonomy for the transition engine.
//!
//! Input-validation and deserialization failures return before any engine
//! state is touched. Block-validation failures abort the block; the caller's
//! pre-state handle stays intact because mutation happens on a clone.

use beacon_bls::BlsError;
use beacon_tree::TreeError;

use crate::containers::{Epoch, Hash256, Slot};
use crate::fork::ForkSeq;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SszError {
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Unexpected {0} trailing bytes after the last field")]
    UnexpectedRemainder(usize),

    #[error("Offset {offset} out of bounds (buffer {length})")]
    OffsetOutOfBounds { offset: usize, length: usize },

    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Bad encoding: {0}")]
    BadEncoding(&'static str),

    #[error("List of {length} items exceeds the limit {limit}")]
    InvalidListSize { length: usize, limit: usize },
}

impl From<ssz::DecodeError> for SszError {
    fn from(e: ssz::DecodeError) -> Self {
        SszError::DeserializationFailed(format!("{e:?}"))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Pubkey index has not been initialized")]
    PubkeyIndexNotInitialized,

    #[error("No shuffling cached for epoch {0}")]
    EpochShufflingNotFound(Epoch),

    #[error("Seed must be 32 bytes, got {0}")]
    InvalidSeedLength(usize),

    #[error("Shuffle rounds must fit in u8, got {0}")]
    InvalidRoundsSize(u64),

    #[error("Effective balance of {balance} gwei does not fit the increments array")]
    InvalidEffectiveBalanceIncrementsType { balance: u64 },

    #[error("Validator index {index} out of range (registry size {count})")]
    InvalidIndicesType { index: u64, count: u64 },

    #[error(transparent)]
    Bls(#[from] BlsError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("Block slot {block_slot} does not match state slot {state_slot}")]
    BlockSlotMismatch { block_slot: Slot, state_slot: Slot },

    #[error("Block at slot {block_slot} is not newer than the latest header at slot {header_slot}")]
    BlockNotNewerThanLatestHeader { block_slot: Slot, header_slot: Slot },

    #[error("Block proposer {block_proposer} does not match the expected proposer {expected}")]
    BlockProposerIndexMismatch { block_proposer: u64, expected: u64 },

    #[error("Block parent root {block_parent:?} does not match the latest header root {expected:?}")]
    BlockParentRootMismatch { block_parent: Hash256, expected: Hash256 },

    #[error("Block proposer {0} is slashed")]
    BlockProposerSlashed(u64),

    #[error("Block carries {actual} deposits, expected {expected}")]
    InvalidDepositCount { expected: u64, actual: u64 },

    #[error("Invalid randao reveal signature")]
    InvalidRandaoSignature,

    #[error("Sync committee signature over an empty participation set must be the infinity point")]
    EmptySyncCommitteeSignatureIsNotInfinity,

    #[error("Sync committee signature is invalid")]
    SyncCommitteeSignatureInvalid,

    #[error("Operation invalid: {0}")]
    InvalidOperation(String),

    #[error("Batch signature verification rejected the block")]
    SignatureBatchInvalid,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Payload parent hash {actual:?} does not match the latest header {expected:?}")]
    InvalidExecutionPayloadParentHash { expected: Hash256, actual: Hash256 },

    #[error("Payload prev_randao {actual:?} does not match the current mix {expected:?}")]
    InvalidExecutionPayloadRandom { expected: Hash256, actual: Hash256 },

    #[error("Payload timestamp {actual} does not match the slot time {expected}")]
    InvalidExecutionPayloadTimestamp { expected: u64, actual: u64 },

    #[error("{actual} blob commitments exceed the limit {limit}")]
    BlobKzgCommitmentsExceedsLimit { limit: u64, actual: u64 },

    #[error("Execution payload rejected before the merge")]
    ExecutionPayloadStatusPreMerge,

    #[error("Invalid execution payload: {0}")]
    InvalidExecutionPayload(&'static str),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("State is not at fork {expected:?} (found {actual:?})")]
    StateIsNotFork { expected: ForkSeq, actual: ForkSeq },

    #[error("Unexpected fork sequence {0:?}")]
    UnexpectedForkSeq(ForkSeq),

    #[error("Target slot {target} is behind the state slot {state_slot}")]
    SlotBehindState { target: Slot, state_slot: Slot },

    #[error("Post-state root {computed:?} does not match the block state root {expected:?}")]
    PostStateMismatch { expected: Hash256, computed: Hash256 },

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Ssz(#[from] SszError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Bls(#[from] BlsError),
}
