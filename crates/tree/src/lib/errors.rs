use crate::gindex::Gindex;
use crate::pool::NodeId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Node {0:?} is not allocated in this pool")]
    RefNotInitialized(NodeId),

    #[error("Node {0:?} is a leaf; expected a branch")]
    ExpectedBranch(NodeId),

    #[error("Node {0:?} is a branch; expected a leaf")]
    ExpectedLeaf(NodeId),

    #[error("No node found under gindex {0:?}")]
    ChildNotFound(Gindex),

    #[error("Index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: u64, length: u64 },

    #[error("Length {length} exceeds the type limit {limit}")]
    LengthOverLimit { length: u64, limit: u64 },

    #[error("Depth {0} exceeds the maximum tree depth")]
    DepthOverLimit(usize),

    #[error("Contents of {count} nodes do not fit at depth {depth}")]
    ContentsOverflowDepth { count: usize, depth: usize },

    #[error("Multiproof input invalid: {0}")]
    InvalidProofInput(&'static str),

    #[error("Proof does not reconstruct the expected root")]
    ProofMismatch,
}
