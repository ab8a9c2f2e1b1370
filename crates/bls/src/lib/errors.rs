#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlsError {
    #[error("Public key must be {expected} bytes, got {actual}")]
    InvalidPubkeyLength { expected: usize, actual: usize },

    #[error("Message must be {expected} bytes, got {actual}")]
    InvalidMessageLength { expected: usize, actual: usize },

    #[error("Secret key must be {expected} bytes, got {actual}")]
    InvalidSecretKeyLength { expected: usize, actual: usize },

    #[error("Signature must be {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("Empty public key array")]
    EmptyPublicKeyArray,

    #[error("Empty signature array")]
    EmptySignatureArray,

    #[error("Empty indices array")]
    EmptyIndicesArray,

    #[error("Same-message batch of {actual} sets exceeds the limit of {limit}")]
    TooManySets { actual: usize, limit: usize },

    #[error("Aggregate-verify input arrays are inconsistent")]
    InvalidAggregateVerifyInput,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Key generation failed")]
    KeyGenFailed,

    #[error("Aggregation failed")]
    AggregationFailed,

    #[error("Pubkey deserialization failed")]
    DeserializationFailed,

    #[error("Validator index {0} is not present in the pubkey index")]
    UnknownValidatorIndex(u32),

    #[error("Pubkey index file is malformed: {0}")]
    InvalidPubkeyIndexFile(&'static str),

    #[error("Pubkey index I/O failure: {0}")]
    PubkeyIndexIo(String),
}

impl From<std::io::Error> for BlsError {
    fn from(e: std::io::Error) -> Self {
        BlsError::PubkeyIndexIo(e.to_string())
    }
}
