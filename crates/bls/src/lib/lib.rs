pub mod batch;
pub mod errors;
pub mod keys;
pub mod pubkey_index;

pub use batch::{AggregateSet, BatchVerifier, IndexedSet, RawSet};
pub use errors::BlsError;
pub use keys::{
    AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature, DST,
    INFINITY_SIGNATURE, PUBLIC_KEY_BYTES_LEN, SECRET_KEY_BYTES_LEN, SIGNATURE_BYTES_LEN,
};
pub use pubkey_index::PubkeyIndex;
