//! Thin wrappers over blst's `min_pk` scheme (48-byte G1 public keys,
//! 96-byte G2 signatures) with the Ethereum ciphersuite.

use blst::min_pk;
use blst::BLST_ERROR;

use crate::errors::BlsError;

pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";
pub const PUBLIC_KEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;
pub const SECRET_KEY_BYTES_LEN: usize = 32;

/// Compressed G2 point at infinity: the required signature of an empty
/// sync-aggregate participation set.
pub const INFINITY_SIGNATURE: [u8; SIGNATURE_BYTES_LEN] = {
    let mut bytes = [0u8; SIGNATURE_BYTES_LEN];
    bytes[0] = 0xc0;
    bytes
};

#[derive(Clone)]
pub struct PublicKey(min_pk::PublicKey);

impl PublicKey {
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlsError> {
        if bytes.len() != PUBLIC_KEY_BYTES_LEN {
            return Err(BlsError::InvalidPubkeyLength {
                expected: PUBLIC_KEY_BYTES_LEN,
                actual: bytes.len(),
            });
        }
        min_pk::PublicKey::from_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| BlsError::DeserializationFailed)
    }

    /// Accepts the 96-byte uncompressed affine encoding used by the pubkey
    /// cache file.
    pub fn deserialize_uncompressed(bytes: &[u8]) -> Result<Self, BlsError> {
        if bytes.len() != 2 * PUBLIC_KEY_BYTES_LEN {
            return Err(BlsError::InvalidPubkeyLength {
                expected: 2 * PUBLIC_KEY_BYTES_LEN,
                actual: bytes.len(),
            });
        }
        min_pk::PublicKey::from_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| BlsError::DeserializationFailed)
    }

    /// Subgroup (and optionally infinity) check.
    pub fn validate(&self, check_infinity: bool) -> Result<(), BlsError> {
        match self.0.validate() {
            Ok(()) => Ok(()),
            Err(BLST_ERROR::BLST_PK_IS_INFINITY) if !check_infinity => Ok(()),
            Err(_) => Err(BlsError::InvalidPublicKey),
        }
    }

    pub fn compress(&self) -> [u8; PUBLIC_KEY_BYTES_LEN] {
        self.0.compress()
    }

    pub fn serialize(&self) -> [u8; 2 * PUBLIC_KEY_BYTES_LEN] {
        self.0.serialize()
    }

    pub(crate) fn inner(&self) -> &min_pk::PublicKey {
        &self.0
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.compress() == other.compress()
    }
}

impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey(0x{})", hex::encode(self.compress()))
    }
}

#[derive(Clone)]
pub struct Signature(min_pk::Signature);

impl Signature {
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlsError> {
        if bytes.len() != SIGNATURE_BYTES_LEN {
            return Err(BlsError::InvalidSignatureLength {
                expected: SIGNATURE_BYTES_LEN,
                actual: bytes.len(),
            });
        }
        min_pk::Signature::from_bytes(bytes)
            .map(Signature)
            .map_err(|_| BlsError::InvalidSignature)
    }

    pub fn compress(&self) -> [u8; SIGNATURE_BYTES_LEN] {
        self.0.compress()
    }

    pub fn is_infinity(&self) -> bool {
        self.compress() == INFINITY_SIGNATURE
    }

    /// Single verification.
    pub fn verify(&self, pubkey: &PublicKey, message: &[u8]) -> bool {
        self.0.verify(true, message, DST, &[], pubkey.inner(), true) == BLST_ERROR::BLST_SUCCESS
    }

    /// One message, many signers; the signature is the aggregate over the
    /// same message.
    pub fn fast_aggregate_verify(&self, pubkeys: &[&PublicKey], message: &[u8]) -> bool {
        if pubkeys.is_empty() {
            return false;
        }
        let raw: Vec<&min_pk::PublicKey> = pubkeys.iter().map(|pk| pk.inner()).collect();
        self.0.fast_aggregate_verify(true, message, DST, &raw) == BLST_ERROR::BLST_SUCCESS
    }

    pub(crate) fn inner(&self) -> &min_pk::Signature {
        &self.0
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.compress() == other.compress()
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.compress()))
    }
}

pub struct SecretKey(min_pk::SecretKey);

impl SecretKey {
    /// HKDF key generation; `ikm` must carry at least 32 bytes of entropy.
    pub fn key_gen(ikm: &[u8]) -> Result<Self, BlsError> {
        min_pk::SecretKey::key_gen(ikm, &[])
            .map(SecretKey)
            .map_err(|_| BlsError::KeyGenFailed)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlsError> {
        if bytes.len() != SECRET_KEY_BYTES_LEN {
            return Err(BlsError::InvalidSecretKeyLength {
                expected: SECRET_KEY_BYTES_LEN,
                actual: bytes.len(),
            });
        }
        min_pk::SecretKey::from_bytes(bytes)
            .map(SecretKey)
            .map_err(|_| BlsError::DeserializationFailed)
    }

    pub fn serialize(&self) -> [u8; SECRET_KEY_BYTES_LEN] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message, DST, &[]))
    }
}

pub struct AggregatePublicKey(min_pk::AggregatePublicKey);

impl AggregatePublicKey {
    pub fn aggregate(pubkeys: &[&PublicKey]) -> Result<Self, BlsError> {
        if pubkeys.is_empty() {
            return Err(BlsError::EmptyPublicKeyArray);
        }
        let raw: Vec<&min_pk::PublicKey> = pubkeys.iter().map(|pk| pk.inner()).collect();
        min_pk::AggregatePublicKey::aggregate(&raw, false)
            .map(AggregatePublicKey)
            .map_err(|_| BlsError::AggregationFailed)
    }

    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }
}

pub struct AggregateSignature(min_pk::AggregateSignature);

impl AggregateSignature {
    pub fn aggregate(signatures: &[&Signature]) -> Result<Self, BlsError> {
        if signatures.is_empty() {
            return Err(BlsError::EmptySignatureArray);
        }
        let raw: Vec<&min_pk::Signature> = signatures.iter().map(|s| s.inner()).collect();
        min_pk::AggregateSignature::aggregate(&raw, false)
            .map(AggregateSignature)
            .map_err(|_| BlsError::AggregationFailed)
    }

    pub fn to_signature(&self) -> Signature {
        Signature(self.0.to_signature())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn keypair(tag: u8) -> (SecretKey, PublicKey) {
        let mut ikm = [0u8; 32];
        ikm[0] = tag;
        let sk = SecretKey::key_gen(&ikm).unwrap();
        let pk = sk.public_key();
        (sk, pk)
    }

    #[test]
    fn sign_verify_round_trip() {
        let (sk, pk) = keypair(1);
        let message = [42u8; 32];
        let signature = sk.sign(&message);
        assert!(signature.verify(&pk, &message));
        assert!(!signature.verify(&pk, &[43u8; 32]));

        let (_, other_pk) = keypair(2);
        assert!(!signature.verify(&other_pk, &message));
    }

    #[test]
    fn compress_round_trips() {
        let (_, pk) = keypair(7);
        let restored = PublicKey::deserialize(&pk.compress()).unwrap();
        assert_eq!(pk, restored);
        restored.validate(true).unwrap();
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        assert_eq!(
            PublicKey::deserialize(&[0u8; 47]),
            Err(BlsError::InvalidPubkeyLength { expected: 48, actual: 47 })
        );
        assert_eq!(
            Signature::deserialize(&[0u8; 95]),
            Err(BlsError::InvalidSignatureLength { expected: 96, actual: 95 })
        );
        assert_eq!(
            SecretKey::deserialize(&[1u8; 31]).err(),
            Some(BlsError::InvalidSecretKeyLength { expected: 32, actual: 31 })
        );
    }

    #[test]
    fn infinity_signature_is_detected() {
        let signature = Signature::deserialize(&INFINITY_SIGNATURE).unwrap();
        assert!(signature.is_infinity());
        let (sk, _) = keypair(3);
        assert!(!sk.sign(&[0u8; 32]).is_infinity());
    }

    #[test]
    fn fast_aggregate_verify_same_message() {
        let message = [9u8; 32];
        let pairs: Vec<(SecretKey, PublicKey)> = (1..=4).map(keypair).collect();
        let signatures: Vec<Signature> = pairs.iter().map(|(sk, _)| sk.sign(&message)).collect();
        let signature_refs: Vec<&Signature> = signatures.iter().collect();
        let aggregate = AggregateSignature::aggregate(&signature_refs).unwrap().to_signature();
        let pubkey_refs: Vec<&PublicKey> = pairs.iter().map(|(_, pk)| pk).collect();
        assert!(aggregate.fast_aggregate_verify(&pubkey_refs, &message));
        assert!(!aggregate.fast_aggregate_verify(&pubkey_refs[..3], &message));
    }
}
