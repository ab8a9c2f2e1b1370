//! Batched BLS signature verification.
//!
//! Each set draws a fresh 64-bit random scalar; the whole batch then reduces
//! to one Miller loop via blst's multiple-aggregate verification. Sets
//! sharing one message instead aggregate keys and signatures with per-set
//! scalars through blst's Pippenger multi-scalar multiplication and finish
//! with a single pairing.

use blst::min_pk;
use blst::{
    blst_p1, blst_p1_affine, blst_p1_compress, blst_p1_deserialize, blst_p1_from_affine, blst_p2,
    blst_p2_affine, blst_p2_compress, blst_p2_deserialize, blst_p2_from_affine, blst_scalar,
    p1_affines, p2_affines, BLST_ERROR,
};
use rand::RngCore;

use crate::errors::BlsError;
use crate::keys::{PublicKey, Signature, DST};
use crate::pubkey_index::PubkeyIndex;

/// Upper bound on one Pippenger multiplication; larger same-message batches
/// must be split by the caller.
pub const MAX_SAME_MESSAGE_SETS: usize = 128;

const MESSAGE_LEN: usize = 32;
const RAND_BITS: usize = 64;

/// A signature over `message` by the validator at `index`.
pub struct IndexedSet<'a> {
    pub index: u32,
    pub message: &'a [u8],
    pub signature: &'a [u8],
}

/// An aggregate signature over `message` by the validators in `indices`.
pub struct AggregateSet<'a> {
    pub indices: &'a [u32],
    pub message: &'a [u8],
    pub signature: &'a [u8],
}

/// A signature with the signer's compressed pubkey carried inline.
pub struct RawSet<'a> {
    pub pubkey: &'a [u8],
    pub message: &'a [u8],
    pub signature: &'a [u8],
}

#[derive(Default)]
pub struct BatchVerifier;

impl BatchVerifier {
    pub fn new() -> Self {
        BatchVerifier
    }

    /// One signature per set, pubkeys resolved through the index.
    pub fn verify_indexed(
        &self,
        pubkey_index: &PubkeyIndex,
        sets: &[IndexedSet<'_>],
    ) -> Result<bool, BlsError> {
        if sets.is_empty() {
            return Ok(false);
        }
        let mut pubkeys = Vec::with_capacity(sets.len());
        let mut messages = Vec::with_capacity(sets.len());
        let mut signatures = Vec::with_capacity(sets.len());
        for set in sets {
            pubkeys.push(
                pubkey_index
                    .get(set.index)
                    .ok_or(BlsError::UnknownValidatorIndex(set.index))?
                    .clone(),
            );
            messages.push(checked_message(set.message)?);
            signatures.push(Signature::deserialize(set.signature)?);
        }
        self.verify_resolved(&pubkeys, &messages, &signatures)
    }

    /// One aggregate signature per set; the set's pubkeys are aggregated
    /// before entering the batch.
    pub fn verify_aggregate(
        &self,
        pubkey_index: &PubkeyIndex,
        sets: &[AggregateSet<'_>],
    ) -> Result<bool, BlsError> {
        if sets.is_empty() {
            return Ok(false);
        }
        let mut pubkeys = Vec::with_capacity(sets.len());
        let mut messages = Vec::with_capacity(sets.len());
        let mut signatures = Vec::with_capacity(sets.len());
        for set in sets {
            if set.indices.is_empty() {
                return Err(BlsError::EmptyIndicesArray);
            }
            let members: Vec<&PublicKey> = set
                .indices
                .iter()
                .map(|index| {
                    pubkey_index
                        .get(*index)
                        .ok_or(BlsError::UnknownValidatorIndex(*index))
                })
                .collect::<Result<_, _>>()?;
            pubkeys.push(crate::keys::AggregatePublicKey::aggregate(&members)?.to_public_key());
            messages.push(checked_message(set.message)?);
            signatures.push(Signature::deserialize(set.signature)?);
        }
        self.verify_resolved(&pubkeys, &messages, &signatures)
    }

    /// One signature per set, pubkeys carried inline.
    pub fn verify_raw(&self, sets: &[RawSet<'_>]) -> Result<bool, BlsError> {
        if sets.is_empty() {
            return Ok(false);
        }
        let mut pubkeys = Vec::with_capacity(sets.len());
        let mut messages = Vec::with_capacity(sets.len());
        let mut signatures = Vec::with_capacity(sets.len());
        for set in sets {
            pubkeys.push(PublicKey::deserialize(set.pubkey)?);
            messages.push(checked_message(set.message)?);
            signatures.push(Signature::deserialize(set.signature)?);
        }
        self.verify_resolved(&pubkeys, &messages, &signatures)
    }

    /// The batch core: per-set 64-bit scalars, one Miller loop.
    pub fn verify_resolved(
        &self,
        pubkeys: &[PublicKey],
        messages: &[[u8; MESSAGE_LEN]],
        signatures: &[Signature],
    ) -> Result<bool, BlsError> {
        if pubkeys.is_empty() {
            return Ok(false);
        }
        if pubkeys.len() != messages.len() || pubkeys.len() != signatures.len() {
            return Err(BlsError::InvalidAggregateVerifyInput);
        }
        let rands = random_scalars(pubkeys.len());
        let pk_refs: Vec<&min_pk::PublicKey> = pubkeys.iter().map(|pk| pk.inner()).collect();
        let sig_refs: Vec<&min_pk::Signature> = signatures.iter().map(|s| s.inner()).collect();
        let msg_refs: Vec<&[u8]> = messages.iter().map(|m| m.as_slice()).collect();
        let err = min_pk::Signature::verify_multiple_aggregate_signatures(
            &msg_refs, DST, &pk_refs, true, &sig_refs, true, &rands, RAND_BITS,
        );
        Ok(err == BLST_ERROR::BLST_SUCCESS)
    }

    /// All sets sign the same message: aggregate pubkeys and signatures with
    /// per-set random scalars via Pippenger MSM, then verify once.
    pub fn verify_same_message(
        &self,
        pubkeys: &[PublicKey],
        signatures: &[Signature],
        message: &[u8],
    ) -> Result<bool, BlsError> {
        if pubkeys.is_empty() {
            return Ok(false);
        }
        if pubkeys.len() != signatures.len() {
            return Err(BlsError::InvalidAggregateVerifyInput);
        }
        if pubkeys.len() > MAX_SAME_MESSAGE_SETS {
            return Err(BlsError::TooManySets {
                actual: pubkeys.len(),
                limit: MAX_SAME_MESSAGE_SETS,
            });
        }
        let message = checked_message(message)?;
        for pubkey in pubkeys {
            pubkey.validate(true)?;
        }

        let mut scalar_bytes = Vec::with_capacity(pubkeys.len() * (RAND_BITS / 8));
        for scalar in random_scalars(pubkeys.len()) {
            scalar_bytes.extend_from_slice(&scalar.b[..RAND_BITS / 8]);
        }

        let pk_points: Vec<blst_p1> = pubkeys
            .iter()
            .map(|pk| p1_from_bytes(&pk.serialize()))
            .collect::<Result<_, _>>()?;
        let sig_points: Vec<blst_p2> = signatures
            .iter()
            .map(|sig| p2_from_signature(sig))
            .collect::<Result<_, _>>()?;

        let agg_pk_point = p1_affines::from(&pk_points).mult(&scalar_bytes, RAND_BITS);
        let agg_sig_point = p2_affines::from(&sig_points).mult(&scalar_bytes, RAND_BITS);

        let agg_pk = p1_to_public_key(&agg_pk_point)?;
        let agg_sig = p2_to_signature(&agg_sig_point)?;
        let err = agg_sig
            .inner()
            .verify(false, &message, DST, &[], agg_pk.inner(), false);
        Ok(err == BLST_ERROR::BLST_SUCCESS)
    }
}

fn checked_message(message: &[u8]) -> Result<[u8; MESSAGE_LEN], BlsError> {
    if message.len() != MESSAGE_LEN {
        return Err(BlsError::InvalidMessageLength {
            expected: MESSAGE_LEN,
            actual: message.len(),
        });
    }
    let mut out = [0u8; MESSAGE_LEN];
    out.copy_from_slice(message);
    Ok(out)
}

fn random_scalars(count: usize) -> Vec<blst_scalar> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let mut scalar = blst_scalar { b: [0u8; 32] };
            // 64 bits of randomness per set; zero would let a forged pair
            // cancel, so draw until non-zero.
            loop {
                rng.fill_bytes(&mut scalar.b[..RAND_BITS / 8]);
                if scalar.b[..RAND_BITS / 8].iter().any(|b| *b != 0) {
                    break;
                }
            }
            scalar
        })
        .collect()
}

fn p1_from_bytes(serialized: &[u8; 96]) -> Result<blst_p1, BlsError> {
    let mut affine = blst_p1_affine::default();
    let err = unsafe { blst_p1_deserialize(&mut affine, serialized.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return Err(BlsError::InvalidPublicKey);
    }
    let mut point = blst_p1::default();
    unsafe { blst_p1_from_affine(&mut point, &affine) };
    Ok(point)
}

fn p2_from_signature(signature: &Signature) -> Result<blst_p2, BlsError> {
    // Group check here; the final pairing runs without one.
    signature
        .inner()
        .validate(false)
        .map_err(|_| BlsError::InvalidSignature)?;
    let serialized = signature.inner().serialize();
    let mut affine = blst_p2_affine::default();
    let err = unsafe { blst_p2_deserialize(&mut affine, serialized.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return Err(BlsError::InvalidSignature);
    }
    let mut point = blst_p2::default();
    unsafe { blst_p2_from_affine(&mut point, &affine) };
    Ok(point)
}

fn p1_to_public_key(point: &blst_p1) -> Result<PublicKey, BlsError> {
    let mut compressed = [0u8; 48];
    unsafe { blst_p1_compress(compressed.as_mut_ptr(), point) };
    PublicKey::deserialize(&compressed)
}

fn p2_to_signature(point: &blst_p2) -> Result<Signature, BlsError> {
    let mut compressed = [0u8; 96];
    unsafe { blst_p2_compress(compressed.as_mut_ptr(), point) };
    Signature::deserialize(&compressed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keys::SecretKey;

    fn keypair(tag: u8) -> (SecretKey, PublicKey) {
        let mut ikm = [0u8; 32];
        ikm[0] = tag;
        let sk = SecretKey::key_gen(&ikm).unwrap();
        let pk = sk.public_key();
        (sk, pk)
    }

    fn indexed_fixture() -> (PubkeyIndex, Vec<SecretKey>, Vec<[u8; 32]>, Vec<[u8; 96]>) {
        let mut index = PubkeyIndex::new();
        let mut secret_keys = Vec::new();
        let mut messages = Vec::new();
        let mut signatures = Vec::new();
        for i in 0u8..4 {
            let (sk, pk) = keypair(i + 1);
            index.set(i as u32, &pk.compress()).unwrap();
            let mut message = [0u8; 32];
            message[0] = i + 10;
            signatures.push(sk.sign(&message).compress());
            messages.push(message);
            secret_keys.push(sk);
        }
        (index, secret_keys, messages, signatures)
    }

    #[test]
    fn indexed_batch_accepts_valid_sets() {
        let (index, _, messages, signatures) = indexed_fixture();
        let sets: Vec<IndexedSet> = (0..4)
            .map(|i| IndexedSet {
                index: i as u32,
                message: &messages[i],
                signature: &signatures[i],
            })
            .collect();
        assert!(BatchVerifier::new().verify_indexed(&index, &sets).unwrap());
    }

    #[test]
    fn indexed_batch_rejects_one_tampered_set() {
        let (index, _, messages, mut signatures) = indexed_fixture();
        // Replace set 0's signature with a different key's signature over a
        // different message.
        let (intruder, _) = keypair(99);
        signatures[0] = intruder.sign(&[0xAA; 32]).compress();
        let sets: Vec<IndexedSet> = (0..4)
            .map(|i| IndexedSet {
                index: i as u32,
                message: &messages[i],
                signature: &signatures[i],
            })
            .collect();
        assert!(!BatchVerifier::new().verify_indexed(&index, &sets).unwrap());
    }

    #[test]
    fn empty_batches_are_not_valid() {
        let verifier = BatchVerifier::new();
        let index = PubkeyIndex::new();
        assert!(!verifier.verify_indexed(&index, &[]).unwrap());
        assert!(!verifier.verify_raw(&[]).unwrap());
        assert!(!verifier.verify_same_message(&[], &[], &[0u8; 32]).unwrap());
    }

    #[test]
    fn aggregate_set_matches_signer_set_exactly() {
        let mut index = PubkeyIndex::new();
        let message = [5u8; 32];
        let mut signatures = Vec::new();
        for i in 0u8..3 {
            let (sk, pk) = keypair(i + 1);
            index.set(i as u32, &pk.compress()).unwrap();
            signatures.push(sk.sign(&message));
        }
        let signature_refs: Vec<&Signature> = signatures.iter().collect();
        let aggregate = crate::keys::AggregateSignature::aggregate(&signature_refs)
            .unwrap()
            .to_signature()
            .compress();

        let verifier = BatchVerifier::new();
        let full = AggregateSet { indices: &[0, 1, 2], message: &message, signature: &aggregate };
        assert!(verifier.verify_aggregate(&index, &[full]).unwrap());

        let missing_signer =
            AggregateSet { indices: &[0, 1], message: &message, signature: &aggregate };
        assert!(!verifier.verify_aggregate(&index, &[missing_signer]).unwrap());

        let empty = AggregateSet { indices: &[], message: &message, signature: &aggregate };
        assert_eq!(
            verifier.verify_aggregate(&index, &[empty]),
            Err(BlsError::EmptyIndicesArray)
        );
    }

    #[test]
    fn same_message_batch_round_trip() {
        let message = [77u8; 32];
        let mut pubkeys = Vec::new();
        let mut signatures = Vec::new();
        for i in 0u8..8 {
            let (sk, pk) = keypair(i + 1);
            signatures.push(sk.sign(&message));
            pubkeys.push(pk);
        }
        let verifier = BatchVerifier::new();
        assert!(verifier.verify_same_message(&pubkeys, &signatures, &message).unwrap());

        // One signer over the wrong message poisons the batch.
        let (sk, pk) = keypair(42);
        pubkeys.push(pk);
        signatures.push(sk.sign(&[0u8; 32]));
        assert!(!verifier.verify_same_message(&pubkeys, &signatures, &message).unwrap());
    }

    #[test]
    fn same_message_batch_is_bounded() {
        let (sk, pk) = keypair(1);
        let message = [1u8; 32];
        let signature = sk.sign(&message);
        let pubkeys = vec![pk; MAX_SAME_MESSAGE_SETS + 1];
        let signatures = vec![signature; MAX_SAME_MESSAGE_SETS + 1];
        assert_eq!(
            BatchVerifier::new().verify_same_message(&pubkeys, &signatures, &message),
            Err(BlsError::TooManySets { actual: 129, limit: 128 })
        );
    }

    #[test]
    fn unknown_index_is_an_error_not_a_false() {
        let (sk, _) = keypair(1);
        let message = [1u8; 32];
        let signature = sk.sign(&message).compress();
        let sets = [IndexedSet { index: 7, message: &message, signature: &signature }];
        assert_eq!(
            BatchVerifier::new().verify_indexed(&PubkeyIndex::new(), &sets),
            Err(BlsError::UnknownValidatorIndex(7))
        );
    }
}
