//! Bidirectional pubkey ↔ validator-index mapping with a deserialized
//! `PublicKey` cache.
//!
//! Concurrency contract: shared-read, single-writer. Block processing only
//! reads; the bootstrap path writes, batched at epoch boundaries. The owning
//! engine serializes writers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::errors::BlsError;
use crate::keys::{PublicKey, PUBLIC_KEY_BYTES_LEN};

const MAGIC: &[u8; 4] = b"PKIX";
const HEADER_LEN: usize = 12;
/// Map-region record: compressed key, little-endian index, occupancy flag.
const RECORD_LEN: usize = PUBLIC_KEY_BYTES_LEN + 4 + 1;
/// Stored pubkeys use the uncompressed affine encoding: deserializing them
/// on load skips the expensive decompression of 48-byte keys.
const STORED_PUBKEY_LEN: usize = 2 * PUBLIC_KEY_BYTES_LEN;

fn pubkey2index_written_size(capacity: usize) -> usize {
    capacity * RECORD_LEN
}

#[derive(Debug, Default)]
pub struct PubkeyIndex {
    pubkey2index: HashMap<[u8; PUBLIC_KEY_BYTES_LEN], u32>,
    index2pubkey: Vec<Option<PublicKey>>,
    initialized: bool,
}

impl PubkeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn size(&self) -> u32 {
        self.pubkey2index.len() as u32
    }

    /// Grow both directions so `n` indices fit without rehashing.
    pub fn ensure_capacity(&mut self, n: usize) {
        if self.pubkey2index.len() < n {
            self.pubkey2index.reserve(n - self.pubkey2index.len());
        }
        if self.index2pubkey.len() < n {
            self.index2pubkey.resize(n, None);
        }
    }

    /// Insert a validator's compressed pubkey at `index`, uncompressing it
    /// into the dense cache. Intermediate slots stay unset.
    pub fn set(&mut self, index: u32, pubkey_bytes: &[u8]) -> Result<(), BlsError> {
        if pubkey_bytes.len() != PUBLIC_KEY_BYTES_LEN {
            return Err(BlsError::InvalidPubkeyLength {
                expected: PUBLIC_KEY_BYTES_LEN,
                actual: pubkey_bytes.len(),
            });
        }
        let pubkey = PublicKey::deserialize(pubkey_bytes)?;
        let mut key = [0u8; PUBLIC_KEY_BYTES_LEN];
        key.copy_from_slice(pubkey_bytes);
        if self.index2pubkey.len() <= index as usize {
            self.index2pubkey.resize(index as usize + 1, None);
        }
        self.pubkey2index.insert(key, index);
        self.index2pubkey[index as usize] = Some(pubkey);
        self.initialized = true;
        Ok(())
    }

    pub fn get(&self, index: u32) -> Option<&PublicKey> {
        self.index2pubkey.get(index as usize)?.as_ref()
    }

    pub fn get_index(&self, pubkey_bytes: &[u8]) -> Result<Option<u32>, BlsError> {
        if pubkey_bytes.len() != PUBLIC_KEY_BYTES_LEN {
            return Err(BlsError::InvalidPubkeyLength {
                expected: PUBLIC_KEY_BYTES_LEN,
                actual: pubkey_bytes.len(),
            });
        }
        Ok(self.pubkey2index.get(pubkey_bytes).copied())
    }

    /// Persist to the `PKIX` binary format: magic, current length, capacity,
    /// the map metadata region, then the uncompressed pubkeys in increasing
    /// validator-index order.
    pub fn save(&self, path: &Path) -> Result<(), BlsError> {
        let length = self.pubkey2index.len();
        let capacity = self.index2pubkey.len().max(length);

        let mut entries: Vec<(&[u8; PUBLIC_KEY_BYTES_LEN], u32)> =
            self.pubkey2index.iter().map(|(k, v)| (k, *v)).collect();
        entries.sort_by_key(|(_, index)| *index);

        let mut out =
            Vec::with_capacity(HEADER_LEN + pubkey2index_written_size(capacity) + length * STORED_PUBKEY_LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(length as u32).to_le_bytes());
        out.extend_from_slice(&(capacity as u32).to_le_bytes());
        for (key, index) in &entries {
            out.extend_from_slice(&key[..]);
            out.extend_from_slice(&index.to_le_bytes());
            out.push(1);
        }
        out.resize(HEADER_LEN + pubkey2index_written_size(capacity), 0);
        for (_, index) in &entries {
            let pubkey = self
                .get(*index)
                .ok_or(BlsError::InvalidPubkeyIndexFile("index missing from dense cache"))?;
            out.extend_from_slice(&pubkey.serialize());
        }

        fs::write(path, &out)?;
        tracing::debug!(entries = length, capacity, path = %path.display(), "saved pubkey index");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, BlsError> {
        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(BlsError::InvalidPubkeyIndexFile("bad magic"));
        }
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let capacity = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        if length > capacity {
            return Err(BlsError::InvalidPubkeyIndexFile("length exceeds capacity"));
        }
        let map_region = pubkey2index_written_size(capacity);
        let expected_len = HEADER_LEN + map_region + length * STORED_PUBKEY_LEN;
        if bytes.len() != expected_len {
            return Err(BlsError::InvalidPubkeyIndexFile("file length mismatch"));
        }

        let mut index = PubkeyIndex::new();
        index.ensure_capacity(capacity);
        for record in 0..length {
            let record_offset = HEADER_LEN + record * RECORD_LEN;
            let record_bytes = &bytes[record_offset..record_offset + RECORD_LEN];
            if record_bytes[RECORD_LEN - 1] != 1 {
                return Err(BlsError::InvalidPubkeyIndexFile("unoccupied record in live region"));
            }
            let mut key = [0u8; PUBLIC_KEY_BYTES_LEN];
            key.copy_from_slice(&record_bytes[..PUBLIC_KEY_BYTES_LEN]);
            let validator_index = u32::from_le_bytes([
                record_bytes[PUBLIC_KEY_BYTES_LEN],
                record_bytes[PUBLIC_KEY_BYTES_LEN + 1],
                record_bytes[PUBLIC_KEY_BYTES_LEN + 2],
                record_bytes[PUBLIC_KEY_BYTES_LEN + 3],
            ]);
            if validator_index as usize >= capacity {
                return Err(BlsError::InvalidPubkeyIndexFile("record index exceeds capacity"));
            }

            let pubkey_offset = HEADER_LEN + map_region + record * STORED_PUBKEY_LEN;
            let pubkey = PublicKey::deserialize_uncompressed(
                &bytes[pubkey_offset..pubkey_offset + STORED_PUBKEY_LEN],
            )?;
            if pubkey.compress() != key {
                return Err(BlsError::InvalidPubkeyIndexFile("record key does not match pubkey"));
            }
            index.pubkey2index.insert(key, validator_index);
            index.index2pubkey[validator_index as usize] = Some(pubkey);
        }
        index.initialized = true;
        tracing::debug!(entries = length, capacity, path = %path.display(), "loaded pubkey index");
        Ok(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keys::SecretKey;

    fn pubkey_bytes(tag: u8) -> [u8; PUBLIC_KEY_BYTES_LEN] {
        let mut ikm = [0u8; 32];
        ikm[0] = tag;
        SecretKey::key_gen(&ikm).unwrap().public_key().compress()
    }

    #[test]
    fn set_then_lookup_both_directions() {
        let mut index = PubkeyIndex::new();
        let pk = pubkey_bytes(1);
        index.set(0, &pk).unwrap();

        assert!(index.get(0).is_some());
        assert_eq!(index.get_index(&pk).unwrap(), Some(0));
        assert_eq!(index.get_index(&pubkey_bytes(2)).unwrap(), None);
        assert_eq!(index.get(u32::MAX), None);
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn invalid_lengths_are_rejected() {
        let mut index = PubkeyIndex::new();
        assert_eq!(
            index.set(0, &[0u8; 47]),
            Err(BlsError::InvalidPubkeyLength { expected: 48, actual: 47 })
        );
        assert_eq!(
            index.get_index(&[0u8; 49]),
            Err(BlsError::InvalidPubkeyLength { expected: 48, actual: 49 })
        );
    }

    #[test]
    fn garbage_bytes_fail_deserialization() {
        let mut index = PubkeyIndex::new();
        assert_eq!(index.set(0, &[0xFF; 48]), Err(BlsError::DeserializationFailed));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pubkeys.pkix");

        let mut index = PubkeyIndex::new();
        let keys: Vec<[u8; 48]> = (1..=3).map(pubkey_bytes).collect();
        for (i, key) in keys.iter().enumerate() {
            index.set(i as u32, key).unwrap();
        }
        index.save(&path).unwrap();

        let loaded = PubkeyIndex::load(&path).unwrap();
        assert_eq!(loaded.size(), 3);
        assert!(loaded.is_initialized());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(loaded.get_index(key).unwrap(), Some(i as u32));
            assert_eq!(loaded.get(i as u32), index.get(i as u32));
        }
    }

    #[test]
    fn corrupt_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pubkeys.pkix");

        let mut index = PubkeyIndex::new();
        index.set(0, &pubkey_bytes(1)).unwrap();
        index.save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'X';
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            PubkeyIndex::load(&path),
            Err(BlsError::InvalidPubkeyIndexFile(_))
        ));

        bytes[0] = b'P';
        bytes.truncate(bytes.len() - 1);
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            PubkeyIndex::load(&path),
            Err(BlsError::InvalidPubkeyIndexFile(_))
        ));
    }
}
