//! Field-table SSZ for fork-versioned containers.
//!
//! Forks only ever append trailing fields or swap what a stable position
//! holds, so a per-fork list of field kinds is enough to drive serialization,
//! deserialization, and the byte-range overlay hook used by the
//! deserialization override.

use std::ops::Range;

use tree_hash::TreeHash;

use crate::containers::Hash256;
use crate::errors::SszError;

pub const BYTES_PER_LENGTH_OFFSET: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Fixed(usize),
    Variable,
}

/// Byte range of every field: fixed-size fields read inline, variable-size
/// fields through their offset slot. This is the hook that lets a
/// deserializer overlay precomputed subtrees without re-parsing the blob.
pub fn read_field_ranges(kinds: &[FieldKind], bytes: &[u8]) -> Result<Vec<Range<usize>>, SszError> {
    let fixed_len: usize = kinds
        .iter()
        .map(|kind| match kind {
            FieldKind::Fixed(size) => *size,
            FieldKind::Variable => BYTES_PER_LENGTH_OFFSET,
        })
        .sum();
    if bytes.len() < fixed_len {
        return Err(SszError::InvalidLength { expected: fixed_len, actual: bytes.len() });
    }

    // First pass: fixed positions and the variable offsets.
    let mut cursor = 0usize;
    let mut ranges = Vec::with_capacity(kinds.len());
    let mut offsets: Vec<(usize, usize)> = Vec::new(); // (field position, offset)
    for (position, kind) in kinds.iter().enumerate() {
        match kind {
            FieldKind::Fixed(size) => {
                ranges.push(cursor..cursor + size);
                cursor += size;
            }
            FieldKind::Variable => {
                let offset = u32::from_le_bytes([
                    bytes[cursor],
                    bytes[cursor + 1],
                    bytes[cursor + 2],
                    bytes[cursor + 3],
                ]) as usize;
                if offset > bytes.len() {
                    return Err(SszError::OffsetOutOfBounds { offset, length: bytes.len() });
                }
                ranges.push(0..0); // patched below
                offsets.push((position, offset));
                cursor += BYTES_PER_LENGTH_OFFSET;
            }
        }
    }

    // Second pass: offsets delimit each other; the first must point at the
    // end of the fixed section and they must be non-decreasing.
    if let Some(&(_, first)) = offsets.first() {
        if first != fixed_len {
            return Err(SszError::OffsetOutOfBounds { offset: first, length: fixed_len });
        }
    } else if bytes.len() != fixed_len {
        return Err(SszError::UnexpectedRemainder(bytes.len() - fixed_len));
    }
    for window_start in 0..offsets.len() {
        let (position, start) = offsets[window_start];
        let end = offsets
            .get(window_start + 1)
            .map(|(_, next)| *next)
            .unwrap_or(bytes.len());
        if end < start {
            return Err(SszError::OffsetOutOfBounds { offset: end, length: start });
        }
        ranges[position] = start..end;
    }

    Ok(ranges)
}

/// Two-section container writer: fixed parts inline, variable parts appended
/// behind 4-byte offsets.
#[derive(Debug, Default)]
pub struct ContainerWriter {
    fields: Vec<(FieldKind, Vec<u8>)>,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(&mut self, bytes: Vec<u8>) {
        self.fields.push((FieldKind::Fixed(bytes.len()), bytes));
    }

    pub fn variable(&mut self, bytes: Vec<u8>) {
        self.fields.push((FieldKind::Variable, bytes));
    }

    pub fn finish(self) -> Vec<u8> {
        let fixed_len: usize = self
            .fields
            .iter()
            .map(|(kind, bytes)| match kind {
                FieldKind::Fixed(_) => bytes.len(),
                FieldKind::Variable => BYTES_PER_LENGTH_OFFSET,
            })
            .sum();
        let variable_len: usize = self
            .fields
            .iter()
            .filter(|(kind, _)| *kind == FieldKind::Variable)
            .map(|(_, bytes)| bytes.len())
            .sum();

        let mut out = Vec::with_capacity(fixed_len + variable_len);
        let mut variable = Vec::with_capacity(variable_len);
        for (kind, bytes) in &self.fields {
            match kind {
                FieldKind::Fixed(_) => out.extend_from_slice(bytes),
                FieldKind::Variable => {
                    let offset = fixed_len + variable.len();
                    out.extend_from_slice(&(offset as u32).to_le_bytes());
                    variable.extend_from_slice(bytes);
                }
            }
        }
        out.extend_from_slice(&variable);
        out
    }
}

/// Merkleize per-field roots at the depth implied by the field count.
pub fn container_root(field_roots: &[Hash256]) -> Hash256 {
    let leaves: Vec<[u8; 32]> = field_roots.iter().map(|root| root.0).collect();
    let depth = field_count_depth(field_roots.len());
    Hash256::from(beacon_tree::hashing::merkleize_leaves(&leaves, depth))
}

pub fn field_count_depth(field_count: usize) -> usize {
    if field_count <= 1 {
        0
    } else {
        (usize::BITS - (field_count - 1).leading_zeros()) as usize
    }
}

/// Root of a bit list against an explicit bit limit (the limit decides the
/// chunk-tree depth, and pre/post-Electra attestations disagree on it).
pub fn bitlist_root(bits: &[bool], limit_bits: u64) -> Hash256 {
    let mut chunks = vec![[0u8; 32]; bits.len().div_ceil(256)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            chunks[i / 256][(i % 256) / 8] |= 1 << (i % 8);
        }
    }
    let depth = field_count_depth(limit_bits.div_ceil(256) as usize);
    let data_root = beacon_tree::hashing::merkleize_leaves(&chunks, depth);
    Hash256::from(beacon_tree::hashing::mix_in_length(&data_root, bits.len()))
}

/// Root of a `uint64` list against an explicit element limit.
pub fn uint64_list_root(values: &[u64], limit: u64) -> Hash256 {
    let mut chunks = vec![[0u8; 32]; values.len().div_ceil(4)];
    for (i, value) in values.iter().enumerate() {
        chunks[i / 4][(i % 4) * 8..(i % 4) * 8 + 8].copy_from_slice(&value.to_le_bytes());
    }
    let depth = field_count_depth(limit.div_ceil(4) as usize);
    let data_root = beacon_tree::hashing::merkleize_leaves(&chunks, depth);
    Hash256::from(beacon_tree::hashing::mix_in_length(&data_root, values.len()))
}

/// Root of a list of composite elements against an explicit limit.
pub fn composite_list_root(element_roots: &[Hash256], limit: u64) -> Hash256 {
    let leaves: Vec<[u8; 32]> = element_roots.iter().map(|root| root.0).collect();
    let depth = field_count_depth(limit as usize);
    let data_root = beacon_tree::hashing::merkleize_leaves(&leaves, depth);
    Hash256::from(beacon_tree::hashing::mix_in_length(&data_root, element_roots.len()))
}

/// Encode a list of variable-size elements: one offset per element, bodies
/// appended behind.
pub fn encode_variable_elements(elements: &[Vec<u8>]) -> Vec<u8> {
    let offsets_len = elements.len() * BYTES_PER_LENGTH_OFFSET;
    let mut out = Vec::with_capacity(offsets_len + elements.iter().map(Vec::len).sum::<usize>());
    let mut cursor = offsets_len;
    for element in elements {
        out.extend_from_slice(&(cursor as u32).to_le_bytes());
        cursor += element.len();
    }
    for element in elements {
        out.extend_from_slice(element);
    }
    out
}

/// Split a serialized list of variable-size elements into per-element byte
/// ranges.
pub fn decode_variable_elements(bytes: &[u8]) -> Result<Vec<Range<usize>>, SszError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let first = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if first % BYTES_PER_LENGTH_OFFSET != 0 || first > bytes.len() {
        return Err(SszError::OffsetOutOfBounds { offset: first, length: bytes.len() });
    }
    let count = first / BYTES_PER_LENGTH_OFFSET;
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let at = i * BYTES_PER_LENGTH_OFFSET;
        let offset =
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize;
        if offset > bytes.len() {
            return Err(SszError::OffsetOutOfBounds { offset, length: bytes.len() });
        }
        offsets.push(offset);
    }
    let mut ranges = Vec::with_capacity(count);
    for i in 0..count {
        let start = offsets[i];
        let end = if i + 1 < count { offsets[i + 1] } else { bytes.len() };
        if end < start {
            return Err(SszError::OffsetOutOfBounds { offset: end, length: start });
        }
        ranges.push(start..end);
    }
    Ok(ranges)
}

/// Decode one field range with the type's own SSZ impl.
pub fn decode_field<T: ssz::Decode>(bytes: &[u8], range: &Range<usize>) -> Result<T, SszError> {
    T::from_ssz_bytes(&bytes[range.clone()]).map_err(SszError::from)
}

/// Roots of list elements, for composite_list_root call sites.
pub fn roots_of<T: TreeHash>(items: &[T]) -> Vec<Hash256> {
    items.iter().map(|item| item.tree_hash_root()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use ssz::Encode;
    use ssz_types::{typenum, VariableList};
    use tree_hash::TreeHash;

    #[test]
    fn fixed_only_container_round_trips() {
        let mut writer = ContainerWriter::new();
        writer.fixed(7u64.as_ssz_bytes());
        writer.fixed(vec![9u8; 32]);
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 40);

        let kinds = [FieldKind::Fixed(8), FieldKind::Fixed(32)];
        let ranges = read_field_ranges(&kinds, &bytes).unwrap();
        assert_eq!(ranges, vec![0..8, 8..40]);

        assert!(matches!(
            read_field_ranges(&kinds, &bytes[..39]),
            Err(SszError::InvalidLength { .. })
        ));
        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            read_field_ranges(&kinds, &padded),
            Err(SszError::UnexpectedRemainder(1))
        ));
    }

    #[test]
    fn variable_fields_get_monotonic_offsets() {
        let mut writer = ContainerWriter::new();
        writer.fixed(1u64.as_ssz_bytes());
        writer.variable(vec![0xAA; 3]);
        writer.variable(vec![0xBB; 5]);
        let bytes = writer.finish();

        let kinds = [FieldKind::Fixed(8), FieldKind::Variable, FieldKind::Variable];
        let ranges = read_field_ranges(&kinds, &bytes).unwrap();
        assert_eq!(ranges[0], 0..8);
        assert_eq!(ranges[1], 16..19);
        assert_eq!(ranges[2], 19..24);
        assert_eq!(&bytes[ranges[1].clone()], &[0xAA; 3]);
        assert_eq!(&bytes[ranges[2].clone()], &[0xBB; 5]);
    }

    #[test]
    fn bad_first_offset_is_rejected() {
        let mut writer = ContainerWriter::new();
        writer.variable(vec![1, 2, 3]);
        let mut bytes = writer.finish();
        bytes[0] = 5; // first offset must equal the fixed-section length (4)
        assert!(matches!(
            read_field_ranges(&[FieldKind::Variable], &bytes),
            Err(SszError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn list_root_helpers_match_ssz_types() {
        let values = vec![3u64, 5, 8, 13, 21];
        let list: VariableList<u64, typenum::U1024> = values.clone().into();
        assert_eq!(uint64_list_root(&values, 1024), list.tree_hash_root());

        let bits = vec![true, false, true, true];
        let mut bit_list = ssz_types::BitList::<typenum::U2048>::with_capacity(4).unwrap();
        for (i, bit) in bits.iter().enumerate() {
            bit_list.set(i, *bit).unwrap();
        }
        assert_eq!(bitlist_root(&bits, 2048), bit_list.tree_hash_root());
    }
}
