//! Swap-or-not shuffling (protolambda's list form) and the per-epoch
//! committee index.

use std::ops::Range;
use std::sync::Arc;

use ethereum_hashing::hash_fixed;

use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::Epoch;
use crate::errors::CacheError;
use crate::helpers::bytes_to_u64;

const SEED_SIZE: usize = 32;
const ROUND_SIZE: usize = 1;
const POSITION_WINDOW_SIZE: usize = 4;
const PIVOT_VIEW_SIZE: usize = SEED_SIZE + ROUND_SIZE;
const TOTAL_SIZE: usize = SEED_SIZE + ROUND_SIZE + POSITION_WINDOW_SIZE;

/// Shuffle (or unshuffle) the whole list in place.
///
/// One shared 37-byte buffer `[seed | round | position_window]` feeds every
/// hash; the byte source is re-derived only when the 256-byte window
/// changes. `shuffle(shuffle(l, s, r, true), s, r, false) == l`.
pub fn inner_shuffle_list(
    input: &mut [u32],
    seed: &[u8],
    rounds: u64,
    forwards: bool,
) -> Result<(), CacheError> {
    if seed.len() != SEED_SIZE {
        return Err(CacheError::InvalidSeedLength(seed.len()));
    }
    if rounds > 255 {
        return Err(CacheError::InvalidRoundsSize(rounds));
    }
    if rounds == 0 || input.len() <= 1 {
        return Ok(());
    }
    let rounds = rounds as u8;
    let list_size = input.len() as u64;

    let mut buf = [0u8; TOTAL_SIZE];
    buf[..SEED_SIZE].copy_from_slice(seed);
    let mut round = if forwards { 0 } else { rounds - 1 };

    loop {
        buf[SEED_SIZE] = round;
        let pivot_hash = hash_fixed(&buf[..PIVOT_VIEW_SIZE]);
        let pivot = bytes_to_u64(&pivot_hash[..8]) % list_size;

        // First pass: mirror the range below the pivot around its midpoint.
        let mirror = (pivot + 1) >> 1;
        set_position_window(&mut buf, pivot >> 8);
        let mut source = hash_fixed(&buf);
        let mut byte_value = source[((pivot & 0xff) >> 3) as usize];
        let (mut i, mut j) = (0u64, pivot);
        while i < mirror {
            if j & 0xff == 0xff {
                set_position_window(&mut buf, j >> 8);
                source = hash_fixed(&buf);
            }
            if j & 0x07 == 0x07 {
                byte_value = source[((j & 0xff) >> 3) as usize];
            }
            if (byte_value >> (j & 0x07)) & 0x01 == 1 {
                input.swap(i as usize, j as usize);
            }
            i += 1;
            j -= 1;
        }

        // Second pass: mirror the range above the pivot around its midpoint.
        let mirror = (pivot + list_size + 1) >> 1;
        let end = list_size - 1;
        set_position_window(&mut buf, end >> 8);
        let mut source = hash_fixed(&buf);
        let mut byte_value = source[((end & 0xff) >> 3) as usize];
        let (mut i, mut j) = (pivot + 1, end);
        while i < mirror {
            if j & 0xff == 0xff {
                set_position_window(&mut buf, j >> 8);
                source = hash_fixed(&buf);
            }
            if j & 0x07 == 0x07 {
                byte_value = source[((j & 0xff) >> 3) as usize];
            }
            if (byte_value >> (j & 0x07)) & 0x01 == 1 {
                input.swap(i as usize, j as usize);
            }
            i += 1;
            j -= 1;
        }

        if forwards {
            round += 1;
            if round == rounds {
                break;
            }
        } else {
            if round == 0 {
                break;
            }
            round -= 1;
        }
    }
    Ok(())
}

fn set_position_window(buf: &mut [u8; TOTAL_SIZE], window: u64) {
    buf[PIVOT_VIEW_SIZE..].copy_from_slice(&(window as u32).to_le_bytes());
}

/// One epoch's shuffled active set plus slot×committee slices into it.
///
/// Committee slices alias the shuffled list; nothing is allocated per
/// committee. Shared behind `Arc` between the adjacent epoch caches.
#[derive(Debug)]
pub struct EpochShuffling {
    pub epoch: Epoch,
    /// Active validator indices in registry order.
    pub active_indices: Vec<u32>,
    /// The same indices, swap-or-not unshuffled.
    pub shuffled: Vec<u32>,
    /// `committee_ranges[slot][committee]` is a range into `shuffled`.
    pub committee_ranges: Vec<Vec<Range<usize>>>,
    pub committees_per_slot: u64,
}

impl EpochShuffling {
    pub fn committees_per_slot_for(active_count: u64) -> u64 {
        std::cmp::max(
            1,
            std::cmp::min(
                consts::MAX_COMMITTEES_PER_SLOT,
                active_count / consts::SLOTS_PER_EPOCH / consts::TARGET_COMMITTEE_SIZE,
            ),
        )
    }

    pub fn init(
        seed: &[u8; 32],
        epoch: Epoch,
        active_indices: Vec<u32>,
        _config: &BeaconConfig,
    ) -> Result<Arc<Self>, CacheError> {
        let mut shuffled = active_indices.clone();
        inner_shuffle_list(&mut shuffled, seed, consts::SHUFFLE_ROUND_COUNT as u64, false)?;

        let active_count = active_indices.len() as u64;
        let committees_per_slot = Self::committees_per_slot_for(active_count);
        let committees_total = consts::SLOTS_PER_EPOCH * committees_per_slot;

        let mut committee_ranges = Vec::with_capacity(consts::SLOTS_PER_EPOCH as usize);
        for slot_in_epoch in 0..consts::SLOTS_PER_EPOCH {
            let mut slot_ranges = Vec::with_capacity(committees_per_slot as usize);
            for committee in 0..committees_per_slot {
                let index = slot_in_epoch * committees_per_slot + committee;
                let start = (active_count * index / committees_total) as usize;
                let end = (active_count * (index + 1) / committees_total) as usize;
                slot_ranges.push(start..end);
            }
            committee_ranges.push(slot_ranges);
        }

        Ok(Arc::new(EpochShuffling {
            epoch,
            active_indices,
            shuffled,
            committee_ranges,
            committees_per_slot,
        }))
    }

    /// The committee's slice of the shuffled set.
    pub fn committee(&self, slot_in_epoch: u64, committee_index: u64) -> Option<&[u32]> {
        let range = self
            .committee_ranges
            .get(slot_in_epoch as usize)?
            .get(committee_index as usize)?;
        Some(&self.shuffled[range.clone()])
    }

    pub fn committee_count(&self) -> u64 {
        consts::SLOTS_PER_EPOCH * self.committees_per_slot
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shuffle_regression_vector() {
        let mut list: Vec<u32> = (0..9).collect();
        inner_shuffle_list(&mut list, &[0u8; 32], 32, false).unwrap();
        assert_eq!(list, vec![6, 2, 3, 5, 1, 7, 8, 0, 4]);
        inner_shuffle_list(&mut list, &[0u8; 32], 32, true).unwrap();
        assert_eq!(list, (0..9).collect::<Vec<u32>>());
    }

    #[test]
    fn shuffle_then_unshuffle_is_identity() {
        let seed = [7u8; 32];
        for rounds in [1u64, 10, 90, 255] {
            for len in [2usize, 33, 257, 1000] {
                let original: Vec<u32> = (0..len as u32).collect();
                let mut list = original.clone();
                inner_shuffle_list(&mut list, &seed, rounds, true).unwrap();
                inner_shuffle_list(&mut list, &seed, rounds, false).unwrap();
                assert_eq!(list, original, "rounds={rounds} len={len}");
            }
        }
    }

    #[test]
    fn zero_rounds_and_tiny_lists_are_identity() {
        let seed = [1u8; 32];
        let mut list = vec![5u32, 6, 7];
        inner_shuffle_list(&mut list, &seed, 0, true).unwrap();
        assert_eq!(list, vec![5, 6, 7]);

        let mut single = vec![9u32];
        inner_shuffle_list(&mut single, &seed, 90, true).unwrap();
        assert_eq!(single, vec![9]);

        let mut empty: Vec<u32> = vec![];
        inner_shuffle_list(&mut empty, &seed, 90, false).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut list = vec![1u32, 2];
        assert_eq!(
            inner_shuffle_list(&mut list, &[0u8; 31], 90, true),
            Err(CacheError::InvalidSeedLength(31))
        );
        assert_eq!(
            inner_shuffle_list(&mut list, &[0u8; 32], 256, true),
            Err(CacheError::InvalidRoundsSize(256))
        );
    }

    #[test]
    fn committee_slices_cover_the_active_set() {
        let config = BeaconConfig::minimal();
        let active: Vec<u32> = (0..1000).collect();
        let shuffling = EpochShuffling::init(&[3u8; 32], 5, active.clone(), &config).unwrap();

        let mut covered = 0usize;
        for slot_in_epoch in 0..consts::SLOTS_PER_EPOCH {
            for committee in 0..shuffling.committees_per_slot {
                covered += shuffling.committee(slot_in_epoch, committee).unwrap().len();
            }
        }
        assert_eq!(covered, active.len());

        let mut seen: Vec<u32> = shuffling.shuffled.clone();
        seen.sort_unstable();
        assert_eq!(seen, active);
    }

    #[test]
    fn committees_per_slot_formula() {
        assert_eq!(EpochShuffling::committees_per_slot_for(0), 1);
        assert_eq!(EpochShuffling::committees_per_slot_for(32 * 128), 1);
        assert_eq!(EpochShuffling::committees_per_slot_for(32 * 128 * 10), 10);
        assert_eq!(
            EpochShuffling::committees_per_slot_for(u32::MAX as u64),
            consts::MAX_COMMITTEES_PER_SLOT
        );
    }
}
