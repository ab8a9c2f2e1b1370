//! Scratch tallies computed once at each epoch boundary and consumed by the
//! epoch-processing stages.

use crate::consts;
use crate::containers::Epoch;
use crate::fork::ForkSeq;
use crate::state::BeaconState;

// Per-validator status bits for the boundary being processed.
pub const FLAG_ACTIVE_PREVIOUS: u8 = 1 << 0;
pub const FLAG_ACTIVE_CURRENT: u8 = 1 << 1;
pub const FLAG_UNSLASHED: u8 = 1 << 2;
pub const FLAG_ELIGIBLE: u8 = 1 << 3;

/// Aggregates gathered in one pass over the registry.
#[derive(Debug, Default)]
pub struct EpochTransitionCache {
    pub current_epoch: Epoch,
    /// Status bits per validator, FLAG_* above.
    pub validator_flags: Vec<u8>,
    /// Validators whose slashing penalty lands at this boundary.
    pub indices_to_slash: Vec<u32>,
    /// Effective balance per validator, in increments.
    pub effective_balance_increments: Vec<u16>,
    /// Total active stake of the current epoch, in increments.
    pub total_active_increments: u64,
    /// Stake with each timely flag, previous epoch, in increments
    /// (unslashed only), indexed by participation flag.
    pub previous_flag_increments: [u64; 3],
    /// Stake with the timely-target flag, current epoch, in increments.
    pub current_target_increments: u64,
    /// Validators eligible for activation, in eligibility order.
    pub activation_queue: Vec<u32>,
    /// Reward/penalty deltas accumulated by rewards processing, applied in
    /// one pass.
    pub balance_deltas: Vec<i64>,
}

impl EpochTransitionCache {
    /// One registry scan gathering everything the epoch stages need.
    pub fn new(state: &BeaconState) -> Self {
        let current_epoch = state.current_epoch();
        let previous_epoch = state.previous_epoch();
        let validator_count = state.validators.len();

        let mut cache = EpochTransitionCache {
            current_epoch,
            validator_flags: vec![0u8; validator_count],
            indices_to_slash: Vec::new(),
            effective_balance_increments: Vec::with_capacity(validator_count),
            total_active_increments: 0,
            previous_flag_increments: [0; 3],
            current_target_increments: 0,
            activation_queue: Vec::new(),
            balance_deltas: vec![0i64; validator_count],
        };

        let slash_epoch = current_epoch + consts::EPOCHS_PER_SLASHINGS_VECTOR / 2;
        let altair = state.fork_seq.gte(ForkSeq::Altair);

        for (index, validator) in state.validators.iter().enumerate() {
            let increments =
                (validator.effective_balance / consts::EFFECTIVE_BALANCE_INCREMENT) as u16;
            cache.effective_balance_increments.push(increments);

            let mut flags = 0u8;
            if validator.is_active_at(previous_epoch) {
                flags |= FLAG_ACTIVE_PREVIOUS;
            }
            if validator.is_active_at(current_epoch) {
                flags |= FLAG_ACTIVE_CURRENT;
                cache.total_active_increments += increments as u64;
            }
            if !validator.slashed {
                flags |= FLAG_UNSLASHED;
            }
            if flags & FLAG_ACTIVE_PREVIOUS != 0
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
            {
                flags |= FLAG_ELIGIBLE;
            }
            cache.validator_flags[index] = flags;

            if validator.slashed && slash_epoch == validator.withdrawable_epoch {
                cache.indices_to_slash.push(index as u32);
            }

            if altair {
                if flags & FLAG_ACTIVE_PREVIOUS != 0 && !validator.slashed {
                    let participation = state
                        .previous_epoch_participation
                        .get(index)
                        .copied()
                        .unwrap_or(0);
                    for flag_index in 0..3 {
                        if participation & (1 << flag_index) != 0 {
                            cache.previous_flag_increments[flag_index] += increments as u64;
                        }
                    }
                }
                if flags & FLAG_ACTIVE_CURRENT != 0 && !validator.slashed {
                    let participation = state
                        .current_epoch_participation
                        .get(index)
                        .copied()
                        .unwrap_or(0);
                    if participation & (1 << consts::TIMELY_TARGET_FLAG_INDEX) != 0 {
                        cache.current_target_increments += increments as u64;
                    }
                }
            }
        }

        cache.total_active_increments = cache.total_active_increments.max(1);
        cache
    }

    pub fn total_active_balance(&self) -> u64 {
        self.total_active_increments * consts::EFFECTIVE_BALANCE_INCREMENT
    }

    pub fn previous_target_balance(&self) -> u64 {
        self.previous_flag_increments[consts::TIMELY_TARGET_FLAG_INDEX]
            * consts::EFFECTIVE_BALANCE_INCREMENT
    }

    pub fn current_target_balance(&self) -> u64 {
        self.current_target_increments * consts::EFFECTIVE_BALANCE_INCREMENT
    }

    pub fn is_active_previous(&self, index: usize) -> bool {
        self.validator_flags
            .get(index)
            .map(|f| f & FLAG_ACTIVE_PREVIOUS != 0)
            .unwrap_or(false)
    }

    pub fn is_eligible(&self, index: usize) -> bool {
        self.validator_flags
            .get(index)
            .map(|f| f & FLAG_ELIGIBLE != 0)
            .unwrap_or(false)
    }

    pub fn reward(&mut self, index: usize, amount: u64) {
        if let Some(delta) = self.balance_deltas.get_mut(index) {
            *delta += amount as i64;
        }
    }

    pub fn penalize(&mut self, index: usize, amount: u64) {
        if let Some(delta) = self.balance_deltas.get_mut(index) {
            *delta -= amount as i64;
        }
    }

    /// Apply accumulated deltas, saturating at zero.
    pub fn apply_deltas(&self, state: &mut BeaconState) {
        for (index, delta) in self.balance_deltas.iter().enumerate() {
            if *delta == 0 {
                continue;
            }
            if let Some(balance) = state.balances.get_mut(index) {
                *balance = if *delta >= 0 {
                    balance.saturating_add(*delta as u64)
                } else {
                    balance.saturating_sub(delta.unsigned_abs())
                };
            }
        }
    }
}
