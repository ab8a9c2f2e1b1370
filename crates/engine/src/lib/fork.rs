//! Protocol fork sequence and schedule lookups.

use serde::{Deserialize, Serialize};

use crate::config::BeaconConfig;
use crate::containers::Epoch;

/// Forks in activation order. Ordering derives `gte`-style comparisons used
/// throughout block and epoch processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ForkSeq {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
    Fulu,
}

impl ForkSeq {
    pub const ALL: [ForkSeq; 7] = [
        ForkSeq::Phase0,
        ForkSeq::Altair,
        ForkSeq::Bellatrix,
        ForkSeq::Capella,
        ForkSeq::Deneb,
        ForkSeq::Electra,
        ForkSeq::Fulu,
    ];

    #[inline]
    pub fn gte(self, other: ForkSeq) -> bool {
        self >= other
    }

    pub fn name(self) -> &'static str {
        match self {
            ForkSeq::Phase0 => "phase0",
            ForkSeq::Altair => "altair",
            ForkSeq::Bellatrix => "bellatrix",
            ForkSeq::Capella => "capella",
            ForkSeq::Deneb => "deneb",
            ForkSeq::Electra => "electra",
            ForkSeq::Fulu => "fulu",
        }
    }

    /// The next fork in sequence, if any.
    pub fn next(self) -> Option<ForkSeq> {
        let position = ForkSeq::ALL.iter().position(|f| *f == self)?;
        ForkSeq::ALL.get(position + 1).copied()
    }

    /// Highest fork whose activation epoch is `<= epoch` under `config`.
    pub fn at_epoch(config: &BeaconConfig, epoch: Epoch) -> ForkSeq {
        let mut current = ForkSeq::Phase0;
        for fork in ForkSeq::ALL {
            if config.fork_epoch(fork) <= epoch {
                current = fork;
            }
        }
        current
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordering_matches_activation_sequence() {
        assert!(ForkSeq::Electra.gte(ForkSeq::Altair));
        assert!(ForkSeq::Altair.gte(ForkSeq::Altair));
        assert!(!ForkSeq::Phase0.gte(ForkSeq::Bellatrix));
        assert_eq!(ForkSeq::Deneb.next(), Some(ForkSeq::Electra));
        assert_eq!(ForkSeq::Fulu.next(), None);
    }

    #[test]
    fn at_epoch_follows_the_schedule() {
        let mut config = BeaconConfig::minimal();
        config.altair_fork_epoch = 2;
        config.bellatrix_fork_epoch = 4;
        config.capella_fork_epoch = 6;
        config.deneb_fork_epoch = 8;
        config.electra_fork_epoch = 10;
        config.fulu_fork_epoch = u64::MAX;

        assert_eq!(ForkSeq::at_epoch(&config, 0), ForkSeq::Phase0);
        assert_eq!(ForkSeq::at_epoch(&config, 3), ForkSeq::Altair);
        assert_eq!(ForkSeq::at_epoch(&config, 10), ForkSeq::Electra);
        assert_eq!(ForkSeq::at_epoch(&config, 1_000_000), ForkSeq::Electra);
    }
}
