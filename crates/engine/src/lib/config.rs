//! Chain configuration: the fork schedule plus the network-variable knobs.
//! Preset-level constants live in [`crate::consts`].

use serde::{Deserialize, Serialize};

use crate::consts;
use crate::containers::{Epoch, Gwei, Version};
use crate::fork::ForkSeq;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconConfig {
    pub config_name: String,

    // Fork schedule
    pub genesis_fork_version: Version,
    pub altair_fork_version: Version,
    pub altair_fork_epoch: Epoch,
    pub bellatrix_fork_version: Version,
    pub bellatrix_fork_epoch: Epoch,
    pub capella_fork_version: Version,
    pub capella_fork_epoch: Epoch,
    pub deneb_fork_version: Version,
    pub deneb_fork_epoch: Epoch,
    pub electra_fork_version: Version,
    pub electra_fork_epoch: Epoch,
    pub fulu_fork_version: Version,
    pub fulu_fork_epoch: Epoch,

    // Time
    pub seconds_per_slot: u64,
    pub min_genesis_time: u64,
    pub genesis_delay: u64,

    // Validator cycle
    pub min_genesis_active_validator_count: u64,
    pub min_per_epoch_churn_limit: u64,
    pub churn_limit_quotient: u64,
    pub max_per_epoch_activation_churn_limit: u64,
    pub min_per_epoch_churn_limit_electra: Gwei,
    pub max_per_epoch_activation_exit_churn_limit: Gwei,
    pub ejection_balance: Gwei,

    // Deposit contract
    pub deposit_chain_id: u64,
    pub deposit_network_id: u64,
}

impl BeaconConfig {
    pub fn mainnet() -> Self {
        BeaconConfig {
            config_name: "mainnet".to_string(),
            genesis_fork_version: [0x00, 0x00, 0x00, 0x00],
            altair_fork_version: [0x01, 0x00, 0x00, 0x00],
            altair_fork_epoch: 74240,
            bellatrix_fork_version: [0x02, 0x00, 0x00, 0x00],
            bellatrix_fork_epoch: 144896,
            capella_fork_version: [0x03, 0x00, 0x00, 0x00],
            capella_fork_epoch: 194048,
            deneb_fork_version: [0x04, 0x00, 0x00, 0x00],
            deneb_fork_epoch: 269568,
            electra_fork_version: [0x05, 0x00, 0x00, 0x00],
            electra_fork_epoch: 364032,
            fulu_fork_version: [0x06, 0x00, 0x00, 0x00],
            fulu_fork_epoch: u64::MAX,
            seconds_per_slot: consts::SECONDS_PER_SLOT,
            min_genesis_time: 1606824000,
            genesis_delay: consts::GENESIS_DELAY,
            min_genesis_active_validator_count: consts::MIN_GENESIS_ACTIVE_VALIDATOR_COUNT,
            min_per_epoch_churn_limit: consts::MIN_PER_EPOCH_CHURN_LIMIT,
            churn_limit_quotient: consts::CHURN_LIMIT_QUOTIENT,
            max_per_epoch_activation_churn_limit: consts::MAX_PER_EPOCH_ACTIVATION_CHURN_LIMIT,
            min_per_epoch_churn_limit_electra: consts::MIN_PER_EPOCH_CHURN_LIMIT_ELECTRA,
            max_per_epoch_activation_exit_churn_limit:
                consts::MAX_PER_EPOCH_ACTIVATION_EXIT_CHURN_LIMIT,
            ejection_balance: consts::EJECTION_BALANCE,
            deposit_chain_id: 1,
            deposit_network_id: 1,
        }
    }

    /// Every fork live at genesis; the shape test setups want.
    pub fn minimal() -> Self {
        BeaconConfig {
            config_name: "minimal".to_string(),
            genesis_fork_version: [0x00, 0x00, 0x00, 0x01],
            altair_fork_version: [0x01, 0x00, 0x00, 0x01],
            altair_fork_epoch: 0,
            bellatrix_fork_version: [0x02, 0x00, 0x00, 0x01],
            bellatrix_fork_epoch: 0,
            capella_fork_version: [0x03, 0x00, 0x00, 0x01],
            capella_fork_epoch: 0,
            deneb_fork_version: [0x04, 0x00, 0x00, 0x01],
            deneb_fork_epoch: 0,
            electra_fork_version: [0x05, 0x00, 0x00, 0x01],
            electra_fork_epoch: 0,
            fulu_fork_epoch: 0,
            fulu_fork_version: [0x06, 0x00, 0x00, 0x01],
            seconds_per_slot: 6,
            min_genesis_time: 1578009600,
            genesis_delay: 300,
            min_genesis_active_validator_count: 64,
            min_per_epoch_churn_limit: 2,
            churn_limit_quotient: 32,
            max_per_epoch_activation_churn_limit: 4,
            min_per_epoch_churn_limit_electra: 64_000_000_000,
            max_per_epoch_activation_exit_churn_limit: 128_000_000_000,
            ejection_balance: consts::EJECTION_BALANCE,
            deposit_chain_id: 5,
            deposit_network_id: 5,
        }
    }

    pub fn fork_epoch(&self, fork: ForkSeq) -> Epoch {
        match fork {
            ForkSeq::Phase0 => 0,
            ForkSeq::Altair => self.altair_fork_epoch,
            ForkSeq::Bellatrix => self.bellatrix_fork_epoch,
            ForkSeq::Capella => self.capella_fork_epoch,
            ForkSeq::Deneb => self.deneb_fork_epoch,
            ForkSeq::Electra => self.electra_fork_epoch,
            ForkSeq::Fulu => self.fulu_fork_epoch,
        }
    }

    pub fn fork_version(&self, fork: ForkSeq) -> Version {
        match fork {
            ForkSeq::Phase0 => self.genesis_fork_version,
            ForkSeq::Altair => self.altair_fork_version,
            ForkSeq::Bellatrix => self.bellatrix_fork_version,
            ForkSeq::Capella => self.capella_fork_version,
            ForkSeq::Deneb => self.deneb_fork_version,
            ForkSeq::Electra => self.electra_fork_version,
            ForkSeq::Fulu => self.fulu_fork_version,
        }
    }

    /// Validator churn limit for the given active-validator count.
    pub fn churn_limit(&self, active_validator_count: u64) -> u64 {
        std::cmp::max(
            self.min_per_epoch_churn_limit,
            active_validator_count / self.churn_limit_quotient,
        )
    }

    /// Deneb activation churn: the validator churn, capped.
    pub fn activation_churn_limit(&self, active_validator_count: u64) -> u64 {
        std::cmp::min(
            self.max_per_epoch_activation_churn_limit,
            self.churn_limit(active_validator_count),
        )
    }

    /// Electra balance churn limit in gwei.
    pub fn balance_churn_limit(&self, total_active_balance: Gwei) -> Gwei {
        let churn = std::cmp::max(
            self.min_per_epoch_churn_limit_electra,
            total_active_balance / self.churn_limit_quotient,
        );
        churn - churn % consts::EFFECTIVE_BALANCE_INCREMENT
    }

    /// Electra activation-exit balance churn limit in gwei.
    pub fn activation_exit_churn_limit(&self, total_active_balance: Gwei) -> Gwei {
        std::cmp::min(
            self.max_per_epoch_activation_exit_churn_limit,
            self.balance_churn_limit(total_active_balance),
        )
    }

    /// Blob cap for the epoch's fork.
    pub fn max_blobs_per_block(&self, fork: ForkSeq) -> u64 {
        if fork.gte(ForkSeq::Fulu) {
            consts::MAX_BLOBS_PER_BLOCK_FULU
        } else if fork.gte(ForkSeq::Electra) {
            consts::MAX_BLOBS_PER_BLOCK_ELECTRA
        } else {
            consts::MAX_BLOBS_PER_BLOCK
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn churn_limits() {
        let config = BeaconConfig::mainnet();
        assert_eq!(config.churn_limit(100), consts::MIN_PER_EPOCH_CHURN_LIMIT);
        assert_eq!(config.churn_limit(65536 * 10), 10);
    }

    #[test]
    fn balance_churn_is_increment_aligned() {
        let config = BeaconConfig::mainnet();
        let churn = config.balance_churn_limit(123_456_789_000_000);
        assert_eq!(churn % consts::EFFECTIVE_BALANCE_INCREMENT, 0);
        assert!(churn >= consts::MIN_PER_EPOCH_CHURN_LIMIT_ELECTRA);
    }

    #[test]
    fn fork_schedule_lookup() {
        let config = BeaconConfig::mainnet();
        assert_eq!(config.fork_epoch(ForkSeq::Phase0), 0);
        assert_eq!(config.fork_epoch(ForkSeq::Capella), 194048);
        assert_eq!(config.fork_version(ForkSeq::Deneb), [4, 0, 0, 0]);
    }
}
