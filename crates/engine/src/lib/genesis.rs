//! Genesis state construction from eth1 deposits.

use tree_hash::TreeHash;

use crate::config::BeaconConfig;
use crate::consts;
use crate::containers::{BeaconBlockHeader, DepositData, Eth1Data, Hash256};
use crate::errors::TransitionError;
use crate::fork::ForkSeq;
use crate::state::BeaconState;
use crate::transition::block::add_validator_to_registry;
use crate::transition::epoch::is_valid_deposit_signature;

/// Build the genesis state by replaying deposits and activating every
/// validator that reached the full activation balance.
pub fn initialize_beacon_state_from_eth1(
    config: &BeaconConfig,
    eth1_block_hash: Hash256,
    eth1_timestamp: u64,
    deposits: &[DepositData],
) -> Result<BeaconState, TransitionError> {
    let mut state = BeaconState::empty(ForkSeq::Phase0, config);
    state.genesis_time = eth1_timestamp + config.genesis_delay;
    state.eth1_data = Eth1Data {
        deposit_root: Hash256::ZERO,
        deposit_count: deposits.len() as u64,
        block_hash: eth1_block_hash,
    };
    state.latest_block_header = BeaconBlockHeader {
        body_root: crate::block::BeaconBlockBody::empty().hash_tree_root_at(ForkSeq::Phase0),
        ..Default::default()
    };
    state.randao_mixes = crate::state::RandaoMixes::from(vec![
        eth1_block_hash;
        consts::EPOCHS_PER_HISTORICAL_VECTOR
            as usize
    ]);

    for deposit in deposits {
        state.eth1_deposit_index += 1;
        match state.validators.iter().position(|v| v.pubkey == deposit.pubkey) {
            Some(index) => crate::helpers::increase_balance(&mut state, index, deposit.amount),
            None => {
                if is_valid_deposit_signature(
                    config,
                    &deposit.pubkey,
                    deposit.withdrawal_credentials,
                    deposit.amount,
                    &deposit.signature,
                ) {
                    add_validator_to_registry(
                        &mut state,
                        deposit.pubkey.clone(),
                        deposit.withdrawal_credentials,
                        deposit.amount,
                    );
                }
            }
        }
    }

    // Genesis activations: everyone at the full activation balance.
    for validator in state.validators.iter_mut() {
        if validator.effective_balance == consts::MAX_EFFECTIVE_BALANCE {
            validator.activation_eligibility_epoch = consts::GENESIS_EPOCH;
            validator.activation_epoch = consts::GENESIS_EPOCH;
        }
    }

    state.genesis_validators_root = state.validators.tree_hash_root();
    Ok(state)
}

pub fn is_valid_genesis_state(state: &BeaconState, config: &BeaconConfig) -> bool {
    if state.genesis_time < config.min_genesis_time {
        return false;
    }
    state.get_active_validator_indices(consts::GENESIS_EPOCH).len() as u64
        >= config.min_genesis_active_validator_count
}

#[cfg(test)]
mod test {
    use super::*;
    use beacon_bls::SecretKey;
    use crate::containers::BlsPublicKey;
    use crate::helpers::{compute_domain, compute_signing_root};

    fn signed_deposit(tag: u8, amount: u64, config: &BeaconConfig) -> DepositData {
        let mut ikm = [0u8; 32];
        ikm[0] = tag;
        let secret_key = SecretKey::key_gen(&ikm).unwrap();
        let pubkey = BlsPublicKey::from(secret_key.public_key().compress().to_vec());
        let withdrawal_credentials = Hash256::repeat_byte(tag);
        let message = crate::containers::DepositMessage {
            pubkey: pubkey.clone(),
            withdrawal_credentials,
            amount,
        };
        let domain = compute_domain(
            consts::DOMAIN_DEPOSIT,
            config.genesis_fork_version,
            Hash256::ZERO,
        );
        let signing_root = compute_signing_root(&message, domain);
        let signature = secret_key.sign(signing_root.as_slice());
        DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature: crate::containers::BlsSignature::from(signature.compress().to_vec()),
        }
    }

    #[test]
    fn deposits_build_the_registry() {
        let config = BeaconConfig::minimal();
        let deposits: Vec<DepositData> = (1..=3)
            .map(|tag| signed_deposit(tag, consts::MAX_EFFECTIVE_BALANCE, &config))
            .collect();
        let state = initialize_beacon_state_from_eth1(
            &config,
            Hash256::repeat_byte(0xE1),
            1_700_000_000,
            &deposits,
        )
        .unwrap();

        assert_eq!(state.validators.len(), 3);
        assert_eq!(state.eth1_deposit_index, 3);
        assert_eq!(state.get_active_validator_indices(0).len(), 3);
        assert_ne!(state.genesis_validators_root, Hash256::ZERO);
    }

    #[test]
    fn invalid_deposit_signature_is_skipped() {
        let config = BeaconConfig::minimal();
        let mut bad = signed_deposit(1, consts::MAX_EFFECTIVE_BALANCE, &config);
        bad.signature = crate::containers::BlsSignature::from(vec![0xAB; 96]);
        let state = initialize_beacon_state_from_eth1(
            &config,
            Hash256::repeat_byte(0xE1),
            1_700_000_000,
            &[bad],
        )
        .unwrap();
        assert_eq!(state.validators.len(), 0);
        // The deposit is still consumed from the contract queue.
        assert_eq!(state.eth1_deposit_index, 1);
    }

    #[test]
    fn genesis_validity_needs_enough_validators() {
        let config = BeaconConfig::minimal();
        let deposits: Vec<DepositData> = (1..=3)
            .map(|tag| signed_deposit(tag, consts::MAX_EFFECTIVE_BALANCE, &config))
            .collect();
        let state = initialize_beacon_state_from_eth1(
            &config,
            Hash256::repeat_byte(0xE1),
            1_700_000_000,
            &deposits,
        )
        .unwrap();
        // minimal wants 64 active validators.
        assert!(!is_valid_genesis_state(&state, &config));
    }
}
