//! Round-trip laws over the consensus containers.

use beacon_transition::config::BeaconConfig;
use beacon_transition::containers::{
    BlsPublicKey, BlsSignature, Checkpoint, Eth1Data, Hash256, Validator,
};
use beacon_transition::fork::ForkSeq;
use beacon_transition::state::BeaconState;
use proptest::prelude::*;
use ssz::{Decode, Encode};
use tree_hash::TreeHash;

fn arbitrary_validator() -> impl Strategy<Value = Validator> {
    (
        proptest::collection::vec(any::<u8>(), 48),
        any::<[u8; 32]>(),
        any::<u64>(),
        any::<bool>(),
        any::<u64>(),
        any::<u64>(),
        any::<u64>(),
        any::<u64>(),
    )
        .prop_map(
            |(pubkey, credentials, balance, slashed, eligibility, activation, exit, withdrawable)| {
                Validator {
                    pubkey: BlsPublicKey::from(pubkey),
                    withdrawal_credentials: Hash256::from(credentials),
                    effective_balance: balance,
                    slashed,
                    activation_eligibility_epoch: eligibility,
                    activation_epoch: activation,
                    exit_epoch: exit,
                    withdrawable_epoch: withdrawable,
                }
            },
        )
}

proptest! {
    // RT1: deserialize(serialize(v)) == v.
    #[test]
    fn validator_round_trips(validator in arbitrary_validator()) {
        let bytes = validator.as_ssz_bytes();
        prop_assert_eq!(Validator::from_ssz_bytes(&bytes).unwrap(), validator);
    }

    #[test]
    fn checkpoint_round_trips(epoch in any::<u64>(), root in any::<[u8; 32]>()) {
        let checkpoint = Checkpoint { epoch, root: Hash256::from(root) };
        let bytes = checkpoint.as_ssz_bytes();
        prop_assert_eq!(Checkpoint::from_ssz_bytes(&bytes).unwrap(), checkpoint);
    }

    // Distinct values hash apart; equal values hash together.
    #[test]
    fn eth1_data_hash_distinguishes(count_a in any::<u64>(), count_b in any::<u64>()) {
        let data = |count| Eth1Data {
            deposit_root: Hash256::repeat_byte(1),
            deposit_count: count,
            block_hash: Hash256::repeat_byte(2),
        };
        let equal = count_a == count_b;
        prop_assert_eq!(
            data(count_a).tree_hash_root() == data(count_b).tree_hash_root(),
            equal
        );
    }

    // RT1 for the fork-versioned state, with a populated registry.
    #[test]
    fn state_round_trips_per_fork(
        validators in proptest::collection::vec(arbitrary_validator(), 0..4),
        slot in any::<u64>(),
        fork_choice in 0usize..7,
    ) {
        let config = BeaconConfig::minimal();
        let fork = ForkSeq::ALL[fork_choice];
        let mut state = BeaconState::empty(fork, &config);
        state.slot = slot;
        for validator in validators {
            state.validators.push(validator).unwrap();
            state.balances.push(1).unwrap();
            if fork.gte(ForkSeq::Altair) {
                state.previous_epoch_participation.push(0).unwrap();
                state.current_epoch_participation.push(0).unwrap();
                state.inactivity_scores.push(0).unwrap();
            }
        }
        let bytes = state.serialize();
        let decoded = BeaconState::deserialize(fork, &config, &bytes).unwrap();
        prop_assert_eq!(decoded.serialize(), bytes);
        prop_assert_eq!(decoded.hash_tree_root(), state.hash_tree_root());
    }
}

#[test]
fn signature_container_sizes() {
    let signature = BlsSignature::from(vec![7u8; 96]);
    assert_eq!(signature.as_ssz_bytes().len(), 96);
    let pubkey = BlsPublicKey::from(vec![7u8; 48]);
    assert_eq!(pubkey.as_ssz_bytes().len(), 48);
}
