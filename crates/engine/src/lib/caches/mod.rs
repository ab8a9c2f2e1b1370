pub mod epoch_cache;
pub mod epoch_transition;
pub mod shuffling;

pub use epoch_cache::{EpochCache, SyncCommitteeIndexed};
pub use epoch_transition::EpochTransitionCache;
pub use shuffling::{inner_shuffle_list, EpochShuffling};
