pub mod errors;
pub mod gindex;
pub mod hashing;
pub mod pool;
pub mod proof;
pub mod view;

pub use errors::TreeError;
pub use gindex::Gindex;
pub use pool::{NodeId, NodePool};
