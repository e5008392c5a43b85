//! Token store — the single in-process token slot plus its optional
//! persistence side channel.

pub mod memory;
pub mod persist;
pub mod types;

pub use memory::TokenStore;
pub use persist::{FilePersistence, NoPersistence, TokenPersistence};
pub use types::{RecommendedAction, TokenPair, TokenStatus};
