pub mod builder;
pub mod chain;
pub mod node;

pub use builder::{key_word, tx_hash, LogBuilder};
pub use chain::FakeChain;
pub use node::{entity, position, predict_position, TestNode, POSITION, WORLD};
