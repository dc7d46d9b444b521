pub mod generator;

pub use generator::{KmnGenerator, KmnOutput};
