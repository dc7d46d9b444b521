pub mod escape;
pub mod generator;
pub mod options;
pub mod xml;

pub use generator::{LdmlGenerator, LdmlOutput};
pub use options::{CompilerOptions, CompilerOptionsBuilder};
pub use xml::{read_keyboard, write_keyboard};
