pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::{char_key, normalize_key_id, Parser};
