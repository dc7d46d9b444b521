pub mod lexer;
pub mod token;

pub use lexer::{Lexer, Position};
pub use token::Token;
