// Protolens Lexer Module
// Plain-text token scanning, independent of the syntax tree

mod token;
mod tokenizer;

pub use token::{Comment, CommentStyle, Token};
pub use tokenizer::{unescape, Tokenizer, Tokens};
