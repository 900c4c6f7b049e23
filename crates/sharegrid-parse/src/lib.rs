pub mod parser;
pub mod tokenizer;

pub use parser::{ASTNode, ASTNodeType, CellReference, Literal, ParserError, parse};
pub use tokenizer::{Span, Token, TokenType, Tokenizer, TokenizerError};
