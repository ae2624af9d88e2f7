//! Parse SIEVE mail-filtering scripts (RFC 5228) into a position-annotated
//! syntax tree.
//!
//! ```
//! let tree = sieve_syntax::parse("if size :over 1M { discard; stop; }").unwrap();
//! assert_eq!(tree.commands().len(), 1);
//! ```

pub mod config;
pub mod sieve;
pub mod store;

pub use sieve::ast::{Command, Node, NodeType, Position, Tree};
pub use sieve::emitter::emit;
pub use sieve::error::{LexError, ParseError};
pub use sieve::lexer::{tokenize, Scanner, Token, TokenKind};
pub use sieve::parser::{parse, parse_with, ParseSettings, Parser};
