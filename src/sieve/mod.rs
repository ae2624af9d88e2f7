//! RFC 5228 scanner, tree builder and emitter.

pub mod ast;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod parser;
