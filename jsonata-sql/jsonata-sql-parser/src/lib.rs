//! # jsonata-sql-parser
//!
//! Lexer and parser for the JSONata-subset expression language used by the
//! `jsonata-sql` compiler.
//!
//! The parser deliberately accepts more than the compiler can translate:
//! wildcard, descendant and parent traversal, `~>` application, partial
//! application, lambdas and transforms all parse into their own AST variants,
//! so the downstream subset validator can report them by name instead of
//! failing with a syntax error.

#![forbid(unsafe_code)]

pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use parser::parse;
