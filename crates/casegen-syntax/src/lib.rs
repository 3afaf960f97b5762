//! Lexer, parser, and AST for the restricted C subset used to describe
//! test case constraints.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, parse_expression, ParseError, ParseResult, Parser};
pub use token::{Span, Token, TokenKind};

/// Name of the function whose body holds the constraint statements.
pub const CONSTRAINT_FUNCTION: &str = "_CONSTRAINT";

/// Sequence length accessor available inside constraints.
pub const LENGTH_PRIMITIVE: &str = "_LENGTH";

/// Gaussian tag: `GAUSSIAN(target, mean, stddev)`.
pub const GAUSSIAN_PRIMITIVE: &str = "GAUSSIAN";
