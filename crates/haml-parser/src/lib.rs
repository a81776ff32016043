//! Haml Parser
//!
//! Builds the node tree from the logical lines produced by `haml-lexer`.
//! Indentation decides nesting; the leading marker of each line decides
//! the node kind. Tag headers, attribute hashes and object references are
//! parsed here too, so the compiler receives a fully structured tree.

pub mod ast;
pub mod header;
pub mod parser;

pub use ast::{Document, Node};
pub use parser::Parser;

use haml_lexer::LexerError;

/// Parser error with the 1-based source line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// Malformed lines: indentation, continuation, interpolation.
    #[error(transparent)]
    Lex(#[from] LexerError),

    /// Lines that scan fine but don't form a valid tree.
    #[error("Syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        ParseError::Syntax {
            message: message.into(),
            line,
        }
    }

    /// Source line the error was raised on.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex(err) => err.line,
            ParseError::Syntax { line, .. } => *line,
        }
    }
}
