//! Haml Lexer
//!
//! Splits `.haml` source into logical lines and scans text fragments for
//! `#{...}` interpolation. Handles indentation depth, multiline `|`
//! continuation, the leading-`\` escape, and marker classification.
//!
//! # Example
//!
//! ```
//! use haml_lexer::{Marker, Scanner};
//!
//! let lines: Vec<_> = Scanner::new("%p hello").collect::<Result<_, _>>().unwrap();
//! assert_eq!(lines.len(), 1);
//! assert_eq!(lines[0].marker().0, Marker::Element);
//! ```

pub mod interpolation;
pub mod line;
pub mod scanner;

pub use interpolation::{contains_interpolation, literal_text, scan_interpolation, Segment};
pub use line::{Line, Marker, RawLine};
pub use scanner::{Indentation, Scanner};

/// The ways scanning can fail. All of them abort the parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexErrorKind {
    #[error("indentation can't use both tabs and spaces")]
    MixedIndentation,

    #[error("inconsistent indentation: {found} is not a multiple of the {unit}-character indentation unit")]
    InconsistentIndentation { unit: usize, found: usize },

    #[error("multiline continuation starting here is never terminated")]
    UnterminatedMultiline,

    #[error("unterminated interpolation: `#{{` has no closing `}}`")]
    UnterminatedInterpolation,
}

/// Lexer error with the 1-based source line it was raised on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Lexer error at line {line}: {kind}")]
pub struct LexerError {
    pub kind: LexErrorKind,
    pub line: usize,
}

impl LexerError {
    pub fn new(kind: LexErrorKind, line: usize) -> Self {
        Self { kind, line }
    }
}
