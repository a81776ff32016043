//! Haml Code Generator
//!
//! Compiles the node tree into an ordered program of output operations.
//! The program is a pure function of the tree and the [`Options`]; all
//! expression evaluation is deferred to the renderer.
//!
//! ```text
//! source → Parser → Document → Compiler → Program { ops, options }
//! ```

pub mod attrs;
pub mod cache;
pub mod compiler;
pub mod doctype;
pub mod filters;
pub mod options;
pub mod value;

use std::fmt;

use haml_lexer::Segment;
use haml_parser::{ParseError, Parser};

pub use attrs::{AttributeBag, AttributePart, Attributes};
pub use cache::ProgramCache;
pub use compiler::Compiler;
pub use filters::{Filter, FilterError, FilterRegistry};
pub use options::{Format, Options};
pub use value::{Describable, Value};

/// How an emitted piece of text sits relative to the surrounding output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Directly after the previous output, no line break.
    Inline,
    /// On its own line at the current indentation.
    Line,
    /// On its own line, indenting what follows.
    Open,
    /// On its own line after ending the indentation of an `Open`.
    Close,
}

/// How a block-form `=` emits the value its block returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutput {
    pub escape: bool,
    pub preserve: bool,
}

/// A statement that owns the operations up to its matching `ExitBlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStatement {
    pub code: String,
    /// Starts with a mid-block keyword and continues the previous block.
    pub continues: bool,
    /// Present for `= expr` with a block.
    pub output: Option<BlockOutput>,
    pub line: usize,
}

/// One unit of the compiled program.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    EmitLiteral {
        text: String,
        flow: Flow,
    },
    EmitExpr {
        code: String,
        escape: bool,
        /// Newlines in the value become `&#x000A;`.
        preserve: bool,
        flow: Flow,
        line: usize,
    },
    OpenTag {
        name: String,
        attrs: Attributes,
        nuke_outer: bool,
        nuke_inner: bool,
        /// Content stays on the tag's line; no indented children follow.
        inline: bool,
        /// Content up to the matching close is whitespace-preserved.
        preserve: bool,
        line: usize,
    },
    CloseTag {
        name: String,
        nuke_outer: bool,
        nuke_inner: bool,
        inline: bool,
        preserve: bool,
    },
    SelfCloseTag {
        name: String,
        attrs: Attributes,
        nuke_outer: bool,
        nuke_inner: bool,
        line: usize,
    },
    EnterBlock(BlockStatement),
    ExitBlock,
    ApplyFilter {
        name: String,
        segments: Vec<Segment>,
        line: usize,
    },
    EmitDoctype {
        text: String,
    },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::EmitLiteral { text, flow } => write!(f, "EmitLiteral {text:?} ({flow:?})"),
            Op::EmitExpr {
                code,
                escape,
                preserve,
                flow,
                ..
            } => write!(
                f,
                "EmitExpr `{code}` escape={escape} preserve={preserve} ({flow:?})"
            ),
            Op::OpenTag {
                name,
                attrs,
                nuke_outer,
                nuke_inner,
                inline,
                ..
            } => write!(
                f,
                "OpenTag {name}{} parts={} nuke_outer={nuke_outer} nuke_inner={nuke_inner} inline={inline}",
                attrs.base.render(&Options::default()),
                attrs.parts.len()
            ),
            Op::CloseTag { name, .. } => write!(f, "CloseTag {name}"),
            Op::SelfCloseTag {
                name,
                attrs,
                nuke_outer,
                nuke_inner,
                ..
            } => write!(
                f,
                "SelfCloseTag {name}{} parts={} nuke_outer={nuke_outer} nuke_inner={nuke_inner}",
                attrs.base.render(&Options::default()),
                attrs.parts.len()
            ),
            Op::EnterBlock(block) => write!(
                f,
                "EnterBlock `{}`{}",
                block.code,
                if block.continues { " (continues)" } else { "" }
            ),
            Op::ExitBlock => f.write_str("ExitBlock"),
            Op::ApplyFilter { name, segments, .. } => {
                write!(f, "ApplyFilter :{name} ({} segments)", segments.len())
            }
            Op::EmitDoctype { text } => write!(f, "EmitDoctype {text}"),
        }
    }
}

/// A compiled template: operations in document order plus the options
/// they were compiled with.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub ops: Vec<Op>,
    pub options: Options,
}

impl Program {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// One operation per line, block bodies indented.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0usize;
        for (index, op) in self.ops.iter().enumerate() {
            if matches!(op, Op::ExitBlock) {
                depth = depth.saturating_sub(1);
            }
            writeln!(f, "{index:4}  {}{op}", "  ".repeat(depth))?;
            if matches!(op, Op::EnterBlock(_)) {
                depth += 1;
            }
        }
        Ok(())
    }
}

/// Compilation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Syntax error at line {line}: unknown doctype `{token}`")]
    UnknownDoctype { token: String, line: usize },

    #[error("Syntax error at line {line}: unregistered filter `:{name}`")]
    UnregisteredFilter { name: String, line: usize },

    #[error("Filter error at line {line} in `:{name}`: {message}")]
    Filter {
        name: String,
        line: usize,
        message: String,
    },
}

impl CompileError {
    /// Source line the error was raised on.
    pub fn line(&self) -> usize {
        match self {
            CompileError::Parse(err) => err.line(),
            CompileError::UnknownDoctype { line, .. }
            | CompileError::UnregisteredFilter { line, .. }
            | CompileError::Filter { line, .. } => *line,
        }
    }
}

/// Parse and compile a template with the built-in filters.
pub fn compile(source: &str, options: &Options) -> Result<Program, CompileError> {
    compile_with(source, options, &FilterRegistry::builtin())
}

/// Parse and compile a template against a given filter registry.
pub fn compile_with(
    source: &str,
    options: &Options,
    filters: &FilterRegistry,
) -> Result<Program, CompileError> {
    let document = Parser::parse(source)?;
    Compiler::new(options, filters).compile(&document)
}
