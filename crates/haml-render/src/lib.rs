//! Haml Renderer
//!
//! Executes a compiled [`Program`] against an [`Evaluator`] and produces the
//! final markup. The renderer owns whitespace: two-space indentation per
//! nesting level, line breaks between block-level output and the nuke and
//! preserve rules carried by the tag operations.
//!
//! Statements with a body are handed to the evaluator together with a
//! callback that renders the body once per call, so loops and branches are
//! entirely the evaluator's business.

mod output;

use std::collections::HashMap;
use std::sync::Arc;

use haml_codegen::attrs::{AttributePart, Attributes};
use haml_codegen::value::{escape_html, preserve};
use haml_codegen::{
    compile, AttributeBag, BlockStatement, CompileError, FilterRegistry, Flow, Op, Options,
    Program, Value,
};
use haml_lexer::Segment;
use haml_parser::ast::RefPrefix;

use crate::output::{Output, TagFlags};

/// Failure reported by an evaluator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("{0}")]
    Failed(String),

    /// Rendering of a block body failed. Evaluators should pass this
    /// through; the renderer reports the underlying error.
    #[error("rendering halted")]
    Halted,
}

/// The expression capability the renderer depends on.
pub trait Evaluator {
    /// Evaluate an output expression.
    fn evaluate(&mut self, code: &str) -> Result<Value, EvalError>;

    /// Run a statement that owns a block. `body` renders the block once
    /// per call; the evaluator decides how often and in which scope. The
    /// returned value is emitted for block-form `=` scripts.
    fn run_block(
        &mut self,
        block: &BlockStatement,
        body: &mut dyn FnMut(&mut Self) -> Result<(), EvalError>,
    ) -> Result<Option<Value>, EvalError>;
}

/// Render-time error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Evaluation error at line {line} in `{code}`: {message}")]
    Evaluation {
        message: String,
        code: String,
        line: usize,
    },

    #[error("Filter error at line {line} in `:{name}`: {message}")]
    Filter {
        name: String,
        message: String,
        line: usize,
    },

    #[error("Unbalanced block at operation {index}")]
    UnbalancedBlock { index: usize },
}

/// Compile or render failure, for callers going straight from source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Compile `source` with the built-in filters and render it.
pub fn render<E: Evaluator>(source: &str, options: &Options, evaluator: &mut E) -> Result<String, Error> {
    let program = compile(source, options)?;
    Ok(Renderer::new(&program).render(evaluator)?)
}

/// Program renderer.
pub struct Renderer<'p> {
    program: &'p Program,
    filters: Arc<FilterRegistry>,
}

impl<'p> Renderer<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            filters: FilterRegistry::builtin(),
        }
    }

    /// Use a registry other than the built-in one for deferred filters.
    pub fn with_filters(mut self, filters: Arc<FilterRegistry>) -> Self {
        self.filters = filters;
        self
    }

    pub fn render<E: Evaluator>(&self, evaluator: &mut E) -> Result<String, RenderError> {
        let blocks = match_blocks(&self.program.ops)?;
        let mut run = Run {
            program: self.program,
            filters: &self.filters,
            blocks,
            output: Output::new(),
            halted: None,
        };
        run.range(0, self.program.ops.len(), evaluator)?;

        let html = run.output.finish();
        log::debug!(
            "rendered {} operations into {} bytes",
            self.program.ops.len(),
            html.len()
        );
        Ok(html)
    }
}

/// Map every `EnterBlock` index to its `ExitBlock` index.
fn match_blocks(ops: &[Op]) -> Result<HashMap<usize, usize>, RenderError> {
    let mut open = Vec::new();
    let mut blocks = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        match op {
            Op::EnterBlock(_) => open.push(index),
            Op::ExitBlock => {
                let enter = open.pop().ok_or(RenderError::UnbalancedBlock { index })?;
                blocks.insert(enter, index);
            }
            _ => {}
        }
    }
    match open.pop() {
        Some(index) => Err(RenderError::UnbalancedBlock { index }),
        None => Ok(blocks),
    }
}

/// State of one render call.
struct Run<'p, 'r> {
    program: &'p Program,
    filters: &'r FilterRegistry,
    blocks: HashMap<usize, usize>,
    output: Output,
    /// Error raised inside a block body, held while the evaluator unwinds.
    halted: Option<RenderError>,
}

impl<'p> Run<'p, '_> {
    fn options(&self) -> &'p Options {
        &self.program.options
    }

    /// Execute the operations in `start..end`.
    fn range<E: Evaluator>(&mut self, start: usize, end: usize, ev: &mut E) -> Result<(), RenderError> {
        let program = self.program;
        let mut index = start;

        while index < end {
            match &program.ops[index] {
                Op::EnterBlock(block) => {
                    let exit = self
                        .blocks
                        .get(&index)
                        .copied()
                        .ok_or(RenderError::UnbalancedBlock { index })?;
                    let value = self.block(block, index + 1, exit, ev)?;
                    if let (Some(output), Some(value)) = (block.output, value) {
                        self.emit_value(&value, output.escape, output.preserve, Flow::Line);
                    }
                    index = exit + 1;
                    continue;
                }
                Op::ExitBlock => return Err(RenderError::UnbalancedBlock { index }),
                Op::EmitLiteral { text, flow } => self.output.write(text, *flow),
                Op::EmitExpr {
                    code,
                    escape,
                    preserve,
                    flow,
                    line,
                } => {
                    let value = evaluate(ev, code, *line)?;
                    self.emit_value(&value, *escape, *preserve, *flow);
                }
                Op::OpenTag {
                    name,
                    attrs,
                    nuke_outer,
                    nuke_inner,
                    inline,
                    preserve,
                    line,
                } => {
                    let attrs = self.attributes(attrs, *line, ev)?;
                    let flags = TagFlags {
                        nuke_outer: *nuke_outer,
                        nuke_inner: *nuke_inner,
                        inline: *inline,
                        preserve: *preserve,
                    };
                    self.output.open_tag(name, &attrs, flags);
                }
                Op::CloseTag {
                    name,
                    nuke_outer,
                    nuke_inner,
                    inline,
                    preserve,
                } => {
                    let flags = TagFlags {
                        nuke_outer: *nuke_outer,
                        nuke_inner: *nuke_inner,
                        inline: *inline,
                        preserve: *preserve,
                    };
                    self.output.close_tag(name, flags);
                }
                Op::SelfCloseTag {
                    name,
                    attrs,
                    nuke_outer,
                    line,
                    ..
                } => {
                    let attrs = self.attributes(attrs, *line, ev)?;
                    let format = self.options().format;
                    self.output.self_close_tag(name, &attrs, *nuke_outer, format);
                }
                Op::ApplyFilter {
                    name,
                    segments,
                    line,
                } => self.filter(name, segments, *line, ev)?,
                Op::EmitDoctype { text } => self.output.write(text, Flow::Line),
            }
            index += 1;
        }

        Ok(())
    }

    fn block<E: Evaluator>(
        &mut self,
        block: &BlockStatement,
        start: usize,
        end: usize,
        ev: &mut E,
    ) -> Result<Option<Value>, RenderError> {
        log::trace!("line {}: entering block `{}`", block.line, block.code);
        let result = ev.run_block(block, &mut |ev: &mut E| match self.range(start, end, ev) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.halted = Some(err);
                Err(EvalError::Halted)
            }
        });

        if let Some(err) = self.halted.take() {
            return Err(err);
        }
        result.map_err(|err| evaluation_error(err, &block.code, block.line))
    }

    /// Escape, then preserve, so `&#x000A;` is never escaped itself.
    fn emit_value(&mut self, value: &Value, escape: bool, preserved: bool, flow: Flow) {
        let text = value.to_string();
        let text = if escape {
            escape_html(&text).into_owned()
        } else {
            text
        };
        let text = if preserved {
            preserve(&text).into_owned()
        } else {
            text
        };
        self.output.write(&text, flow);
    }

    /// Apply the render-time parts on top of the folded bag.
    fn attributes<E: Evaluator>(
        &mut self,
        attrs: &Attributes,
        line: usize,
        ev: &mut E,
    ) -> Result<String, RenderError> {
        if attrs.is_static() {
            return Ok(attrs.base.render(self.options()));
        }

        let mut bag: AttributeBag = attrs.base.clone();
        for part in &attrs.parts {
            match part {
                AttributePart::Object { code, prefix } => {
                    let prefix = match prefix {
                        Some(RefPrefix::Literal(text)) => Some(text.clone()),
                        Some(RefPrefix::Code(code)) => {
                            Some(evaluate(ev, code, line)?.to_string())
                        }
                        None => None,
                    };
                    match evaluate(ev, code, line)? {
                        Value::Object(object) => bag.add_object(object.as_ref(), prefix.as_deref()),
                        Value::Nil => {}
                        other => {
                            return Err(RenderError::Evaluation {
                                message: format!("object reference got `{other}`, not an object"),
                                code: code.clone(),
                                line,
                            })
                        }
                    }
                }
                AttributePart::Literal { name, value } => bag.set(name, value.clone()),
                AttributePart::Interpolated { name, segments } => {
                    let text = interpolate(segments, line, ev)?;
                    bag.set(name, Value::Str(text));
                }
                AttributePart::Expr { name, code } => {
                    let value = evaluate(ev, code, line)?;
                    bag.set(name, value);
                }
                AttributePart::Hash { code } => match evaluate(ev, code, line)? {
                    Value::Map(map) => bag.merge(map),
                    Value::Nil => {}
                    other => {
                        return Err(RenderError::Evaluation {
                            message: format!("attribute hash got `{other}`, not a map"),
                            code: code.clone(),
                            line,
                        })
                    }
                },
            }
        }

        Ok(bag.render(self.options()))
    }

    fn filter<E: Evaluator>(
        &mut self,
        name: &str,
        segments: &[Segment],
        line: usize,
        ev: &mut E,
    ) -> Result<(), RenderError> {
        let filter = self.filters.get(name).ok_or_else(|| RenderError::Filter {
            name: name.to_string(),
            message: "unregistered filter".into(),
            line,
        })?;
        let text = interpolate(segments, line, ev)?;
        let output = filter
            .apply(&text, self.options())
            .map_err(|err| RenderError::Filter {
                name: name.to_string(),
                message: err.message,
                line,
            })?;
        if !output.is_empty() {
            self.output.write(&output, Flow::Line);
        }
        Ok(())
    }
}

fn evaluate<E: Evaluator>(ev: &mut E, code: &str, line: usize) -> Result<Value, RenderError> {
    ev.evaluate(code)
        .map_err(|err| evaluation_error(err, code, line))
}

fn evaluation_error(err: EvalError, code: &str, line: usize) -> RenderError {
    RenderError::Evaluation {
        message: err.to_string(),
        code: code.to_string(),
        line,
    }
}

/// Concatenate segments, evaluating expressions. Interpolated values are
/// inserted unescaped; attribute values are escaped when rendered.
fn interpolate<E: Evaluator>(segments: &[Segment], line: usize, ev: &mut E) -> Result<String, RenderError> {
    let mut text = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(literal) => text.push_str(literal),
            Segment::Expression(code) => text.push_str(&evaluate(ev, code, line)?.to_string()),
        }
    }
    Ok(text)
}
