//! Node tree to operation program.
//!
//! One depth-first walk. Elements become tag operations carrying their
//! resolved attribute structure and nuke flags, statements become
//! `EnterBlock`/`ExitBlock` pairs around their body, and everything the
//! renderer prints verbatim is folded into `EmitLiteral`.

use haml_lexer::{literal_text, Segment};
use haml_parser::ast::{
    Comment, Document, Element, Escape, Filter, InlineContent, Node, ScriptOutput,
};

use crate::attrs::Attributes;
use crate::doctype;
use crate::filters::FilterRegistry;
use crate::options::Options;
use crate::{BlockOutput, BlockStatement, CompileError, Flow, Op, Program};

/// Compiler state for one document.
pub struct Compiler<'a> {
    options: &'a Options,
    filters: &'a FilterRegistry,
    ops: Vec<Op>,
}

impl<'a> Compiler<'a> {
    pub fn new(options: &'a Options, filters: &'a FilterRegistry) -> Self {
        Self {
            options,
            filters,
            ops: Vec::new(),
        }
    }

    pub fn compile(mut self, document: &Document) -> Result<Program, CompileError> {
        self.nodes(&document.nodes)?;
        log::debug!("compiled {} operations", self.ops.len());
        Ok(Program {
            ops: self.ops,
            options: self.options.clone(),
        })
    }

    fn nodes(&mut self, nodes: &[Node]) -> Result<(), CompileError> {
        for node in nodes {
            self.node(node)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Element(el) => self.element(el),
            Node::Text(text) => {
                self.segments(&text.segments, text.escape, Flow::Line, text.line);
                Ok(())
            }
            Node::Script(script) if script.children.is_empty() => {
                self.script(script, Flow::Line);
                Ok(())
            }
            Node::Script(script) => {
                if self.options.suppress_eval {
                    return Ok(());
                }
                self.block(
                    BlockStatement {
                        code: script.code.clone(),
                        continues: false,
                        output: Some(BlockOutput {
                            escape: script.escape.resolve(self.options.escape_html),
                            preserve: script.preserve,
                        }),
                        line: script.line,
                    },
                    &script.children,
                )
            }
            Node::Silent(silent) => {
                if self.options.suppress_eval {
                    return Ok(());
                }
                self.block(
                    BlockStatement {
                        code: silent.code.clone(),
                        continues: silent.continues_block(),
                        output: None,
                        line: silent.line,
                    },
                    &silent.children,
                )
            }
            Node::Comment(comment) => self.comment(comment),
            Node::Filter(filter) => self.filter(filter),
            Node::Doctype(directive) => {
                let resolved = doctype::resolve(&directive.args, self.options).map_err(|token| {
                    CompileError::UnknownDoctype {
                        token,
                        line: directive.line,
                    }
                })?;
                if let Some(text) = resolved {
                    self.ops.push(Op::EmitDoctype { text });
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn element(&mut self, el: &Element) -> Result<(), CompileError> {
        let attrs = Attributes::resolve(el, self.options.suppress_eval);
        let preserve = self.options.is_preserve(&el.tag);
        let nuke_inner = el.nuke_inner || preserve;

        let autoclose = el.is_autoclose(self.options.autoclose.iter().map(String::as_str));
        if el.self_closing || autoclose {
            self.ops.push(Op::SelfCloseTag {
                name: el.tag.clone(),
                attrs,
                nuke_outer: el.nuke_outer,
                nuke_inner,
                line: el.line,
            });
            return Ok(());
        }

        let inline = el.children.is_empty();
        self.ops.push(Op::OpenTag {
            name: el.tag.clone(),
            attrs,
            nuke_outer: el.nuke_outer,
            nuke_inner,
            inline,
            preserve,
            line: el.line,
        });

        match &el.content {
            InlineContent::None => {}
            InlineContent::Text(segments) => {
                self.segments(segments, Escape::Default, Flow::Inline, el.line);
            }
            InlineContent::Script(script) => self.script(script, Flow::Inline),
        }
        self.nodes(&el.children)?;

        self.ops.push(Op::CloseTag {
            name: el.tag.clone(),
            nuke_outer: el.nuke_outer,
            nuke_inner,
            inline,
            preserve,
        });
        Ok(())
    }

    // =========================================================================
    // Text and scripts
    // =========================================================================

    /// Emit scanned text. The first operation takes `flow`, the rest
    /// follow inline. Literal text is never escaped.
    fn segments(&mut self, segments: &[Segment], escape: Escape, mut flow: Flow, line: usize) {
        let escape = escape.resolve(self.options.escape_html);
        for segment in segments {
            match segment {
                Segment::Literal(text) => self.ops.push(Op::EmitLiteral {
                    text: text.clone(),
                    flow,
                }),
                Segment::Expression(_) if self.options.suppress_eval => continue,
                Segment::Expression(code) => self.ops.push(Op::EmitExpr {
                    code: code.clone(),
                    escape,
                    preserve: false,
                    flow,
                    line,
                }),
            }
            flow = Flow::Inline;
        }
    }

    fn script(&mut self, script: &ScriptOutput, flow: Flow) {
        if self.options.suppress_eval {
            self.ops.push(Op::EmitLiteral {
                text: String::new(),
                flow: Flow::Inline,
            });
            return;
        }
        self.ops.push(Op::EmitExpr {
            code: script.code.clone(),
            escape: script.escape.resolve(self.options.escape_html),
            preserve: script.preserve,
            flow,
            line: script.line,
        });
    }

    fn block(&mut self, statement: BlockStatement, children: &[Node]) -> Result<(), CompileError> {
        self.ops.push(Op::EnterBlock(statement));
        self.nodes(children)?;
        self.ops.push(Op::ExitBlock);
        Ok(())
    }

    // =========================================================================
    // Comments and filters
    // =========================================================================

    fn comment(&mut self, comment: &Comment) -> Result<(), CompileError> {
        let (open, close) = match &comment.condition {
            Some(condition) => (format!("<!--[{condition}]>"), "<![endif]-->"),
            None => ("<!--".to_string(), "-->"),
        };

        if let Some(text) = &comment.text {
            self.ops.push(Op::EmitLiteral {
                text: format!("{open} {text} {close}"),
                flow: Flow::Line,
            });
            return Ok(());
        }
        if comment.children.is_empty() {
            self.ops.push(Op::EmitLiteral {
                text: format!("{open}{close}"),
                flow: Flow::Line,
            });
            return Ok(());
        }

        self.ops.push(Op::EmitLiteral {
            text: open,
            flow: Flow::Open,
        });
        self.nodes(&comment.children)?;
        self.ops.push(Op::EmitLiteral {
            text: close.to_string(),
            flow: Flow::Close,
        });
        Ok(())
    }

    /// Fully literal bodies run through the filter now; bodies with
    /// interpolation are left to the renderer.
    fn filter(&mut self, filter: &Filter) -> Result<(), CompileError> {
        let Some(handler) = self.filters.get(&filter.name) else {
            return Err(CompileError::UnregisteredFilter {
                name: filter.name.clone(),
                line: filter.line,
            });
        };

        let segments: Vec<Segment> = if self.options.suppress_eval {
            filter
                .segments
                .iter()
                .filter(|segment| segment.is_literal())
                .cloned()
                .collect()
        } else {
            filter.segments.clone()
        };

        let Some(text) = literal_text(&segments) else {
            log::trace!("line {}: :{} deferred to render time", filter.line, filter.name);
            self.ops.push(Op::ApplyFilter {
                name: filter.name.clone(),
                segments,
                line: filter.line,
            });
            return Ok(());
        };

        let output = handler
            .apply(&text, self.options)
            .map_err(|err| CompileError::Filter {
                name: filter.name.clone(),
                line: filter.line,
                message: err.message,
            })?;
        if !output.is_empty() {
            self.ops.push(Op::EmitLiteral {
                text: output,
                flow: Flow::Line,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{AttributeBag, AttributePart};
    use crate::value::Value;
    use crate::{compile, compile_with, Format};
    use pretty_assertions::assert_eq;

    fn ops(source: &str) -> Vec<Op> {
        compile(source, &Options::default()).unwrap().ops
    }

    fn ops_with(source: &str, options: Options) -> Vec<Op> {
        compile(source, &options).unwrap().ops
    }

    fn literal(text: &str, flow: Flow) -> Op {
        Op::EmitLiteral {
            text: text.into(),
            flow,
        }
    }

    fn expr(code: &str, flow: Flow, line: usize) -> Op {
        Op::EmitExpr {
            code: code.into(),
            escape: false,
            preserve: false,
            flow,
            line,
        }
    }

    fn open(name: &str, inline: bool, line: usize) -> Op {
        Op::OpenTag {
            name: name.into(),
            attrs: Attributes::default(),
            nuke_outer: false,
            nuke_inner: false,
            inline,
            preserve: false,
            line,
        }
    }

    fn close(name: &str, inline: bool) -> Op {
        Op::CloseTag {
            name: name.into(),
            nuke_outer: false,
            nuke_inner: false,
            inline,
            preserve: false,
        }
    }

    fn enter(code: &str, line: usize) -> Op {
        Op::EnterBlock(BlockStatement {
            code: code.into(),
            continues: false,
            output: None,
            line,
        })
    }

    // =========================================================================
    // Elements
    // =========================================================================

    #[test]
    fn test_empty_document() {
        assert!(ops("").is_empty());
    }

    #[test]
    fn test_self_closing_with_attributes() {
        let mut bag = AttributeBag::new();
        bag.add_class("item");
        bag.add_id("x");
        bag.set("a", Value::Int(1));

        assert_eq!(
            ops("%div.item#x{ :a => 1 }/"),
            vec![Op::SelfCloseTag {
                name: "div".into(),
                attrs: Attributes {
                    base: bag,
                    parts: vec![]
                },
                nuke_outer: false,
                nuke_inner: false,
                line: 1,
            }]
        );
    }

    #[test]
    fn test_autoclose_only_when_empty() {
        assert!(matches!(ops("%br")[..], [Op::SelfCloseTag { .. }]));
        assert!(matches!(ops("%br text")[..], [Op::OpenTag { .. }, _, Op::CloseTag { .. }]));
        assert!(matches!(ops("%div")[..], [Op::OpenTag { inline: true, .. }, Op::CloseTag { .. }]));
    }

    #[test]
    fn test_custom_autoclose_set() {
        let mut options = Options::default();
        options.autoclose.insert("source".into());
        assert!(matches!(
            ops_with("%source", options)[..],
            [Op::SelfCloseTag { .. }]
        ));
    }

    #[test]
    fn test_inline_text_and_script() {
        assert_eq!(
            ops("%p hi #{name}"),
            vec![
                open("p", true, 1),
                literal("hi ", Flow::Inline),
                expr("name", Flow::Inline, 1),
                close("p", true),
            ]
        );
        assert_eq!(
            ops("%p= name"),
            vec![open("p", true, 1), expr("name", Flow::Inline, 1), close("p", true)]
        );
    }

    #[test]
    fn test_nested_children() {
        assert_eq!(
            ops("%ul\n  %li a"),
            vec![
                open("ul", false, 1),
                open("li", true, 2),
                literal("a", Flow::Inline),
                close("li", true),
                close("ul", false),
            ]
        );
    }

    #[test]
    fn test_shorthand_equals_explicit_attributes() {
        let shorthand = ops("#foo.bar");
        let explicit = ops("%div{:class => 'bar', :id => 'foo'}");
        assert_eq!(shorthand, explicit);
    }

    #[test]
    fn test_nuke_flags_on_both_tags() {
        let ops = ops("%p<>\n  a");
        assert!(matches!(
            ops[0],
            Op::OpenTag {
                nuke_outer: true,
                nuke_inner: true,
                inline: false,
                ..
            }
        ));
        assert!(matches!(
            ops[2],
            Op::CloseTag {
                nuke_outer: true,
                nuke_inner: true,
                ..
            }
        ));
    }

    #[test]
    fn test_preserve_tag_implies_nuke_inner() {
        let ops = ops("%pre\n  a");
        assert!(matches!(
            ops[0],
            Op::OpenTag {
                nuke_inner: true,
                preserve: true,
                ..
            }
        ));
    }

    #[test]
    fn test_dynamic_attributes_become_parts() {
        let ops = ops("%a.link{:href => url, 'data-x' => 1}[post]");
        let Op::OpenTag { attrs, .. } = &ops[0] else {
            panic!("Expected OpenTag, got {:?}", ops[0]);
        };
        assert_eq!(attrs.base.classes(), ["link"]);
        assert_eq!(
            attrs.parts,
            vec![
                AttributePart::Object {
                    code: "post".into(),
                    prefix: None
                },
                AttributePart::Expr {
                    name: "href".into(),
                    code: "url".into()
                },
                AttributePart::Literal {
                    name: "data-x".into(),
                    value: Value::Int(1)
                },
            ]
        );
    }

    // =========================================================================
    // Scripts and blocks
    // =========================================================================

    #[test]
    fn test_silent_script_block() {
        assert_eq!(
            ops("- 3.times do |i|\n  %p= i"),
            vec![
                enter("3.times do |i|", 1),
                open("p", true, 2),
                expr("i", Flow::Inline, 2),
                close("p", true),
                Op::ExitBlock,
            ]
        );
    }

    #[test]
    fn test_blocks_pair_up() {
        let ops = ops("- if a\n  x\n- else\n  - each do\n    y");
        let enters = ops.iter().filter(|op| matches!(op, Op::EnterBlock(_))).count();
        let exits = ops.iter().filter(|op| matches!(op, Op::ExitBlock)).count();
        assert_eq!((enters, exits), (3, 3));
        assert!(matches!(&ops[3], Op::EnterBlock(block) if block.continues));
    }

    #[test]
    fn test_script_escaping() {
        let escaped = Options {
            escape_html: true,
            ..Options::default()
        };
        let flags = |ops: Vec<Op>| -> Vec<bool> {
            ops.into_iter()
                .filter_map(|op| match op {
                    Op::EmitExpr { escape, .. } => Some(escape),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(flags(ops("= a\n&= b\n!= c")), vec![false, true, false]);
        assert_eq!(flags(ops_with("= a\n&= b\n!= c", escaped)), vec![true, true, false]);
    }

    #[test]
    fn test_preserved_script() {
        assert!(matches!(
            ops("~ body")[..],
            [Op::EmitExpr { preserve: true, flow: Flow::Line, .. }]
        ));
    }

    #[test]
    fn test_block_form_output_script() {
        let ops = ops("= wrap do\n  %p");
        assert!(matches!(
            &ops[0],
            Op::EnterBlock(BlockStatement { output: Some(BlockOutput { escape: false, preserve: false }), .. })
        ));
        assert_eq!(ops.last(), Some(&Op::ExitBlock));
    }

    #[test]
    fn test_suppress_eval() {
        let options = Options {
            suppress_eval: true,
            ..Options::default()
        };
        assert_eq!(
            ops_with("%p= x\n- foo\n  %span\nHi #{name}!", options),
            vec![
                open("p", true, 1),
                literal("", Flow::Inline),
                close("p", true),
                literal("Hi ", Flow::Line),
                literal("!", Flow::Inline),
            ]
        );
    }

    // =========================================================================
    // Comments, doctype, filters
    // =========================================================================

    #[test]
    fn test_comments() {
        assert_eq!(ops("/ note"), vec![literal("<!-- note -->", Flow::Line)]);
        assert_eq!(
            ops("/[if IE]\n  %br"),
            vec![
                literal("<!--[if IE]>", Flow::Open),
                Op::SelfCloseTag {
                    name: "br".into(),
                    attrs: Attributes::default(),
                    nuke_outer: false,
                    nuke_inner: false,
                    line: 2,
                },
                literal("<![endif]-->", Flow::Close),
            ]
        );
    }

    #[test]
    fn test_silent_comment_compiles_to_nothing() {
        assert_eq!(ops("-# hidden\n  %p secret\n%br").len(), 1);
    }

    #[test]
    fn test_doctype() {
        assert_eq!(
            ops("!!! 1.1"),
            vec![Op::EmitDoctype {
                text: r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#.into()
            }]
        );
        assert!(ops_with("!!! XML", Options::default().with_format(Format::Html5)).is_empty());
    }

    #[test]
    fn test_unknown_doctype() {
        let err = compile("%p\n!!! Bogus", &Options::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownDoctype {
                token: "Bogus".into(),
                line: 2
            }
        );
        assert!(err.to_string().contains("Bogus"));
    }

    #[test]
    fn test_doctype_with_trailing_token() {
        let err = compile("!!! Strict Bogus", &Options::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownDoctype {
                token: "Bogus".into(),
                line: 1
            }
        );
        assert_eq!(
            ops("!!! 1.0 Strict"),
            ops("!!! Strict"),
        );
    }

    #[test]
    fn test_literal_filter_folded() {
        assert_eq!(
            ops(":escaped\n  <b>\n  & c"),
            vec![literal("&lt;b&gt;\n&amp; c", Flow::Line)]
        );
    }

    #[test]
    fn test_interpolated_filter_deferred() {
        assert_eq!(
            ops(":plain\n  Hi #{name}"),
            vec![Op::ApplyFilter {
                name: "plain".into(),
                segments: vec![
                    Segment::Literal("Hi ".into()),
                    Segment::Expression("name".into())
                ],
                line: 1,
            }]
        );
    }

    #[test]
    fn test_unregistered_filter() {
        let err = compile(":markdown\n  # Title", &Options::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnregisteredFilter {
                name: "markdown".into(),
                line: 1
            }
        );
        assert!(err.to_string().contains("unregistered filter `:markdown`"));
    }

    #[test]
    fn test_custom_registry() {
        let mut registry = FilterRegistry::with_builtins();
        registry.register("upcase", |text: &str, _: &Options| {
            Ok::<_, crate::FilterError>(text.to_uppercase())
        });
        let program = compile_with(":upcase\n  hi", &Options::default(), &registry).unwrap();
        assert_eq!(program.ops, vec![literal("HI", Flow::Line)]);
    }

    #[test]
    fn test_parse_errors_pass_through() {
        let err = compile("%p\n  %span\n      %b", &Options::default()).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_deterministic() {
        let source = "!!! 5\n%html\n  %body\n    #main.a.b{:title => t}\n      - items.each do |i|\n        %p= i\n    :css\n      p { }";
        let options = Options::default();
        assert_eq!(compile(source, &options), compile(source, &options));
    }
}
