//! Node tree for Haml documents.
//!
//! The tree is built once per parse and never mutated after a node's
//! children are complete. Child order is document order.

use haml_lexer::Segment;

/// A complete Haml document: the root of the node tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

/// One parsed construct.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `%tag`, `.class` or `#id`.
    Element(Element),

    /// Plain text, possibly with `#{...}` interpolation.
    Text(PlainText),

    /// `=`, `~`, `&=` or `!=` output.
    Script(ScriptOutput),

    /// `-` statement, with the indented block as its body.
    Silent(SilentScript),

    /// `/` HTML comment or `/[cond]` conditional comment.
    Comment(Comment),

    /// `:name` filter block.
    Filter(Filter),

    /// `!!!` directive.
    Doctype(Doctype),
}

impl Node {
    /// 1-based source line the node starts on.
    pub fn line(&self) -> usize {
        match self {
            Node::Element(el) => el.line,
            Node::Text(text) => text.line,
            Node::Script(script) => script.line,
            Node::Silent(silent) => silent.line,
            Node::Comment(comment) => comment.line,
            Node::Filter(filter) => filter.line,
            Node::Doctype(doctype) => doctype.line,
        }
    }

    /// Children of nodes that can own an indented block.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element(el) => &el.children,
            Node::Script(script) => &script.children,
            Node::Silent(silent) => &silent.children,
            Node::Comment(comment) => &comment.children,
            Node::Text(_) | Node::Filter(_) | Node::Doctype(_) => &[],
        }
    }
}

/// An HTML element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    /// `.class` shorthand, in source order.
    pub classes: Vec<String>,
    /// `#id` shorthand. The last one written wins.
    pub id: Option<String>,
    /// `{...}` and `(...)` attribute sources, in source order.
    pub attributes: Vec<AttributeSource>,
    /// `[...]` object reference.
    pub object_ref: Option<ObjectRef>,
    /// Explicit trailing `/`.
    pub self_closing: bool,
    /// `>`: no whitespace around the element.
    pub nuke_outer: bool,
    /// `<`: no whitespace inside the element.
    pub nuke_inner: bool,
    pub content: InlineContent,
    pub children: Vec<Node>,
    pub line: usize,
}

impl Element {
    pub fn new(tag: impl Into<String>, line: usize) -> Self {
        Self {
            tag: tag.into(),
            classes: Vec::new(),
            id: None,
            attributes: Vec::new(),
            object_ref: None,
            self_closing: false,
            nuke_outer: false,
            nuke_inner: false,
            content: InlineContent::None,
            children: Vec::new(),
            line,
        }
    }

    /// Whether the element may close itself implicitly: it is listed in the
    /// autoclose set and has neither inline content nor children.
    pub fn is_autoclose<'a>(&self, mut autoclose: impl Iterator<Item = &'a str>) -> bool {
        matches!(self.content, InlineContent::None)
            && self.children.is_empty()
            && autoclose.any(|tag| tag == self.tag)
    }
}

/// Content written on the same line as the tag header.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineContent {
    None,
    /// `%p text with #{interpolation}`
    Text(Vec<Segment>),
    /// `%p= expr`, a nested output node.
    Script(ScriptOutput),
}

/// Where an attribute value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSource {
    /// Key and value known at compile time.
    Static { name: String, value: Literal },
    /// Quoted value containing `#{...}`.
    Interpolated { name: String, segments: Vec<Segment> },
    /// Value is an expression.
    Dynamic { name: String, code: String },
    /// A whole attribute hash evaluated at render time.
    Hash { code: String },
}

impl AttributeSource {
    pub fn is_static(&self) -> bool {
        matches!(self, AttributeSource::Static { .. })
    }
}

/// A literal attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    /// Numbers keep their source spelling.
    Number(String),
    Bool(bool),
    Nil,
}

/// `[object]` or `[object, prefix]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub code: String,
    pub prefix: Option<RefPrefix>,
}

/// The optional second argument of an object reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPrefix {
    /// `:name` or a quoted string.
    Literal(String),
    /// Any other expression.
    Code(String),
}

/// Escape policy for evaluated output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Escape {
    /// Follow the `escape_html` option.
    #[default]
    Default,
    /// `&=` or `& text`.
    Force,
    /// `!=` or `! text`.
    Raw,
}

impl Escape {
    /// Resolve against the configured default.
    pub fn resolve(self, escape_by_default: bool) -> bool {
        match self {
            Escape::Default => escape_by_default,
            Escape::Force => true,
            Escape::Raw => false,
        }
    }
}

/// Plain text line. Whether it is preserved depends on the enclosing
/// tag, not on the text itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainText {
    pub segments: Vec<Segment>,
    /// Escape policy for the interpolated values.
    pub escape: Escape,
    pub line: usize,
}

/// Output expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    pub code: String,
    pub escape: Escape,
    /// `~`: newlines in the value are preserved.
    pub preserve: bool,
    /// Only present when the script opens an indented block.
    pub children: Vec<Node>,
    pub line: usize,
}

/// Statement evaluated for effect.
#[derive(Debug, Clone, PartialEq)]
pub struct SilentScript {
    pub code: String,
    pub children: Vec<Node>,
    pub line: usize,
}

/// Keywords that continue the block opened by the previous sibling.
const MID_BLOCK_KEYWORDS: &[&str] = &["else", "elsif", "when", "rescue", "ensure"];

impl SilentScript {
    /// Whether the statement starts with a mid-block keyword such as `else`.
    pub fn continues_block(&self) -> bool {
        let first = self
            .code
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .next()
            .unwrap_or("");
        MID_BLOCK_KEYWORDS.contains(&first)
    }
}

/// HTML or conditional comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// `Some("if IE")` for `/[if IE]`.
    pub condition: Option<String>,
    /// Inline comment text.
    pub text: Option<String>,
    pub children: Vec<Node>,
    pub line: usize,
}

/// Filter block.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    /// Body lines joined with literal `\n`, interpolation already scanned.
    pub segments: Vec<Segment>,
    pub line: usize,
}

/// `!!!` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    /// Everything after `!!!`, trimmed.
    pub args: String,
    pub line: usize,
}
