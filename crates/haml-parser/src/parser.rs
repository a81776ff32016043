//! Block parser for Haml.
//!
//! Consumes logical lines from the `haml-lexer` scanner and builds the
//! node tree with a stack of open nodes, one per indentation level:
//! a deeper line becomes a child of the stack top, an equal line a sibling,
//! a shallower line closes nodes until its ancestor level is reached.

use haml_lexer::{scan_interpolation, Indentation, Line, Marker, RawLine, Scanner, Segment};

use crate::ast::{
    Comment, Doctype, Document, Element, Escape, Filter, InlineContent, Node, PlainText,
    ScriptOutput, SilentScript,
};
use crate::header::{parse_header, HeaderError, Tail};
use crate::ParseError;

/// Haml document parser.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    indentation: Indentation,
    /// Open nodes; `stack[d]` sits at depth `d`.
    stack: Vec<Node>,
    document: Document,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            scanner: Scanner::new(source),
            indentation: Indentation::new(),
            stack: Vec::new(),
            document: Document::default(),
        }
    }

    /// Parse source code into a document tree.
    pub fn parse(source: &str) -> Result<Document, ParseError> {
        Parser::new(source).parse_document()
    }

    /// Parse a full document.
    fn parse_document(mut self) -> Result<Document, ParseError> {
        let mut count = 0;

        while let Some(line) = self.scanner.next() {
            let line = line?;
            let depth = self.indentation.depth(&line)?;
            self.enter_level(depth, line.number)?;
            if let Some(node) = self.parse_line(&line)? {
                self.stack.push(node);
            }
            count += 1;
        }
        self.close_to(0);

        log::debug!(
            "parsed {} top-level nodes from {count} lines",
            self.document.nodes.len()
        );
        Ok(self.document)
    }

    // =========================================================================
    // Nesting
    // =========================================================================

    /// Close nodes until a line at `depth` can be attached, then check the
    /// new parent can take children.
    fn enter_level(&mut self, depth: usize, line: usize) -> Result<(), ParseError> {
        let open = self.stack.len();
        if depth > open {
            return Err(if open == 0 {
                ParseError::syntax("Indenting at the beginning of the document is illegal", line)
            } else {
                ParseError::syntax(
                    format!(
                        "The line was indented {} levels deeper than the previous line",
                        depth + 1 - open
                    ),
                    line,
                )
            });
        }

        self.close_to(depth);
        match self.stack.last() {
            Some(parent) => check_nesting(parent, line),
            None => Ok(()),
        }
    }

    /// Pop open nodes until `depth` remain, attaching each to its parent.
    fn close_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            let Some(node) = self.stack.pop() else { break };
            match self.stack.last_mut().and_then(children_mut) {
                Some(children) => children.push(node),
                None => self.document.nodes.push(node),
            }
        }
    }

    // =========================================================================
    // Marker dispatch
    // =========================================================================

    fn parse_line(&mut self, line: &Line) -> Result<Option<Node>, ParseError> {
        let (marker, payload) = line.marker();
        let number = line.number;

        let node = match marker {
            Marker::Element => self.parse_element(payload, false, number)?,
            Marker::Div => self.parse_element(payload, true, number)?,
            Marker::Script => script(payload, Escape::Default, false, number)?,
            Marker::EscapedScript => script(payload, Escape::Force, false, number)?,
            Marker::UnescapedScript => script(payload, Escape::Raw, false, number)?,
            Marker::PreservedScript => script(payload, Escape::Default, true, number)?,
            Marker::Plain => text(payload, Escape::Default, number)?,
            Marker::EscapedText => text(payload, Escape::Force, number)?,
            Marker::UnescapedText => text(payload, Escape::Raw, number)?,
            Marker::Silent => {
                let code = payload.trim();
                if code.is_empty() {
                    return Err(ParseError::syntax("There's no code for `-` to run", number));
                }
                Node::Silent(SilentScript {
                    code: code.to_string(),
                    children: Vec::new(),
                    line: number,
                })
            }
            Marker::SilentComment => {
                let skipped = self.take_block(&line.indent).len();
                log::trace!("line {number}: silent comment swallowed {skipped} lines");
                return Ok(None);
            }
            Marker::Comment => comment(payload, number)?,
            Marker::Doctype => Node::Doctype(Doctype {
                args: payload.trim().to_string(),
                line: number,
            }),
            Marker::Filter => self.parse_filter(payload, line)?,
        };

        Ok(Some(node))
    }

    /// Parse an element header, pulling further physical lines while an
    /// attribute group is still open.
    fn parse_element(&mut self, payload: &str, implicit_div: bool, line: usize) -> Result<Node, ParseError> {
        let mut input = payload.to_string();
        let header = loop {
            match parse_header(&input, implicit_div, line) {
                Ok(header) => break header,
                Err(HeaderError::Invalid(err)) => return Err(err),
                Err(HeaderError::Unclosed) => match self.scanner.next_raw() {
                    Some(raw) => {
                        input.push(' ');
                        input.push_str(raw.text.trim());
                    }
                    None => {
                        return Err(ParseError::syntax("Unbalanced brackets in tag header", line));
                    }
                },
            }
        };

        let content = match header.tail {
            Tail::None => InlineContent::None,
            Tail::Text(text) => InlineContent::Text(scan_interpolation(&text, line)?),
            Tail::Script {
                code,
                escape,
                preserve,
            } => InlineContent::Script(ScriptOutput {
                code,
                escape,
                preserve,
                children: Vec::new(),
                line,
            }),
        };

        Ok(Node::Element(Element {
            tag: header.tag,
            classes: header.classes,
            id: header.id,
            attributes: header.attributes,
            object_ref: header.object_ref,
            self_closing: header.self_closing,
            nuke_outer: header.nuke_outer,
            nuke_inner: header.nuke_inner,
            content,
            children: Vec::new(),
            line,
        }))
    }

    /// Parse `:name` and its indented body. No marker dispatch happens
    /// inside the body; lines are only scanned for interpolation.
    fn parse_filter(&mut self, payload: &str, line: &Line) -> Result<Node, ParseError> {
        let name = payload.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(ParseError::syntax(format!("Invalid filter name `:{name}`"), line.number));
        }

        let mut body = self.take_block(&line.indent);
        while body.last().is_some_and(RawLine::is_blank) {
            body.pop();
        }
        let base = body
            .iter()
            .find(|raw| !raw.is_blank())
            .map(|raw| raw.indent())
            .unwrap_or("");

        let mut segments = Vec::new();
        for (index, raw) in body.iter().enumerate() {
            if index > 0 {
                push_literal(&mut segments, "\n");
            }
            if raw.is_blank() {
                continue;
            }
            let text = raw
                .text
                .strip_prefix(base)
                .unwrap_or_else(|| raw.text.trim_start());
            for segment in scan_interpolation(text, raw.number)? {
                match segment {
                    Segment::Literal(text) => push_literal(&mut segments, &text),
                    expr => segments.push(expr),
                }
            }
        }

        log::trace!("line {}: filter :{name} took {} lines", line.number, body.len());
        Ok(Node::Filter(Filter {
            name: name.to_string(),
            segments,
            line: line.number,
        }))
    }

    /// Consume the physical lines indented deeper than `indent`, blank
    /// lines included.
    fn take_block(&mut self, indent: &str) -> Vec<RawLine<'a>> {
        let mut lines = Vec::new();
        while let Some(raw) = self.scanner.peek_raw() {
            if !raw.is_blank() && raw.indent().len() <= indent.len() {
                break;
            }
            lines.push(raw);
            self.scanner.next_raw();
        }
        lines
    }
}

fn children_mut(node: &mut Node) -> Option<&mut Vec<Node>> {
    match node {
        Node::Element(el) => Some(&mut el.children),
        Node::Script(script) => Some(&mut script.children),
        Node::Silent(silent) => Some(&mut silent.children),
        Node::Comment(comment) => Some(&mut comment.children),
        Node::Text(_) | Node::Filter(_) | Node::Doctype(_) => None,
    }
}

fn check_nesting(parent: &Node, line: usize) -> Result<(), ParseError> {
    let message = match parent {
        Node::Element(el) if el.self_closing => {
            "Illegal nesting: nesting within a self-closing tag is illegal".to_string()
        }
        Node::Element(el) if !matches!(el.content, InlineContent::None) => format!(
            "Illegal nesting: content can't be both given on the same line as %{} and nested within it",
            el.tag
        ),
        Node::Comment(comment) if comment.text.is_some() => {
            "Illegal nesting: nesting within a comment that already has content is illegal".to_string()
        }
        Node::Text(_) => "Illegal nesting: nesting within plain text is illegal".to_string(),
        Node::Doctype(_) => "Illegal nesting: nesting within a header command is illegal".to_string(),
        Node::Filter(_) => "Illegal nesting: nesting within a filter is illegal".to_string(),
        _ => return Ok(()),
    };
    Err(ParseError::syntax(message, line))
}

fn script(payload: &str, escape: Escape, preserve: bool, line: usize) -> Result<Node, ParseError> {
    let code = payload.trim();
    if code.is_empty() {
        return Err(ParseError::syntax("There's no code to evaluate", line));
    }
    Ok(Node::Script(ScriptOutput {
        code: code.to_string(),
        escape,
        preserve,
        children: Vec::new(),
        line,
    }))
}

fn text(payload: &str, escape: Escape, line: usize) -> Result<Node, ParseError> {
    Ok(Node::Text(PlainText {
        segments: scan_interpolation(payload, line)?,
        escape,
        line,
    }))
}

fn comment(payload: &str, line: usize) -> Result<Node, ParseError> {
    let (condition, text) = match payload.strip_prefix('[') {
        Some(rest) => {
            let end = rest
                .find(']')
                .ok_or_else(|| ParseError::syntax("Unterminated conditional comment", line))?;
            (Some(rest[..end].trim().to_string()), rest[end + 1..].trim())
        }
        None => (None, payload.trim()),
    };

    Ok(Node::Comment(Comment {
        condition,
        text: (!text.is_empty()).then(|| text.to_string()),
        children: Vec::new(),
        line,
    }))
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Literal(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Literal(text.to_string()));
    }
}
