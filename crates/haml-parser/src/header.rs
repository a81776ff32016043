//! Tag header parsing.
//!
//! ```text
//! %tag.class#id{hash}(html attrs)[object, prefix]<>/ content
//! ```
//!
//! Order is fixed: tag name, shorthand, attribute groups, object
//! reference, whitespace flags, self-close, content.

use haml_lexer::line::is_name_char;
use haml_lexer::{contains_interpolation, scan_interpolation, Segment};

use crate::ast::{AttributeSource, Escape, Literal, ObjectRef, RefPrefix};
use crate::ParseError;

/// Everything a tag header declares.
#[derive(Debug, Clone, PartialEq)]
pub struct TagHeader {
    pub tag: String,
    pub classes: Vec<String>,
    pub id: Option<String>,
    pub attributes: Vec<AttributeSource>,
    pub object_ref: Option<ObjectRef>,
    pub nuke_outer: bool,
    pub nuke_inner: bool,
    pub self_closing: bool,
    pub tail: Tail,
}

/// What follows the header on the same line.
#[derive(Debug, Clone, PartialEq)]
pub enum Tail {
    None,
    Text(String),
    Script {
        code: String,
        escape: Escape,
        preserve: bool,
    },
}

/// Header parse failure.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderError {
    /// A `{`, `(` or `[` group runs past the end of the input. The caller
    /// may append the next physical line and retry.
    Unclosed,
    Invalid(ParseError),
}

impl From<ParseError> for HeaderError {
    fn from(err: ParseError) -> Self {
        HeaderError::Invalid(err)
    }
}

/// Parse a tag header. `input` starts right after `%`, or at the first `.`
/// or `#` for an implicit `div`.
pub fn parse_header(input: &str, implicit_div: bool, line: usize) -> Result<TagHeader, HeaderError> {
    HeaderParser {
        chars: input.chars().collect(),
        pos: 0,
        line,
    }
    .parse(implicit_div)
}

struct HeaderParser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl HeaderParser {
    fn parse(mut self, implicit_div: bool) -> Result<TagHeader, HeaderError> {
        // Stage 1: tag name
        let tag = if implicit_div {
            "div".to_string()
        } else {
            let name = self.take_while(|c| is_name_char(c) || c == ':');
            if name.is_empty() {
                return Err(self.error("Invalid tag: a tag name must follow `%`").into());
            }
            name
        };

        // Stage 2: `.class` / `#id` shorthand
        let mut classes = Vec::new();
        let mut id = None;
        while let Some(prefix @ ('.' | '#')) = self.peek() {
            self.pos += 1;
            let name = self.take_while(is_name_char);
            if name.is_empty() {
                return Err(self
                    .error("Illegal element: classes and ids must have values")
                    .into());
            }
            if prefix == '.' {
                classes.push(name);
            } else {
                id = Some(name);
            }
        }

        // Stage 3: attribute groups, then the object reference
        let mut attributes = Vec::new();
        let mut object_ref = None;
        let mut seen_hash = false;
        let mut seen_html = false;
        while let Some(open @ ('{' | '(' | '[')) = self.peek() {
            let body = self.group()?;
            match open {
                '{' | '(' if object_ref.is_some() => {
                    return Err(self
                        .error("Attribute expressions must come before the object reference")
                        .into());
                }
                '{' if seen_hash => {
                    return Err(self.error("Duplicate attribute hash").into());
                }
                '(' if seen_html => {
                    return Err(self.error("Duplicate HTML-style attribute list").into());
                }
                '{' => {
                    seen_hash = true;
                    attributes.extend(parse_hash(&body, self.line)?);
                }
                '(' => {
                    seen_html = true;
                    attributes.extend(parse_html_attributes(&body, self.line)?);
                }
                _ => {
                    if object_ref.is_some() {
                        return Err(self.error("Duplicate object reference").into());
                    }
                    object_ref = Some(parse_object_ref(&body, self.line)?);
                }
            }
        }

        // Stage 4: whitespace flags and self-close
        let mut nuke_outer = false;
        let mut nuke_inner = false;
        while let Some(flag @ ('<' | '>')) = self.peek() {
            self.pos += 1;
            if flag == '<' {
                nuke_inner = true;
            } else {
                nuke_outer = true;
            }
        }
        let self_closing = self.peek() == Some('/');
        if self_closing {
            self.pos += 1;
        }

        if let Some('.' | '#' | '{' | '(' | '[') = self.peek() {
            if nuke_outer || nuke_inner || self_closing {
                return Err(self
                    .error("Illegal element: classes, ids and attributes must come before `<`, `>` and `/`")
                    .into());
            }
            return Err(self.error("Illegal element: unexpected attribute group").into());
        }

        // Stage 5: content
        let tail = self.tail()?;
        if self_closing && tail != Tail::None {
            return Err(self.error("Self-closing tags can't have content").into());
        }

        Ok(TagHeader {
            tag,
            classes,
            id,
            attributes,
            object_ref,
            nuke_outer,
            nuke_inner,
            self_closing,
            tail,
        })
    }

    fn tail(&mut self) -> Result<Tail, ParseError> {
        let rest: String = self.chars[self.pos..].iter().collect();
        let script = |code: &str, escape, preserve| {
            let code = code.trim();
            if code.is_empty() {
                Err(self.error("There's no code to evaluate"))
            } else {
                Ok(Tail::Script {
                    code: code.to_string(),
                    escape,
                    preserve,
                })
            }
        };

        if rest.is_empty() {
            Ok(Tail::None)
        } else if let Some(code) = rest.strip_prefix("&=") {
            script(code, Escape::Force, false)
        } else if let Some(code) = rest.strip_prefix("!=") {
            script(code, Escape::Raw, false)
        } else if let Some(code) = rest.strip_prefix('=') {
            script(code, Escape::Default, false)
        } else if let Some(code) = rest.strip_prefix('~') {
            script(code, Escape::Default, true)
        } else if rest.starts_with([' ', '\t']) {
            let text = rest.trim();
            Ok(if text.is_empty() {
                Tail::None
            } else {
                Tail::Text(text.to_string())
            })
        } else {
            Err(self.error(format!("Illegal element: unexpected `{rest}` after tag header")))
        }
    }

    /// Consume a bracketed group and return its body.
    fn group(&mut self) -> Result<String, HeaderError> {
        let end = group_end(&self.chars, self.pos).ok_or(HeaderError::Unclosed)?;
        let body = self.chars[self.pos + 1..end].iter().collect();
        self.pos = end + 1;
        Ok(body)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(message, self.line)
    }
}

/// Index of the bracket closing the one at `start`, skipping quoted strings.
fn group_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut pos = start;

    while pos < chars.len() {
        let c = chars[pos];
        match quote {
            Some(q) => {
                if c == '\\' {
                    pos += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(pos);
                    }
                }
                _ => {}
            },
        }
        pos += 1;
    }

    None
}

/// Split on `sep` outside quotes and brackets.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (index, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

// =========================================================================
// `{...}` attribute hashes
// =========================================================================

/// Parse the body of an attribute hash.
///
/// Entries with literal keys become per-key sources, folded to
/// [`AttributeSource::Static`] when the value is a literal too. If any key
/// is not a literal the whole hash is kept as one expression.
fn parse_hash(body: &str, line: usize) -> Result<Vec<AttributeSource>, ParseError> {
    let mut sources = Vec::new();

    for entry in split_top_level(body, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((name, value)) = split_entry(entry) else {
            log::debug!("line {line}: attribute hash kept dynamic");
            return Ok(vec![AttributeSource::Hash {
                code: format!("{{{body}}}"),
            }]);
        };
        sources.push(value_source(name, value, line)?);
    }

    Ok(sources)
}

/// Split `key => value` or `key: value` into a literal key and value text.
fn split_entry(entry: &str) -> Option<(String, &str)> {
    if let Some(rest) = entry.strip_prefix(':') {
        let (key, rest) = if rest.starts_with(['"', '\'']) {
            quoted_prefix(rest)?
        } else {
            let len = rest
                .find(|c: char| !is_name_char(c))
                .unwrap_or(rest.len());
            if len == 0 {
                return None;
            }
            (rest[..len].to_string(), &rest[len..])
        };
        let value = rest.trim_start().strip_prefix("=>")?;
        return Some((key, value.trim()));
    }

    if entry.starts_with(['"', '\'']) {
        let (key, rest) = quoted_prefix(entry)?;
        let rest = rest.trim_start();
        let value = rest
            .strip_prefix("=>")
            .or_else(|| rest.strip_prefix(':'))?;
        return Some((key, value.trim()));
    }

    let len = entry.find(|c: char| !is_name_char(c))?;
    let (key, rest) = entry.split_at(len);
    if key.is_empty() || rest.starts_with("::") {
        return None;
    }
    let value = rest.strip_prefix(':')?;
    Some((key.to_string(), value.trim()))
}

/// Read a quoted string at the start of `text` and return its unescaped
/// content and the rest of the text.
fn quoted_prefix(text: &str) -> Option<(String, &str)> {
    let quote = text.chars().next()?;
    let mut escaped = false;
    for (index, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some((unescape(&text[1..index], quote), &text[index + 1..]));
        }
    }
    None
}

fn unescape(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('\\') => out.push('\\'),
            Some(q) if q == quote => out.push(q),
            Some('n') if quote == '"' => out.push('\n'),
            Some('t') if quote == '"' => out.push('\t'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

/// Turn a value's source text into an attribute source.
fn value_source(name: String, value: &str, line: usize) -> Result<AttributeSource, ParseError> {
    if value.is_empty() {
        return Err(ParseError::syntax(
            format!("Attribute `{name}` has no value"),
            line,
        ));
    }

    if let Some(quote @ ('"' | '\'')) = value.chars().next() {
        if let Some((text, rest)) = quoted_prefix(value) {
            if rest.trim().is_empty() {
                let inner = &value[1..value.len() - 1];
                if contains_interpolation(inner) {
                    let segments = scan_interpolation(inner, line)?
                        .into_iter()
                        .map(|segment| match segment {
                            Segment::Literal(text) => Segment::Literal(unescape(&text, quote)),
                            expr => expr,
                        })
                        .collect();
                    return Ok(AttributeSource::Interpolated { name, segments });
                }
                return Ok(AttributeSource::Static {
                    name,
                    value: Literal::Str(text),
                });
            }
        }
    }

    let literal = match value {
        "true" => Some(Literal::Bool(true)),
        "false" => Some(Literal::Bool(false)),
        "nil" => Some(Literal::Nil),
        _ if is_number(value) => Some(Literal::Number(value.to_string())),
        _ => None,
    };

    Ok(match literal {
        Some(value) => AttributeSource::Static { name, value },
        None => AttributeSource::Dynamic {
            name,
            code: value.to_string(),
        },
    })
}

fn is_number(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty()
        && digits.chars().next().is_some_and(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '_')
        && digits.matches('.').count() <= 1
        && !digits.ends_with('.')
}

// =========================================================================
// `(...)` HTML-style attributes
// =========================================================================

fn parse_html_attributes(body: &str, line: usize) -> Result<Vec<AttributeSource>, ParseError> {
    let chars: Vec<char> = body.chars().collect();
    let mut pos = 0;
    let mut sources = Vec::new();

    loop {
        while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }

        let start = pos;
        while chars.get(pos).is_some_and(|&c| is_name_char(c) || c == ':') {
            pos += 1;
        }
        if start == pos {
            return Err(ParseError::syntax(
                format!("Invalid attribute list: unexpected `{}`", chars[pos]),
                line,
            ));
        }
        let name: String = chars[start..pos].iter().collect();

        let mut look = pos;
        while chars.get(look).is_some_and(|c| c.is_whitespace()) {
            look += 1;
        }
        if chars.get(look) != Some(&'=') {
            sources.push(AttributeSource::Static {
                name,
                value: Literal::Bool(true),
            });
            continue;
        }
        pos = look + 1;
        while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
            pos += 1;
        }

        let value_start = pos;
        match chars.get(pos) {
            Some('"' | '\'') => {
                let quote = chars[pos];
                pos += 1;
                while pos < chars.len() && chars[pos] != quote {
                    if chars[pos] == '\\' {
                        pos += 1;
                    }
                    pos += 1;
                }
                if pos >= chars.len() {
                    return Err(ParseError::syntax(
                        format!("Unterminated value for attribute `{name}`"),
                        line,
                    ));
                }
                pos += 1;
            }
            Some(_) => {
                while chars.get(pos).is_some_and(|c| !c.is_whitespace()) {
                    pos += 1;
                }
            }
            None => {
                return Err(ParseError::syntax(
                    format!("Attribute `{name}` has no value"),
                    line,
                ));
            }
        }
        let value: String = chars[value_start..pos].iter().collect();
        sources.push(value_source(name, &value, line)?);
    }

    Ok(sources)
}

// =========================================================================
// `[...]` object references
// =========================================================================

fn parse_object_ref(body: &str, line: usize) -> Result<ObjectRef, ParseError> {
    let parts = split_top_level(body, ',');
    let code = parts[0].trim();
    if code.is_empty() || parts.len() > 2 {
        return Err(ParseError::syntax(
            "Object reference takes an object and an optional prefix",
            line,
        ));
    }

    let prefix = parts.get(1).map(|prefix| {
        let prefix = prefix.trim();
        if let Some(symbol) = prefix.strip_prefix(':').filter(|s| s.chars().all(is_name_char)) {
            RefPrefix::Literal(symbol.to_string())
        } else if let Some((text, _)) = quoted_prefix(prefix).filter(|(_, rest)| rest.is_empty()) {
            RefPrefix::Literal(text)
        } else {
            RefPrefix::Code(prefix.to_string())
        }
    });

    Ok(ObjectRef {
        code: code.to_string(),
        prefix,
    })
}
