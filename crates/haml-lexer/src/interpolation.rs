//! `#{...}` interpolation scanning.
//!
//! Used for plain text, inline element text, quoted attribute values and
//! filter bodies. Doctype arguments are never scanned.

use crate::{LexErrorKind, LexerError};

/// A piece of scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text emitted as-is.
    Literal(String),
    /// Expression source evaluated at render time.
    Expression(String),
}

impl Segment {
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// Quick check for an interpolation opener anywhere in `text`.
pub fn contains_interpolation(text: &str) -> bool {
    text.contains("#{")
}

/// Concatenate the segments if none of them is an expression.
pub fn literal_text(segments: &[Segment]) -> Option<String> {
    segments.iter().try_fold(String::new(), |mut acc, segment| match segment {
        Segment::Literal(text) => {
            acc.push_str(text);
            Some(acc)
        }
        Segment::Expression(_) => None,
    })
}

/// Split `text` into literal and expression segments.
///
/// Backslashes directly before `#{` are counted: an even run halves and
/// opens an expression, an odd run halves (rounding down) and leaves `#{`
/// as literal text. Backslashes anywhere else are kept verbatim.
pub fn scan_interpolation(text: &str, line: usize) -> Result<Vec<Segment>, LexerError> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;

    while pos < chars.len() {
        if chars[pos] == '#' && chars.get(pos + 1) == Some(&'{') {
            let escapes = literal.chars().rev().take_while(|c| *c == '\\').count();
            literal.truncate(literal.len() - escapes);
            literal.extend(std::iter::repeat('\\').take(escapes / 2));

            if escapes % 2 == 1 {
                literal.push_str("#{");
                pos += 2;
                continue;
            }

            let (code, next) = closing_brace(&chars, pos + 2).ok_or_else(|| {
                LexerError::new(LexErrorKind::UnterminatedInterpolation, line)
            })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Expression(code.trim().to_string()));
            pos = next;
            continue;
        }

        literal.push(chars[pos]);
        pos += 1;
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Find the `}` closing an expression that starts at `start`, skipping
/// nested braces and quoted strings. Returns the expression text and the
/// position after the brace.
fn closing_brace(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut depth = 1;
    let mut pos = start;
    let mut quote: Option<char> = None;

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
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let code = chars[start..pos].iter().collect();
                        return Some((code, pos + 1));
                    }
                }
                _ => {}
            },
        }
        pos += 1;
    }

    None
}
