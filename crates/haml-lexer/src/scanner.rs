use std::iter::{Enumerate, Peekable};
use std::str::Lines;

use crate::line::{Line, RawLine};
use crate::{LexErrorKind, LexerError};

/// Haml line scanner.
///
/// Lazily yields logical lines from source text. Blank lines are skipped,
/// since they never affect structure, and lines ending in ` |` are joined
/// with their continuation lines into one logical line.
///
/// Consumers that need physical lines verbatim (filter bodies, attribute
/// hashes spanning several lines) pull them with [`Scanner::next_raw`]
/// between calls to `next`.
pub struct Scanner<'a> {
    lines: Peekable<Enumerate<Lines<'a>>>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().enumerate().peekable(),
        }
    }

    /// Scan the whole source into logical lines.
    pub fn scan(source: &str) -> Result<Vec<Line>, LexerError> {
        Scanner::new(source).collect()
    }

    /// Look at the next physical line without consuming it.
    pub fn peek_raw(&mut self) -> Option<RawLine<'a>> {
        self.lines
            .peek()
            .map(|&(index, text)| RawLine { number: index + 1, text })
    }

    /// Consume the next physical line verbatim.
    pub fn next_raw(&mut self) -> Option<RawLine<'a>> {
        self.lines
            .next()
            .map(|(index, text)| RawLine { number: index + 1, text })
    }

    fn next_logical(&mut self) -> Option<Result<Line, LexerError>> {
        let raw = loop {
            let raw = self.next_raw()?;
            if !raw.is_blank() {
                break raw;
            }
        };

        let indent = raw.indent();
        let text = raw.text[indent.len()..].trim_end();
        let mut line = Line::new(raw.number, indent, text);

        if is_multiline(text) {
            if let Err(err) = self.join_continuation(&mut line) {
                return Some(Err(err));
            }
        }

        log::trace!("line {}: {:?}", line.number, line.text);
        Some(Ok(line))
    }

    /// Whether any non-blank physical line is left.
    fn has_content_ahead(&self) -> bool {
        self.lines.clone().any(|(_, text)| !text.trim().is_empty())
    }

    /// Join every following line that carries the ` |` marker.
    /// The group ends at the first line without it, which is left for the
    /// next call. Running out of input mid-group is an error, even when
    /// only blank lines remain.
    fn join_continuation(&mut self, line: &mut Line) -> Result<(), LexerError> {
        let mut joined = strip_marker(&line.text).to_string();
        let number = line.number;
        let unterminated = || LexerError::new(LexErrorKind::UnterminatedMultiline, number);

        loop {
            let Some(next) = self.peek_raw() else {
                return Err(unterminated());
            };
            if next.is_blank() && !self.has_content_ahead() {
                return Err(unterminated());
            }
            let text = next.text.trim();
            if !is_multiline(text) {
                break;
            }
            self.next_raw();
            joined.push(' ');
            joined.push_str(strip_marker(text));
            line.last = next.number;
        }

        line.text = joined;
        Ok(())
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Line, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_logical()
    }
}

/// Whether a line ends with the multiline marker: whitespace then `|`.
///
/// Block arguments such as `- items.each do |item|` end in `|` too and are
/// excluded.
pub fn is_multiline(text: &str) -> bool {
    let text = text.trim_end();
    if text.len() < 2 || !text.ends_with('|') {
        return false;
    }
    let body = &text[..text.len() - 1];
    if !body.ends_with([' ', '\t']) {
        return false;
    }
    !is_block_with_spaces(body)
}

fn is_block_with_spaces(body: &str) -> bool {
    match body.rfind("do") {
        Some(pos) => {
            let after = body[pos + 2..].trim_start();
            after.starts_with('|') && !after[1..].contains('|')
        }
        None => false,
    }
}

fn strip_marker(text: &str) -> &str {
    text.trim_end().trim_end_matches('|').trim()
}

/// Indentation tracker.
///
/// The first indented line fixes the indentation unit; every later line must
/// use the same character and a whole multiple of the unit's width.
#[derive(Debug, Default, Clone)]
pub struct Indentation {
    unit: Option<(char, usize)>,
}

impl Indentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Width of the indentation unit, once known.
    pub fn unit_width(&self) -> Option<usize> {
        self.unit.map(|(_, width)| width)
    }

    /// Compute the nesting depth of a logical line.
    pub fn depth(&mut self, line: &Line) -> Result<usize, LexerError> {
        self.depth_of(&line.indent, line.number)
    }

    /// Compute the nesting depth of a leading-whitespace string.
    pub fn depth_of(&mut self, indent: &str, number: usize) -> Result<usize, LexerError> {
        if indent.is_empty() {
            return Ok(0);
        }

        let mut chars = indent.chars();
        let first = chars.next().unwrap_or(' ');
        if chars.any(|c| c != first) {
            return Err(LexerError::new(LexErrorKind::MixedIndentation, number));
        }
        let width = indent.chars().count();

        match self.unit {
            None => {
                self.unit = Some((first, width));
                log::debug!("indentation unit is {width} x {first:?}");
                Ok(1)
            }
            Some((unit_char, _)) if unit_char != first => {
                Err(LexerError::new(LexErrorKind::MixedIndentation, number))
            }
            Some((_, unit)) if width % unit != 0 => Err(LexerError::new(
                LexErrorKind::InconsistentIndentation { unit, found: width },
                number,
            )),
            Some((_, unit)) => Ok(width / unit),
        }
    }
}
