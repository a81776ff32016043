/// A physical source line, as handed to filter bodies and attribute
/// continuations that must see the text untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// 1-based line number.
    pub number: usize,
    pub text: &'a str,
}

impl<'a> RawLine<'a> {
    /// Leading whitespace of the line.
    pub fn indent(&self) -> &'a str {
        let trimmed = self.text.trim_start_matches([' ', '\t']);
        &self.text[..self.text.len() - trimmed.len()]
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Leading-character classification of a logical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `%tag`
    Element,
    /// `.class` or `#id` without a tag name.
    Div,
    /// `= expr`
    Script,
    /// `&= expr`
    EscapedScript,
    /// `!= expr`
    UnescapedScript,
    /// `~ expr`
    PreservedScript,
    /// `& text`, interpolated values are escaped.
    EscapedText,
    /// `! text`, interpolated values are left raw.
    UnescapedText,
    /// `- statement`
    Silent,
    /// `-# comment`
    SilentComment,
    /// `/ comment` or `/[condition]`
    Comment,
    /// `!!! args`
    Doctype,
    /// `:name`
    Filter,
    /// Anything else, including lines forced literal with `\`.
    Plain,
}

/// A logical line: one physical line, or several joined by `|` continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// First physical line of this logical line (1-based).
    pub number: usize,
    /// Last physical line consumed, equal to `number` unless continued.
    pub last: usize,
    /// Leading whitespace of the first physical line.
    pub indent: String,
    /// Content after the indentation with trailing whitespace removed.
    pub text: String,
}

impl Line {
    pub fn new(number: usize, indent: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            number,
            last: number,
            indent: indent.into(),
            text: text.into(),
        }
    }

    /// Classify the line by its leading marker and return the payload after it.
    ///
    /// A leading `\` forces the rest of the line to plain text. When the
    /// escaped text itself starts with `#{`, the backslash is kept so the
    /// interpolation scanner reads the sequence as literal.
    pub fn marker(&self) -> (Marker, &str) {
        let text = self.text.as_str();
        let mut chars = text.chars();
        let first = chars.next();
        let second = chars.next();

        match (first, second) {
            (Some('\\'), _) => {
                let rest = &text[1..];
                if rest.starts_with("#{") {
                    (Marker::Plain, text)
                } else {
                    (Marker::Plain, rest)
                }
            }
            (Some('%'), _) => (Marker::Element, &text[1..]),
            (Some('.'), Some(c)) if is_name_char(c) => (Marker::Div, text),
            (Some('#'), Some(c)) if is_name_char(c) => (Marker::Div, text),
            (Some('='), _) => (Marker::Script, &text[1..]),
            (Some('~'), _) => (Marker::PreservedScript, &text[1..]),
            (Some('&'), Some('=')) => (Marker::EscapedScript, &text[2..]),
            (Some('&'), Some(' ')) => (Marker::EscapedText, &text[2..]),
            (Some('!'), _) if text.starts_with("!!!") => (Marker::Doctype, &text[3..]),
            (Some('!'), Some('=')) => (Marker::UnescapedScript, &text[2..]),
            (Some('!'), Some(' ')) => (Marker::UnescapedText, &text[2..]),
            (Some('-'), Some('#')) => (Marker::SilentComment, &text[2..]),
            (Some('-'), _) => (Marker::Silent, &text[1..]),
            (Some('/'), _) => (Marker::Comment, &text[1..]),
            (Some(':'), Some(c)) if c.is_alphabetic() => (Marker::Filter, &text[1..]),
            _ => (Marker::Plain, text),
        }
    }
}

/// Characters allowed in tag names, classes and ids.
pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
