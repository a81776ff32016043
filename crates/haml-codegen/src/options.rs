//! Compiler options and output format.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output format. Governs self-close syntax, boolean attributes and the
/// doctype table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Xhtml,
    Html4,
    Html5,
}

impl Format {
    pub fn is_html(self) -> bool {
        !matches!(self, Format::Xhtml)
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xhtml" => Ok(Format::Xhtml),
            "html4" => Ok(Format::Html4),
            "html5" => Ok(Format::Html5),
            other => Err(format!("unknown format `{other}`, expected xhtml, html4 or html5")),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Xhtml => "xhtml",
            Format::Html4 => "html4",
            Format::Html5 => "html5",
        })
    }
}

/// Compiler configuration.
///
/// Deserializes from the camelCase JSON form, with every key optional:
///
/// ```json
/// { "format": "html5", "escapeHtml": true, "attrWrapper": "\"" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub format: Format,
    /// Escape `=` output unless the script says otherwise.
    pub escape_html: bool,
    /// Compile every expression away.
    pub suppress_eval: bool,
    /// Quote character around attribute values.
    pub attr_wrapper: char,
    /// Tags that close themselves when empty.
    pub autoclose: BTreeSet<String>,
    /// Tags whose content keeps its whitespace.
    pub preserve: BTreeSet<String>,
}

const DEFAULT_AUTOCLOSE: &[&str] = &[
    "meta", "img", "link", "br", "hr", "input", "area", "param", "col", "base",
];

const DEFAULT_PRESERVE: &[&str] = &["textarea", "pre"];

impl Default for Options {
    fn default() -> Self {
        Self {
            format: Format::Xhtml,
            escape_html: false,
            suppress_eval: false,
            attr_wrapper: '\'',
            autoclose: DEFAULT_AUTOCLOSE.iter().map(|s| s.to_string()).collect(),
            preserve: DEFAULT_PRESERVE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Options {
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn is_autoclose(&self, tag: &str) -> bool {
        self.autoclose.contains(tag)
    }

    pub fn is_preserve(&self, tag: &str) -> bool {
        self.preserve.contains(tag)
    }

    /// Stable hash of every option, used as part of the program cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.format, Format::Xhtml);
        assert!(!options.escape_html);
        assert!(!options.suppress_eval);
        assert_eq!(options.attr_wrapper, '\'');
        assert!(options.is_autoclose("br"));
        assert!(options.is_autoclose("meta"));
        assert!(!options.is_autoclose("div"));
        assert!(options.is_preserve("pre"));
        assert!(options.is_preserve("textarea"));
    }

    #[test]
    fn test_deserialize_camel_case_partial() {
        let options: Options =
            serde_json::from_str(r#"{"format": "html5", "escapeHtml": true, "attrWrapper": "\""}"#).unwrap();
        assert_eq!(options.format, Format::Html5);
        assert!(options.escape_html);
        assert_eq!(options.attr_wrapper, '"');
        assert!(options.is_autoclose("img"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("HTML5".parse::<Format>(), Ok(Format::Html5));
        assert_eq!("xhtml".parse::<Format>(), Ok(Format::Xhtml));
        assert!("html3".parse::<Format>().is_err());
        assert!(Format::Html4.is_html());
        assert!(!Format::Xhtml.is_html());
    }

    #[test]
    fn test_fingerprint_tracks_every_option() {
        let base = Options::default();
        assert_eq!(base.fingerprint(), Options::default().fingerprint());

        let html5 = Options::default().with_format(Format::Html5);
        assert_ne!(base.fingerprint(), html5.fingerprint());

        let mut more_autoclose = Options::default();
        more_autoclose.autoclose.insert("source".into());
        assert_ne!(base.fingerprint(), more_autoclose.fingerprint());
    }
}
