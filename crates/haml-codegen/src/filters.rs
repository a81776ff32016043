//! Filter registry.
//!
//! The built-in registry is created once and shared read-only. Callers
//! wanting extra filters build their own registry on top of it and hand it
//! to the compiler and renderer.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::options::{Format, Options};
use crate::value::{escape_html, preserve};

/// Filter failure, reported with the filter name by the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FilterError {
    pub message: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A named transform over a filter block's text.
pub trait Filter: Send + Sync {
    fn apply(&self, text: &str, options: &Options) -> Result<String, FilterError>;
}

impl<F> Filter for F
where
    F: Fn(&str, &Options) -> Result<String, FilterError> + Send + Sync,
{
    fn apply(&self, text: &str, options: &Options) -> Result<String, FilterError> {
        self(text, options)
    }
}

/// Name to filter map.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

static BUILTIN: LazyLock<Arc<FilterRegistry>> =
    LazyLock::new(|| Arc::new(FilterRegistry::with_builtins()));

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh registry holding the built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("plain", plain);
        registry.register("escaped", escaped);
        registry.register("preserve", preserved);
        registry.register("cdata", cdata);
        registry.register("javascript", javascript);
        registry.register("css", css);
        registry
    }

    /// The shared built-in registry.
    pub fn builtin() -> Arc<FilterRegistry> {
        Arc::clone(&BUILTIN)
    }

    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

// =========================================================================
// Built-ins
// =========================================================================

fn plain(text: &str, _: &Options) -> Result<String, FilterError> {
    Ok(text.to_string())
}

fn escaped(text: &str, _: &Options) -> Result<String, FilterError> {
    Ok(escape_html(text).into_owned())
}

fn preserved(text: &str, _: &Options) -> Result<String, FilterError> {
    Ok(preserve(text).into_owned())
}

fn cdata(text: &str, _: &Options) -> Result<String, FilterError> {
    Ok(format!("<![CDATA[\n{}\n]]>", indent(text, 1)))
}

fn javascript(text: &str, options: &Options) -> Result<String, FilterError> {
    let q = options.attr_wrapper;
    Ok(match options.format {
        Format::Xhtml => format!(
            "<script type={q}text/javascript{q}>\n  //<![CDATA[\n{}\n  //]]>\n</script>",
            indent(text, 2)
        ),
        Format::Html4 => format!(
            "<script type={q}text/javascript{q}>\n{}\n</script>",
            indent(text, 1)
        ),
        Format::Html5 => format!("<script>\n{}\n</script>", indent(text, 1)),
    })
}

fn css(text: &str, options: &Options) -> Result<String, FilterError> {
    let q = options.attr_wrapper;
    Ok(match options.format {
        Format::Xhtml => format!(
            "<style type={q}text/css{q}>\n  /*<![CDATA[*/\n{}\n  /*]]>*/\n</style>",
            indent(text, 2)
        ),
        Format::Html4 => format!("<style type={q}text/css{q}>\n{}\n</style>", indent(text, 1)),
        Format::Html5 => format!("<style>\n{}\n</style>", indent(text, 1)),
    })
}

/// Indent every non-empty line by `levels` two-space steps.
fn indent(text: &str, levels: usize) -> String {
    let pad = "  ".repeat(levels);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
