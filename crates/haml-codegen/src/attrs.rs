//! Attribute resolution.
//!
//! At compile time an element's shorthand, object reference and attribute
//! sources become an [`Attributes`] structure: a pre-folded
//! [`AttributeBag`] plus the ordered parts that still need the evaluator.
//! At render time the parts are applied on top of a copy of the bag.
//!
//! Merge rules: `class` values are unioned (first occurrence wins the
//! position), `id` values are joined with `_`, every other key is replaced
//! by later writes. A `data` map expands to `data-*` attributes.

use haml_lexer::Segment;
use haml_parser::ast::{AttributeSource, Element, Literal, RefPrefix};
use indexmap::IndexMap;

use crate::options::{Format, Options};
use crate::value::{escape_html, Describable, Value};

/// Ordered attribute set with the class/id merge policy applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    classes: Vec<String>,
    ids: Vec<String>,
    entries: IndexMap<String, Value>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.ids.is_empty() && self.entries.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// The joined id, if any part contributed one.
    pub fn id(&self) -> Option<String> {
        (!self.ids.is_empty()).then(|| self.ids.join("_"))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Add whitespace-separated class names, skipping duplicates.
    pub fn add_class(&mut self, classes: &str) {
        for class in classes.split_whitespace() {
            if !self.classes.iter().any(|c| c == class) {
                self.classes.push(class.to_string());
            }
        }
    }

    pub fn add_id(&mut self, id: &str) {
        if !id.is_empty() {
            self.ids.push(id.to_string());
        }
    }

    /// Write one attribute.
    pub fn set(&mut self, name: &str, value: Value) {
        match (name, value) {
            ("class", value) => self.add_class_value(value),
            ("id", value) => self.add_id_value(value),
            ("data", Value::Map(map)) => self.expand_data("data", map),
            (name, value) => {
                self.entries.insert(name.to_string(), value);
            }
        }
    }

    /// Write every entry of an evaluated attribute hash, in order.
    pub fn merge(&mut self, map: IndexMap<String, Value>) {
        for (name, value) in map {
            self.set(&name, value);
        }
    }

    /// Add the class and id derived from an object reference:
    /// `prefix_type` and `prefix_type_identity`. A missing identity leaves
    /// the suffix empty, so the id ends in `_`.
    pub fn add_object(&mut self, object: &dyn Describable, prefix: Option<&str>) {
        let mut name = normalize_type_name(&object.type_name());
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            name = format!("{prefix}_{name}");
        }

        let token = object.identity_token().unwrap_or_default();
        let id = format!("{name}_{token}");
        self.add_class(&name);
        self.add_id(&id);
    }

    fn add_class_value(&mut self, value: Value) {
        match value {
            Value::Nil | Value::Bool(false) => {}
            Value::List(items) => {
                for item in items {
                    self.add_class_value(item);
                }
            }
            other => self.add_class(&other.to_string()),
        }
    }

    fn add_id_value(&mut self, value: Value) {
        match value {
            Value::Nil | Value::Bool(false) => {}
            Value::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter(|item| item.is_truthy())
                    .map(Value::to_string)
                    .collect();
                self.add_id(&parts.join("_"));
            }
            other => self.add_id(&other.to_string()),
        }
    }

    fn expand_data(&mut self, prefix: &str, map: IndexMap<String, Value>) {
        for (key, value) in map {
            let name = format!("{prefix}-{}", key.replace('_', "-"));
            match value {
                Value::Map(nested) => self.expand_data(&name, nested),
                value => {
                    self.entries.insert(name, value);
                }
            }
        }
    }

    /// Render as ` name='value'` pairs sorted by name. `true` renders the
    /// attribute's own name in XHTML and a bare name in HTML; `false` and
    /// `nil` drop the attribute.
    pub fn render(&self, options: &Options) -> String {
        let mut pairs: Vec<(&str, Value)> = Vec::new();
        if !self.classes.is_empty() {
            pairs.push(("class", Value::Str(self.classes.join(" "))));
        }
        if let Some(id) = self.id() {
            pairs.push(("id", Value::Str(id)));
        }
        for (name, value) in &self.entries {
            pairs.push((name.as_str(), value.clone()));
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let quote = options.attr_wrapper;
        let mut out = String::new();
        for (name, value) in pairs {
            match value {
                Value::Nil | Value::Bool(false) => {}
                Value::Bool(true) if options.format.is_html() => {
                    out.push(' ');
                    out.push_str(name);
                }
                Value::Bool(true) => {
                    out.push_str(&format!(" {name}={quote}{name}{quote}"));
                }
                value => {
                    let text = value.to_string();
                    out.push_str(&format!(" {name}={quote}{}{quote}", escape_html(&text)));
                }
            }
        }
        out
    }
}

/// `BlogPost` becomes `blog_post`, `Admin::User` becomes `admin_user`.
pub fn normalize_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
        prev = Some(c);
    }
    out.trim_end_matches('_').to_string()
}

// =========================================================================
// Compile-time structure
// =========================================================================

/// One attribute contribution left for render time, applied in order.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributePart {
    /// `[object, prefix]`
    Object {
        code: String,
        prefix: Option<RefPrefix>,
    },
    /// A literal that follows a dynamic part and so can't be folded.
    Literal { name: String, value: Value },
    Interpolated { name: String, segments: Vec<Segment> },
    Expr { name: String, code: String },
    /// Whole attribute hash; must evaluate to a map.
    Hash { code: String },
}

/// Resolved attribute structure of one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    /// Everything known at compile time.
    pub base: AttributeBag,
    /// Render-time contributions, applied after `base` in order.
    pub parts: Vec<AttributePart>,
}

impl Attributes {
    /// Resolve an element's attribute structure. Literal sources are folded
    /// into `base` until the first part that needs the evaluator; after it
    /// they keep their place in `parts` so merge order is unchanged.
    /// With `suppress_eval`, dynamic parts are dropped.
    pub fn resolve(element: &Element, suppress_eval: bool) -> Self {
        let mut base = AttributeBag::new();
        for class in &element.classes {
            base.add_class(class);
        }
        if let Some(id) = &element.id {
            base.add_id(id);
        }

        let mut parts = Vec::new();
        if let Some(object) = element.object_ref.as_ref().filter(|_| !suppress_eval) {
            parts.push(AttributePart::Object {
                code: object.code.clone(),
                prefix: object.prefix.clone(),
            });
        }

        for source in &element.attributes {
            let part = match source {
                AttributeSource::Static { name, value } => AttributePart::Literal {
                    name: name.clone(),
                    value: literal_value(value),
                },
                AttributeSource::Interpolated { name, segments } if suppress_eval => {
                    AttributePart::Literal {
                        name: name.clone(),
                        value: Value::Str(literal_segments(segments)),
                    }
                }
                AttributeSource::Interpolated { name, segments } => AttributePart::Interpolated {
                    name: name.clone(),
                    segments: segments.clone(),
                },
                AttributeSource::Dynamic { .. } | AttributeSource::Hash { .. } if suppress_eval => {
                    continue;
                }
                AttributeSource::Dynamic { name, code } => AttributePart::Expr {
                    name: name.clone(),
                    code: code.clone(),
                },
                AttributeSource::Hash { code } => AttributePart::Hash { code: code.clone() },
            };

            match part {
                AttributePart::Literal { name, value } if parts.is_empty() => base.set(&name, value),
                part => parts.push(part),
            }
        }

        Self { base, parts }
    }

    pub fn is_static(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Convert a parsed literal. Numbers that don't fit an integer or float
/// keep their spelling as a string.
pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Nil => Value::Nil,
        Literal::Number(n) => {
            let digits = n.replace('_', "");
            if let Ok(int) = digits.parse::<i64>() {
                Value::Int(int)
            } else if let Ok(float) = digits.parse::<f64>() {
                Value::Float(float)
            } else {
                Value::Str(n.clone())
            }
        }
    }
}

/// Concatenate the literal segments, dropping expressions.
fn literal_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Literal(text) => Some(text.as_str()),
            Segment::Expression(_) => None,
        })
        .collect()
}

/// Self-close syntax for the format.
pub fn self_close_suffix(format: Format) -> &'static str {
    if format.is_html() {
        ">"
    } else {
        " />"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haml_parser::ast::ObjectRef;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Record {
        type_name: &'static str,
        id: Option<&'static str>,
    }

    impl Describable for Record {
        fn type_name(&self) -> String {
            self.type_name.into()
        }

        fn identity_token(&self) -> Option<String> {
            self.id.map(String::from)
        }
    }

    fn map(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn html5() -> Options {
        Options::default().with_format(Format::Html5)
    }

    // =========================================================================
    // Bag merge policy
    // =========================================================================

    #[test]
    fn test_class_union_keeps_first_occurrence() {
        let mut bag = AttributeBag::new();
        bag.add_class("a b");
        bag.set("class", Value::from("b c"));
        bag.set("class", Value::from(vec!["a", "d"]));
        assert_eq!(bag.classes(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_id_joined_with_underscore() {
        let mut bag = AttributeBag::new();
        bag.add_id("item");
        bag.set("id", Value::Int(3));
        assert_eq!(bag.id().as_deref(), Some("item_3"));
    }

    #[test]
    fn test_id_list_skips_falsy() {
        let mut bag = AttributeBag::new();
        bag.set(
            "id",
            Value::List(vec![Value::from("a"), Value::Nil, Value::from("b")]),
        );
        assert_eq!(bag.id().as_deref(), Some("a_b"));
    }

    #[test]
    fn test_later_write_overrides() {
        let mut bag = AttributeBag::new();
        bag.set("href", Value::from("/a"));
        bag.set("href", Value::from("/b"));
        assert_eq!(bag.get("href"), Some(&Value::from("/b")));
    }

    #[test]
    fn test_data_map_expands() {
        let mut bag = AttributeBag::new();
        bag.set(
            "data",
            Value::Map(map(&[
                ("user_id", Value::Int(1)),
                ("info", Value::Map(map(&[("role", Value::from("admin"))]))),
            ])),
        );
        assert_eq!(
            bag.render(&Options::default()),
            " data-info-role='admin' data-user-id='1'"
        );
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    #[test]
    fn test_render_sorted_and_escaped() {
        let mut bag = AttributeBag::new();
        bag.set("title", Value::from("a < b & 'c'"));
        bag.add_class("x");
        bag.set("alt", Value::from("y"));
        assert_eq!(
            bag.render(&Options::default()),
            " alt='y' class='x' title='a &lt; b &amp; &#x27;c&#x27;'"
        );
    }

    #[test]
    fn test_boolean_attributes() {
        let mut bag = AttributeBag::new();
        bag.set("checked", Value::Bool(true));
        bag.set("disabled", Value::Bool(false));
        bag.set("selected", Value::Nil);
        assert_eq!(bag.render(&Options::default()), " checked='checked'");
        assert_eq!(bag.render(&html5()), " checked");
    }

    #[test]
    fn test_attr_wrapper() {
        let mut bag = AttributeBag::new();
        bag.set("href", Value::from("/"));
        let options = Options {
            attr_wrapper: '"',
            ..Options::default()
        };
        assert_eq!(bag.render(&options), " href=\"/\"");
    }

    // =========================================================================
    // Object references
    // =========================================================================

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("BlogPost"), "blog_post");
        assert_eq!(normalize_type_name("Admin::User"), "admin_user");
        assert_eq!(normalize_type_name("HTMLPage"), "htmlpage");
        assert_eq!(normalize_type_name("user"), "user");
    }

    #[test]
    fn test_object_class_and_id() {
        let mut bag = AttributeBag::new();
        bag.add_object(&Record { type_name: "BlogPost", id: Some("42") }, None);
        assert_eq!(bag.classes(), ["blog_post"]);
        assert_eq!(bag.id().as_deref(), Some("blog_post_42"));
    }

    #[test]
    fn test_object_with_prefix_and_no_identity() {
        let mut bag = AttributeBag::new();
        bag.add_object(&Record { type_name: "User", id: None }, Some("new"));
        assert_eq!(bag.classes(), ["new_user"]);
        assert_eq!(bag.id().as_deref(), Some("new_user_"));
    }

    #[test]
    fn test_object_merges_after_shorthand() {
        let mut bag = AttributeBag::new();
        bag.add_class("card");
        bag.add_id("main");
        let record: Arc<dyn Describable> = Arc::new(Record { type_name: "Post", id: Some("1") });
        bag.add_object(record.as_ref(), None);
        assert_eq!(bag.classes(), ["card", "post"]);
        assert_eq!(bag.id().as_deref(), Some("main_post_1"));
    }

    // =========================================================================
    // Compile-time resolution
    // =========================================================================

    fn element_with(attributes: Vec<AttributeSource>) -> Element {
        let mut el = Element::new("div", 1);
        el.classes = vec!["item".into()];
        el.id = Some("x".into());
        el.attributes = attributes;
        el
    }

    #[test]
    fn test_static_sources_fold_into_base() {
        let el = element_with(vec![AttributeSource::Static {
            name: "a".into(),
            value: Literal::Number("1".into()),
        }]);
        let attrs = Attributes::resolve(&el, false);
        assert!(attrs.is_static());
        assert_eq!(attrs.base.get("a"), Some(&Value::Int(1)));
        assert_eq!(attrs.base.render(&Options::default()), " a='1' class='item' id='x'");
    }

    #[test]
    fn test_literal_after_dynamic_keeps_order() {
        let el = element_with(vec![
            AttributeSource::Dynamic {
                name: "class".into(),
                code: "kind".into(),
            },
            AttributeSource::Static {
                name: "class".into(),
                value: Literal::Str("last".into()),
            },
        ]);
        let attrs = Attributes::resolve(&el, false);
        assert_eq!(
            attrs.parts,
            vec![
                AttributePart::Expr {
                    name: "class".into(),
                    code: "kind".into()
                },
                AttributePart::Literal {
                    name: "class".into(),
                    value: Value::from("last")
                },
            ]
        );
    }

    #[test]
    fn test_object_ref_is_first_part() {
        let mut el = element_with(vec![AttributeSource::Static {
            name: "title".into(),
            value: Literal::Str("t".into()),
        }]);
        el.object_ref = Some(ObjectRef {
            code: "post".into(),
            prefix: None,
        });
        let attrs = Attributes::resolve(&el, false);
        assert_eq!(attrs.parts.len(), 2);
        assert!(matches!(attrs.parts[0], AttributePart::Object { .. }));
    }

    #[test]
    fn test_suppress_eval_drops_dynamic_parts() {
        let mut el = element_with(vec![
            AttributeSource::Dynamic {
                name: "href".into(),
                code: "url".into(),
            },
            AttributeSource::Interpolated {
                name: "title".into(),
                segments: vec![
                    Segment::Literal("Hi ".into()),
                    Segment::Expression("name".into()),
                ],
            },
        ]);
        el.object_ref = Some(ObjectRef {
            code: "post".into(),
            prefix: None,
        });
        let attrs = Attributes::resolve(&el, true);
        assert!(attrs.is_static());
        assert_eq!(attrs.base.get("title"), Some(&Value::from("Hi ")));
        assert_eq!(attrs.base.get("href"), None);
    }

    #[test]
    fn test_literal_numbers() {
        assert_eq!(literal_value(&Literal::Number("1_000".into())), Value::Int(1000));
        assert_eq!(literal_value(&Literal::Number("2.5".into())), Value::Float(2.5));
    }
}
