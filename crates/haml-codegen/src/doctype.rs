//! `!!!` directive table.

use crate::options::{Format, Options};

const XHTML_TRANSITIONAL: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">"#;
const XHTML_STRICT: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#;
const XHTML_FRAMESET: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Frameset//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-frameset.dtd">"#;
const XHTML_11: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#;
const XHTML_BASIC: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML Basic 1.1//EN" "http://www.w3.org/TR/xhtml-basic/xhtml-basic11.dtd">"#;
const XHTML_MOBILE: &str = r#"<!DOCTYPE html PUBLIC "-//WAPFORUM//DTD XHTML Mobile 1.2//EN" "http://www.openmobilealliance.org/tech/DTD/xhtml-mobile12.dtd">"#;
const XHTML_RDFA: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML+RDFa 1.0//EN" "http://www.w3.org/MarkUp/DTD/xhtml-rdfa-1.dtd">"#;

const HTML4_TRANSITIONAL: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 4.01 Transitional//EN" "http://www.w3.org/TR/html4/loose.dtd">"#;
const HTML4_STRICT: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 4.01//EN" "http://www.w3.org/TR/html4/strict.dtd">"#;
const HTML4_FRAMESET: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 4.01 Frameset//EN" "http://www.w3.org/TR/html4/frameset.dtd">"#;

const HTML5: &str = "<!DOCTYPE html>";

/// Resolve directive arguments to the line they stand for.
///
/// The arguments are an optional version (`1.0`, `1.1`, `5`) followed by an
/// optional type, or `XML` followed by an optional encoding. `Ok(None)`
/// means the directive emits nothing (`XML` outside XHTML). An unrecognized
/// or leftover token comes back as `Err(token)`.
pub fn resolve(args: &str, options: &Options) -> Result<Option<String>, String> {
    let mut words = args.split_whitespace().peekable();

    if words.next_if(|word| word.eq_ignore_ascii_case("xml")).is_some() {
        let encoding = words.next().unwrap_or("utf-8");
        if let Some(extra) = words.next() {
            return Err(extra.to_string());
        }
        if options.format.is_html() {
            return Ok(None);
        }
        let q = options.attr_wrapper;
        return Ok(Some(format!(
            "<?xml version={q}1.0{q} encoding={q}{encoding}{q} ?>"
        )));
    }

    let version = words
        .next_if(|word| matches!(*word, "1.0" | "1.1" | "5"))
        .unwrap_or("1.0");
    let kind = words.next();
    if let Some(extra) = words.next() {
        return Err(extra.to_string());
    }
    let kind_lower = kind.map(str::to_ascii_lowercase);
    // The offending token: the type if there is one, else the version.
    let unknown = || kind.unwrap_or(version).to_string();

    let doctype = match (options.format, version, kind_lower.as_deref()) {
        (Format::Xhtml, "1.0", None | Some("transitional")) => XHTML_TRANSITIONAL,
        (Format::Xhtml, "1.0", Some("strict")) => XHTML_STRICT,
        (Format::Xhtml, "1.0", Some("frameset")) => XHTML_FRAMESET,
        (Format::Xhtml, "1.0", Some("rdfa")) => XHTML_RDFA,
        (Format::Xhtml, "1.1", None) => XHTML_11,
        (Format::Xhtml, "1.0" | "1.1", Some("basic")) => XHTML_BASIC,
        (Format::Xhtml, "1.0" | "1.1", Some("mobile")) => XHTML_MOBILE,
        (Format::Xhtml, "5", None) => HTML5,
        (Format::Html4, "1.0", None | Some("transitional")) => HTML4_TRANSITIONAL,
        (Format::Html4, "1.0", Some("strict")) => HTML4_STRICT,
        (Format::Html4, "1.0", Some("frameset")) => HTML4_FRAMESET,
        (
            Format::Html5,
            _,
            None | Some("transitional" | "strict" | "frameset" | "basic" | "mobile" | "rdfa"),
        ) => HTML5,
        _ => return Err(unknown()),
    };

    Ok(Some(doctype.to_string()))
}
