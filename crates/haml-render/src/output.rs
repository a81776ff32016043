use haml_codegen::attrs::self_close_suffix;
use haml_codegen::value::preserve;
use haml_codegen::{Flow, Format};

const INDENT: &str = "  ";

/// Output writer. Owns line breaks, indentation and the whitespace rules
/// of nuke flags and preserved tags.
///
/// Every block-level piece of output asks for a line break first. The
/// break is skipped at the start of the output (or of a preserved region)
/// and when a nuke flag has suppressed it.
#[derive(Debug, Default)]
pub(crate) struct Output {
    out: String,
    /// Open preserved regions, innermost last.
    preserved: Vec<String>,
    depth: usize,
    suppress_break: bool,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> &mut String {
        match self.preserved.last_mut() {
            Some(buffer) => buffer,
            None => &mut self.out,
        }
    }

    fn break_line(&mut self) {
        if std::mem::take(&mut self.suppress_break) {
            return;
        }
        let depth = if self.preserved.is_empty() { self.depth } else { 0 };
        let buffer = self.current();
        if buffer.is_empty() {
            return;
        }
        buffer.push('\n');
        buffer.push_str(&INDENT.repeat(depth));
    }

    /// Write text, indenting its continuation lines unless preserved.
    fn write_lines(&mut self, text: &str) {
        let pad = if self.preserved.is_empty() {
            INDENT.repeat(self.depth)
        } else {
            String::new()
        };
        let buffer = self.current();
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                buffer.push('\n');
                if !line.is_empty() {
                    buffer.push_str(&pad);
                }
            }
            buffer.push_str(line);
        }
    }

    pub fn write(&mut self, text: &str, flow: Flow) {
        match flow {
            Flow::Inline => self.current().push_str(text),
            Flow::Line => {
                self.break_line();
                self.write_lines(text);
            }
            Flow::Open => {
                self.break_line();
                self.write_lines(text);
                self.depth += 1;
            }
            Flow::Close => {
                self.depth = self.depth.saturating_sub(1);
                self.break_line();
                self.write_lines(text);
            }
        }
    }

    pub fn open_tag(&mut self, name: &str, attrs: &str, tag: TagFlags) {
        if tag.nuke_outer {
            self.suppress_break = true;
        }
        self.break_line();
        let buffer = self.current();
        buffer.push('<');
        buffer.push_str(name);
        buffer.push_str(attrs);
        buffer.push('>');

        if tag.preserve {
            self.preserved.push(String::new());
        }
        if !tag.inline {
            if tag.nuke_inner {
                self.suppress_break = true;
            } else {
                self.depth += 1;
            }
        }
    }

    pub fn close_tag(&mut self, name: &str, tag: TagFlags) {
        if tag.preserve {
            if let Some(content) = self.preserved.pop() {
                let content = preserve(&content).into_owned();
                self.current().push_str(&content);
            }
        }
        if !tag.inline {
            if tag.nuke_inner {
                self.suppress_break = true;
            } else {
                self.depth = self.depth.saturating_sub(1);
            }
            self.break_line();
        }

        let buffer = self.current();
        buffer.push_str("</");
        buffer.push_str(name);
        buffer.push('>');
        if tag.nuke_outer {
            self.suppress_break = true;
        }
    }

    pub fn self_close_tag(&mut self, name: &str, attrs: &str, nuke_outer: bool, format: Format) {
        if nuke_outer {
            self.suppress_break = true;
        }
        self.break_line();
        let buffer = self.current();
        buffer.push('<');
        buffer.push_str(name);
        buffer.push_str(attrs);
        buffer.push_str(self_close_suffix(format));
        if nuke_outer {
            self.suppress_break = true;
        }
    }

    /// Final text, ending in a newline unless empty.
    pub fn finish(mut self) -> String {
        while let Some(content) = self.preserved.pop() {
            let content = preserve(&content).into_owned();
            self.current().push_str(&content);
        }
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out
    }
}

/// Flags shared by an open/close tag pair.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TagFlags {
    pub nuke_outer: bool,
    pub nuke_inner: bool,
    pub inline: bool,
    pub preserve: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block() -> TagFlags {
        TagFlags::default()
    }

    fn inline() -> TagFlags {
        TagFlags {
            inline: true,
            ..TagFlags::default()
        }
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(Output::new().finish(), "");
    }

    #[test]
    fn test_nested_blocks_indent() {
        let mut out = Output::new();
        out.open_tag("div", "", block());
        out.open_tag("p", "", inline());
        out.write("hi", Flow::Inline);
        out.close_tag("p", inline());
        out.close_tag("div", block());
        assert_eq!(out.finish(), "<div>\n  <p>hi</p>\n</div>\n");
    }

    #[test]
    fn test_multiline_text_is_indented() {
        let mut out = Output::new();
        out.open_tag("div", "", block());
        out.write("a\n\nb", Flow::Line);
        out.close_tag("div", block());
        assert_eq!(out.finish(), "<div>\n  a\n\n  b\n</div>\n");
    }

    #[test]
    fn test_open_close_flow() {
        let mut out = Output::new();
        out.write("<!--", Flow::Open);
        out.write("x", Flow::Line);
        out.write("-->", Flow::Close);
        assert_eq!(out.finish(), "<!--\n  x\n-->\n");
    }

    #[test]
    fn test_nuke_outer_suppresses_both_sides() {
        let mut out = Output::new();
        out.self_close_tag("img", "", false, Format::Xhtml);
        out.self_close_tag("img", "", true, Format::Xhtml);
        out.self_close_tag("img", "", false, Format::Html5);
        assert_eq!(out.finish(), "<img /><img /><img>\n");
    }

    #[test]
    fn test_preserved_region() {
        let flags = TagFlags {
            nuke_inner: true,
            preserve: true,
            ..TagFlags::default()
        };
        let mut out = Output::new();
        out.open_tag("div", "", block());
        out.open_tag("pre", "", flags);
        out.write("a", Flow::Line);
        out.write("  b", Flow::Line);
        out.close_tag("pre", flags);
        out.close_tag("div", block());
        assert_eq!(out.finish(), "<div>\n  <pre>a&#x000A;  b</pre>\n</div>\n");
    }
}
