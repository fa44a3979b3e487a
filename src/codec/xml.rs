//! Envelope serialization primitive.
//!
//! Every family writer goes through [`XmlWriter`], so escaping is identical
//! for envelope attributes, detail attributes and free text.

use std::fmt::{Display, Write as _};

use roxmltree::Node;

use crate::core::XML_DECLARATION;

/// Escape text for use inside an attribute value (`in_attribute`) or element
/// content.
///
/// Characters XML 1.0 cannot carry are replaced with U+FFFD. Whitespace that
/// attribute-value normalization would fold is written as a character
/// reference.
pub fn escape(text: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\'' if in_attribute => out.push_str("&apos;"),
            '\n' if in_attribute => out.push_str("&#10;"),
            '\t' if in_attribute => out.push_str("&#9;"),
            '\r' => out.push_str("&#13;"),
            '\n' | '\t' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

/// Append-only XML writer.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
}

impl XmlWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            out: String::with_capacity(512),
        }
    }

    /// Write the XML declaration.
    pub fn declaration(&mut self) {
        self.out.push_str(XML_DECLARATION);
    }

    /// Begin a start tag. Finish it with [`Tag::open`] or [`Tag::close`].
    pub fn start(&mut self, name: &str) -> Tag<'_> {
        self.out.push('<');
        self.out.push_str(name);
        Tag { writer: self }
    }

    /// Write escaped element content.
    pub fn text(&mut self, text: &str) {
        self.out.push_str(&escape(text, false));
    }

    /// Write an end tag.
    pub fn end(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    /// Write an element holding only text.
    pub fn text_element(&mut self, name: &str, text: &str) {
        self.start(name).open();
        self.text(text);
        self.end(name);
    }

    /// Write pre-serialized markup verbatim.
    pub fn raw(&mut self, markup: &str) {
        self.out.push_str(markup);
    }

    /// Finish and return the document bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }

    /// Borrow the output written so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }
}

/// Start tag under construction.
#[must_use = "a tag must be finished with open() or close()"]
pub struct Tag<'w> {
    writer: &'w mut XmlWriter,
}

impl Tag<'_> {
    /// Add an attribute.
    pub fn attr(self, name: &str, value: impl Display) -> Self {
        let out = &mut self.writer.out;
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        let mut formatted = String::new();
        let _ = write!(formatted, "{}", value);
        out.push_str(&escape(&formatted, true));
        out.push('"');
        self
    }

    /// Add an attribute when a value is present.
    pub fn attr_opt<V: Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.attr(name, v),
            None => self,
        }
    }

    /// Finish as an open tag (`>`); content and an end tag follow.
    pub fn open(self) {
        self.writer.out.push('>');
    }

    /// Finish as a self-closing tag (`/>`).
    pub fn close(self) {
        self.writer.out.push_str("/>");
    }
}

// Read-side helpers shared by the family decoders.

/// First child element named `name`.
pub(crate) fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Attribute as an owned string.
pub(crate) fn attr_string(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

/// Attribute parsed as a number.
pub(crate) fn attr_parse<T: std::str::FromStr>(node: Node<'_, '_>, name: &str) -> Option<T> {
    node.attribute(name)?.trim().parse().ok()
}

/// Element text, empty when the element has no content.
pub(crate) fn text_of(node: Node<'_, '_>) -> String {
    node.text().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_attribute() {
        assert_eq!(
            escape(r#"a<b>&"c"'d'"#, true),
            "a&lt;b&gt;&amp;&quot;c&quot;&apos;d&apos;"
        );
        assert_eq!(escape("line\nbreak\ttab", true), "line&#10;break&#9;tab");
    }

    #[test]
    fn test_escape_text_keeps_quotes() {
        assert_eq!(escape(r#"say "hi" & <go>"#, false), "say \"hi\" &amp; &lt;go&gt;");
        assert_eq!(escape("a\r\nb", false), "a&#13;\nb");
        assert_eq!(escape("bell\u{7}", false), "bell\u{FFFD}");
    }

    #[test]
    fn test_writer_output() {
        let mut w = XmlWriter::new();
        w.start("detail").open();
        w.start("contact").attr("callsign", "A&B").close();
        w.text_element("remarks", "x < y");
        w.end("detail");
        assert_eq!(
            w.as_str(),
            r#"<detail><contact callsign="A&amp;B"/><remarks>x &lt; y</remarks></detail>"#
        );
    }

    #[test]
    fn test_escaped_text_parses_back() {
        let original = "quote \" apos ' amp & lt < gt >\nnext\tline\r\n";
        let mut w = XmlWriter::new();
        w.start("r").attr("a", original).open();
        w.text(original);
        w.end("r");

        let xml = w.as_str().to_string();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let root = doc.root_element();
        assert_eq!(root.attribute("a"), Some(original));
        assert_eq!(root.text(), Some(original));
    }
}
