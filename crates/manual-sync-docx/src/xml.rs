//! Owned XML tree used for every package part.
//!
//! The reader records the byte span of each element so callers that need
//! exact round-tripping (the document body) can reuse the original source
//! text for elements they did not touch. Attribute values and text are
//! stored unescaped and escaped again on write.

use std::ops::Range;

use quick_xml::escape::{escape, partial_escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{DocxError, DocxResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    /// Comments, CDATA and processing instructions, kept verbatim.
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub self_closing: bool,
    pub(crate) span: Range<usize>,
    pub(crate) content: Range<usize>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: true,
            span: 0..0,
            content: 0..0,
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self.self_closing = false;
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(key, _)| key != name);
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|element| element.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |element| element.is(name))
    }

    /// Returns the named child, creating it at `position` among the children
    /// when it does not exist yet.
    pub fn ensure_child(&mut self, name: &str, position: usize) -> &mut Element {
        let index = match self
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(element) if element.is(name)))
        {
            Some(index) => index,
            None => {
                let at = position.min(self.children.len());
                self.children.insert(at, Node::Element(Element::new(name)));
                self.self_closing = false;
                at
            }
        };
        match &mut self.children[index] {
            Node::Element(element) => element,
            _ => unreachable!("index points at an element"),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
        self.self_closing = false;
    }

    pub fn retain_elements(&mut self, mut keep: impl FnMut(&Element) -> bool) {
        self.children.retain(|node| match node {
            Node::Element(element) => keep(element),
            _ => true,
        });
    }

    /// Pre-order walk over this element and all descendant elements.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|element| element.is(name))
    }

    /// Applies `visit` to this element and every descendant element.
    pub fn visit_mut(&mut self, visit: &mut dyn FnMut(&mut Element)) {
        visit(self);
        for child in self.elements_mut() {
            child.visit_mut(visit);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() && self.self_closing {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_to(out),
                Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
                Node::Other(raw) => out.push_str(raw),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Element(inner) => collect_text(inner, out),
            Node::Text(text) => out.push_str(text),
            Node::Other(_) => {}
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(element.elements());
        self.stack[start..].reverse();
        Some(element)
    }
}

/// A parsed part: everything before the root element, the root, and
/// everything after it.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub prolog: String,
    pub root: Element,
    pub epilog: String,
}

impl XmlDocument {
    pub fn parse(part: &str, src: &str) -> DocxResult<Self> {
        let root = parse_root(part, src)?;
        Ok(Self {
            prolog: src[..root.span.start].to_string(),
            epilog: src[root.span.end..].to_string(),
            root,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.prolog.len() + self.epilog.len() + 1024);
        out.push_str(&self.prolog);
        self.root.write_to(&mut out);
        out.push_str(&self.epilog);
        out
    }
}

/// Parses `src` and returns its root element with source spans recorded.
pub(crate) fn parse_root(part: &str, src: &str) -> DocxResult<Element> {
    let mut reader = Reader::from_str(src);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|err| DocxError::xml(part, before, err))?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(tag) => {
                let mut element = element_from_tag(part, before, &tag)?;
                element.self_closing = false;
                element.span = markup_start(src, before)..after;
                element.content = after..after;
                stack.push(element);
            }
            Event::Empty(tag) => {
                let mut element = element_from_tag(part, before, &tag)?;
                element.span = markup_start(src, before)..after;
                element.content = after..after;
                attach(part, &mut stack, &mut root, Node::Element(element))?;
            }
            Event::End(_) => {
                let Some(mut element) = stack.pop() else {
                    return Err(DocxError::xml(part, before, "closing tag without opening tag"));
                };
                element.content.end = markup_start(src, before);
                element.span.end = after;
                attach(part, &mut stack, &mut root, Node::Element(element))?;
            }
            Event::Text(_) => {
                if let Some(parent) = stack.last_mut() {
                    let raw = &src[before..text_end(src, before, after)];
                    let text = unescape(raw).map_err(|err| DocxError::xml(part, before, err))?;
                    parent.children.push(Node::Text(text.into_owned()));
                }
            }
            Event::Eof => break,
            _ => {
                if let Some(parent) = stack.last_mut() {
                    let raw = &src[markup_start(src, before)..after];
                    parent.children.push(Node::Other(raw.to_string()));
                }
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(DocxError::xml(
            part,
            src.len(),
            format!("element <{}> is never closed", open.name),
        ));
    }
    root.ok_or_else(|| DocxError::structure(part, "document has no root element"))
}

fn attach(
    part: &str,
    stack: &mut [Element],
    root: &mut Option<Element>,
    node: Node,
) -> DocxResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => match node {
            Node::Element(element) if root.is_none() => *root = Some(element),
            Node::Element(element) => {
                return Err(DocxError::xml(
                    part,
                    element.span.start,
                    "more than one root element",
                ))
            }
            _ => {}
        },
    }
    Ok(())
}

fn element_from_tag(part: &str, position: usize, tag: &BytesStart<'_>) -> DocxResult<Element> {
    let name = std::str::from_utf8(tag.name().as_ref())
        .map_err(|err| DocxError::xml(part, position, err))?
        .to_string();
    let mut element = Element::new(name);
    for attr in tag.attributes() {
        let attr = attr.map_err(|err| DocxError::xml(part, position, err))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| DocxError::xml(part, position, err))?;
        let raw = std::str::from_utf8(&attr.value)
            .map_err(|err| DocxError::xml(part, position, err))?;
        let value = unescape(raw).map_err(|err| DocxError::xml(part, position, err))?;
        element.attrs.push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}

/// Start of the markup that begins at or just before `pos`. The reader may
/// already have consumed the opening `<` while reading the preceding text.
fn markup_start(src: &str, pos: usize) -> usize {
    if src.as_bytes().get(pos) == Some(&b'<') {
        return pos;
    }
    src[..pos].rfind('<').unwrap_or(pos)
}

/// End of a text event, excluding a consumed `<` of the following markup.
fn text_end(src: &str, start: usize, end: usize) -> usize {
    if end > start && src.as_bytes()[end - 1] == b'<' {
        end - 1
    } else {
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<w:document xmlns:w=\"urn:w\"><w:body>",
        "<w:p><w:r><w:t xml:space=\"preserve\">A &amp; B </w:t></w:r></w:p>",
        "<!-- note --><w:p/>",
        "</w:body></w:document>\n"
    );

    #[test]
    fn parses_tree_with_spans() {
        let doc = XmlDocument::parse("word/document.xml", SAMPLE).unwrap();
        assert!(doc.prolog.starts_with("<?xml"));
        assert_eq!(doc.epilog, "\n");
        let body = doc.root.child("w:body").unwrap();
        let first = body.elements().next().unwrap();
        assert_eq!(
            &SAMPLE[first.span.clone()],
            "<w:p><w:r><w:t xml:space=\"preserve\">A &amp; B </w:t></w:r></w:p>"
        );
        assert_eq!(first.text(), "A & B ");
        assert!(body.children.iter().any(|n| matches!(n, Node::Other(raw) if raw == "<!-- note -->")));
    }

    #[test]
    fn serializes_equivalent_markup() {
        let doc = XmlDocument::parse("part", SAMPLE).unwrap();
        assert_eq!(doc.to_xml(), SAMPLE);
    }

    #[test]
    fn attribute_values_are_escaped_on_write() {
        let element = Element::new("w:t")
            .with_attr("w:val", "a\"b<c")
            .with_text("x < y & z");
        assert_eq!(
            element.to_xml(),
            "<w:t w:val=\"a&quot;b&lt;c\">x &lt; y &amp; z</w:t>"
        );
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let doc = XmlDocument::parse("part", "<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = doc.root.descendants().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn unclosed_element_is_an_error() {
        let err = XmlDocument::parse("part", "<a><b></b>").unwrap_err();
        assert!(matches!(err, DocxError::Xml { .. }), "{err}");
    }
}
