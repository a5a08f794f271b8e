//! The main document part as an ordered list of body elements.
//!
//! Each element remembers the exact source text it was read from. Reading
//! an element never invalidates that text; asking for mutable access does.
//! Serializing a body whose elements were only read, moved or cloned
//! therefore reproduces the original bytes for all of them.

use std::ops::Range;

use crate::error::{DocxError, DocxResult};
use crate::xml::{parse_root, Element, Node};

pub const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone)]
pub struct BodyElement {
    leading: String,
    element: Element,
    raw: Option<String>,
}

impl BodyElement {
    pub fn new(element: Element) -> Self {
        Self {
            leading: String::new(),
            element,
            raw: None,
        }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Mutable access. The element is re-serialized from the tree from now on.
    pub fn element_mut(&mut self) -> &mut Element {
        self.raw = None;
        &mut self.element
    }

    pub fn into_element(self) -> Element {
        self.element
    }

    pub fn is_pristine(&self) -> bool {
        self.raw.is_some()
    }

    /// Serialized form of the element alone.
    pub fn xml(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => self.element.to_xml(),
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.leading);
        match &self.raw {
            Some(raw) => out.push_str(raw),
            None => self.element.write_to(out),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Body {
    prefix: String,
    items: Vec<BodyElement>,
    suffix: String,
}

impl Body {
    pub fn parse(src: &str) -> DocxResult<Self> {
        let mut root = parse_root(DOCUMENT_PART, src)?;
        let body_index = root
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.is("w:body")))
            .ok_or_else(|| DocxError::structure(DOCUMENT_PART, "missing <w:body>"))?;
        let Node::Element(body) = root.children.remove(body_index) else {
            return Err(DocxError::structure(DOCUMENT_PART, "missing <w:body>"));
        };
        if body.self_closing {
            let at = body.span.end;
            return Ok(Self {
                prefix: format!("{}<w:body>", &src[..body.span.start]),
                items: Vec::new(),
                suffix: format!("</w:body>{}", &src[at..]),
            });
        }

        let mut items = Vec::new();
        let mut cursor = body.content.start;
        for element in body.children.into_iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        }) {
            let Range { start, end } = element.span.clone();
            items.push(BodyElement {
                leading: src[cursor..start].to_string(),
                raw: Some(src[start..end].to_string()),
                element,
            });
            cursor = end;
        }

        Ok(Self {
            prefix: src[..body.content.start].to_string(),
            items,
            suffix: src[cursor..].to_string(),
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.prefix.len() + self.suffix.len() + 64 * 1024);
        out.push_str(&self.prefix);
        for item in &self.items {
            item.write_to(&mut out);
        }
        out.push_str(&self.suffix);
        out
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[BodyElement] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&BodyElement> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BodyElement> {
        self.items.get_mut(index)
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.items.get(index).map(BodyElement::element)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.items.iter().map(BodyElement::element)
    }

    pub fn insert(&mut self, index: usize, item: BodyElement) {
        self.items.insert(index, item);
    }

    pub fn remove(&mut self, index: usize) -> BodyElement {
        self.items.remove(index)
    }

    /// Replaces `range` with `replacement`. The first replacement element
    /// inherits the whitespace that preceded the first removed one.
    pub fn splice(&mut self, range: Range<usize>, mut replacement: Vec<BodyElement>) {
        if let (Some(first), Some(old)) = (replacement.first_mut(), self.items.get(range.start)) {
            if range.start < range.end && first.leading.is_empty() {
                first.leading = old.leading.clone();
            }
        }
        self.items.splice(range, replacement);
    }

    /// Index of the trailing section properties, which must stay last.
    pub fn content_end(&self) -> usize {
        match self.items.last() {
            Some(item) if item.element().is("w:sectPr") => self.items.len() - 1,
            _ => self.items.len(),
        }
    }

    /// Moves the elements in `range` so they start at `to` (an index into the
    /// body after the range has been taken out). Moved elements keep their
    /// source text.
    pub fn move_range(&mut self, range: Range<usize>, to: usize) {
        let moved: Vec<BodyElement> = self.items.drain(range).collect();
        let at = to.min(self.items.len());
        self.items.splice(at..at, moved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordml;

    const DOC: &str = concat!(
        "<?xml version=\"1.0\" standalone=\"yes\"?>\r\n",
        "<w:document xmlns:w=\"urn:w\"><w:body>\n  ",
        "<w:p><w:pPr><w:pStyle w:val='Heading1'/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>\n  ",
        "<w:p><w:r><w:t>Body &#8211; text</w:t></w:r></w:p>\n  ",
        "<w:sectPr><w:pgSz w:w=\"11906\"/></w:sectPr>\n",
        "</w:body></w:document>"
    );

    #[test]
    fn untouched_body_round_trips_exactly() {
        let body = Body::parse(DOC).unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body.to_xml(), DOC);
        assert_eq!(body.content_end(), 2);
    }

    #[test]
    fn only_mutated_elements_are_reserialized() {
        let mut body = Body::parse(DOC).unwrap();
        wordml::set_paragraph_text(body.get_mut(1).unwrap().element_mut(), "New text");
        let xml = body.to_xml();
        assert!(xml.contains("<w:pStyle w:val='Heading1'/>"));
        assert!(xml.contains("<w:t>New text</w:t>"));
        assert!(!xml.contains("8211"));
    }

    #[test]
    fn moved_elements_keep_their_bytes() {
        let mut body = Body::parse(DOC).unwrap();
        body.move_range(0..1, 1);
        let xml = body.to_xml();
        let heading = xml.find("<w:pStyle w:val='Heading1'/>").unwrap();
        let text = xml.find("Body &#8211; text").unwrap();
        assert!(text < heading);
    }

    #[test]
    fn missing_body_is_a_structure_error() {
        let err = Body::parse("<w:document xmlns:w=\"urn:w\"/>").unwrap_err();
        assert!(matches!(err, DocxError::Structure { .. }));
    }
}
