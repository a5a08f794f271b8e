//! Relationships of the main document part and the package content types.

use crate::error::DocxResult;
use crate::xml::{Element, Node, XmlDocument};

pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const IMAGE_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const EMPTY_RELS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"/>"
);

#[derive(Debug, Clone)]
pub struct Relationships {
    doc: XmlDocument,
    dirty: bool,
}

impl Relationships {
    pub fn parse(src: &str) -> DocxResult<Self> {
        Ok(Self {
            doc: XmlDocument::parse(DOCUMENT_RELS_PART, src)?,
            dirty: false,
        })
    }

    /// An empty relationship part, marked dirty so it gets written.
    pub fn empty() -> DocxResult<Self> {
        let mut rels = Self::parse(EMPTY_RELS)?;
        rels.dirty = true;
        Ok(rels)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn to_xml(&self) -> String {
        self.doc.to_xml()
    }

    pub fn target(&self, id: &str) -> Option<&str> {
        self.doc
            .root
            .children_named("Relationship")
            .find(|rel| rel.attr("Id") == Some(id))?
            .attr("Target")
    }

    /// Adds a relationship and returns its id.
    pub fn add(&mut self, kind: &str, target: &str) -> String {
        let mut n = 1;
        let id = loop {
            let candidate = format!("rIdSync{n}");
            if self.target(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.doc.root.push(
            Element::new("Relationship")
                .with_attr("Id", id.clone())
                .with_attr("Type", kind)
                .with_attr("Target", target),
        );
        self.dirty = true;
        id
    }
}

#[derive(Debug, Clone)]
pub struct ContentTypes {
    doc: XmlDocument,
    dirty: bool,
}

impl ContentTypes {
    pub fn parse(src: &str) -> DocxResult<Self> {
        Ok(Self {
            doc: XmlDocument::parse(CONTENT_TYPES_PART, src)?,
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn to_xml(&self) -> String {
        self.doc.to_xml()
    }

    pub fn has_default(&self, extension: &str) -> bool {
        self.doc.root.children_named("Default").any(|default| {
            default
                .attr("Extension")
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
    }

    /// Registers a default content type for `extension` unless one exists.
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if self.has_default(extension) {
            return;
        }
        let default = Element::new("Default")
            .with_attr("Extension", extension.to_ascii_lowercase())
            .with_attr("ContentType", content_type);
        let at = self
            .doc
            .root
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.is("Override")))
            .unwrap_or(self.doc.root.children.len());
        self.doc
            .root
            .children
            .insert(at, Node::Element(default));
        self.doc.root.self_closing = false;
        self.dirty = true;
    }
}

/// Media type for an image file extension.
pub fn image_content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        _ => "application/octet-stream",
    }
}
