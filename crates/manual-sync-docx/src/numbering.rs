//! Numbering definitions (`word/numbering.xml`).

use crate::error::DocxResult;
use crate::xml::{Element, Node, XmlDocument};

pub const NUMBERING_PART: &str = "word/numbering.xml";

#[derive(Debug, Clone)]
pub struct Numbering {
    doc: XmlDocument,
    dirty: bool,
}

impl Numbering {
    pub fn parse(src: &str) -> DocxResult<Self> {
        Ok(Self {
            doc: XmlDocument::parse(NUMBERING_PART, src)?,
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn to_xml(&self) -> String {
        self.doc.to_xml()
    }

    fn instance(&self, num_id: &str) -> Option<&Element> {
        self.doc
            .root
            .children_named("w:num")
            .find(|num| num.attr("w:numId") == Some(num_id))
    }

    fn abstract_definition(&self, abstract_id: &str) -> Option<&Element> {
        self.doc
            .root
            .children_named("w:abstractNum")
            .find(|def| def.attr("w:abstractNumId") == Some(abstract_id))
    }

    pub fn abstract_of(&self, num_id: &str) -> Option<&str> {
        self.instance(num_id)?.child("w:abstractNumId")?.attr("w:val")
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.doc
            .root
            .children_named("w:num")
            .filter_map(|num| num.attr("w:numId").map(str::to_string))
            .collect()
    }

    /// Number format (`decimal`, `bullet`, ...) of a level, honouring level
    /// overrides on the instance.
    pub fn num_format(&self, num_id: &str, ilvl: u32) -> Option<&str> {
        let level = ilvl.to_string();
        let instance = self.instance(num_id)?;
        let overridden = instance
            .children_named("w:lvlOverride")
            .filter(|over| over.attr("w:ilvl") == Some(level.as_str()))
            .filter_map(|over| over.child("w:lvl"))
            .find_map(|lvl| lvl.child("w:numFmt")?.attr("w:val"));
        if overridden.is_some() {
            return overridden;
        }
        let abstract_id = instance.child("w:abstractNumId")?.attr("w:val")?;
        self.abstract_definition(abstract_id)?
            .children_named("w:lvl")
            .find(|lvl| lvl.attr("w:ilvl") == Some(level.as_str()))?
            .child("w:numFmt")?
            .attr("w:val")
    }

    /// Whether the instance already restarts level 0 at 1.
    pub fn restarts_at_one(&self, num_id: &str) -> bool {
        self.instance(num_id).is_some_and(|num| {
            num.children_named("w:lvlOverride")
                .filter(|over| over.attr("w:ilvl") == Some("0"))
                .filter_map(|over| over.child("w:startOverride"))
                .any(|start| start.attr("w:val") == Some("1"))
        })
    }

    /// Adds a new instance of the same abstract definition as `num_id`
    /// whose first level restarts at 1. Returns the new instance id.
    pub fn add_restart_instance(&mut self, num_id: &str) -> Option<String> {
        let abstract_id = self.abstract_of(num_id)?.to_string();
        let next = self
            .doc
            .root
            .children_named("w:num")
            .filter_map(|num| num.attr("w:numId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let new_id = next.to_string();
        let instance = Element::new("w:num")
            .with_attr("w:numId", new_id.clone())
            .with_child(Element::new("w:abstractNumId").with_attr("w:val", abstract_id))
            .with_child(
                Element::new("w:lvlOverride")
                    .with_attr("w:ilvl", "0")
                    .with_child(Element::new("w:startOverride").with_attr("w:val", "1")),
            );

        let root = &mut self.doc.root;
        let at = root
            .children
            .iter()
            .rposition(|node| matches!(node, Node::Element(e) if e.is("w:num")))
            .map(|index| index + 1)
            .unwrap_or(root.children.len());
        root.children.insert(at, Node::Element(instance));
        root.self_closing = false;
        self.dirty = true;
        Some(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUMBERING: &str = r#"<w:numbering xmlns:w="urn:w"><w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/></w:lvl><w:lvl w:ilvl="1"><w:numFmt w:val="lowerLetter"/></w:lvl></w:abstractNum><w:abstractNum w:abstractNumId="1"><w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl></w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num><w:num w:numId="2"><w:abstractNumId w:val="1"/></w:num><w:num w:numId="3"><w:abstractNumId w:val="1"/><w:lvlOverride w:ilvl="0"><w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl></w:lvlOverride></w:num></w:numbering>"#;

    #[test]
    fn formats_come_from_abstract_or_override() {
        let numbering = Numbering::parse(NUMBERING).unwrap();
        assert_eq!(numbering.num_format("1", 0), Some("decimal"));
        assert_eq!(numbering.num_format("1", 1), Some("lowerLetter"));
        assert_eq!(numbering.num_format("2", 0), Some("bullet"));
        assert_eq!(numbering.num_format("3", 0), Some("decimal"));
        assert_eq!(numbering.num_format("9", 0), None);
    }

    #[test]
    fn restart_instance_follows_last_num() {
        let mut numbering = Numbering::parse(NUMBERING).unwrap();
        let id = numbering.add_restart_instance("1").unwrap();
        assert_eq!(id, "4");
        assert!(numbering.is_dirty());
        assert!(numbering.restarts_at_one("4"));
        assert_eq!(numbering.abstract_of("4"), Some("0"));
        assert!(numbering.to_xml().ends_with(
            r#"<w:num w:numId="4"><w:abstractNumId w:val="0"/><w:lvlOverride w:ilvl="0"><w:startOverride w:val="1"/></w:lvlOverride></w:num></w:numbering>"#
        ));
    }
}
