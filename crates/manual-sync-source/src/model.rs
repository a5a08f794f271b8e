use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Ordered sections extracted from one source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<PathBuf>,
    pub sections: Vec<Section>,
}

impl SourceDocument {
    /// Blocks across every section, in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.sections.iter().flat_map(|section| section.blocks.iter())
    }

    /// Figure blocks sorted by their declared figure order, ties broken by
    /// document order.
    pub fn figures(&self) -> Vec<&Block> {
        let mut figures: Vec<(usize, &Block)> = self
            .blocks()
            .enumerate()
            .filter(|(_, block)| block.kind == BlockKind::Figure)
            .collect();
        figures.sort_by_key(|(position, block)| {
            let order = match &block.payload {
                Payload::Figure(figure) => figure.order,
                _ => usize::MAX,
            };
            (order, *position)
        });
        figures.into_iter().map(|(_, block)| block).collect()
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks().find(|block| block.id == id)
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: String,
    /// True when the id was declared (manifest or marker comment) rather than
    /// derived from the title.
    pub explicit_id: bool,
    pub title: String,
    pub level: u8,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub id: String,
    pub explicit_id: bool,
    pub kind: BlockKind,
    /// Position of the block across the whole document, starting at 0.
    pub order: usize,
    /// Normalised title of the owning section.
    pub heading_key: String,
    pub section_id: String,
    /// Zero-based index among blocks of the same kind inside the section.
    pub kind_index: usize,
    pub payload: Payload,
}

impl Block {
    /// Paragraph texts for paragraph blocks, one entry per blank-line
    /// separated paragraph.
    pub fn paragraphs(&self) -> Vec<String> {
        match &self.payload {
            Payload::Text(text) => text
                .split("\n\n")
                .map(crate::normalize::collapse_whitespace)
                .filter(|chunk| !chunk.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn items(&self) -> &[String] {
        match &self.payload {
            Payload::Items(items) => items,
            _ => &[],
        }
    }

    pub fn table(&self) -> Option<&TablePayload> {
        match &self.payload {
            Payload::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn figure(&self) -> Option<&FigurePayload> {
        match &self.payload {
            Payload::Figure(figure) => Some(figure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    BulletList,
    NumberedList,
    Table,
    Figure,
}

impl BlockKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "paragraph" | "text" => Some(BlockKind::Paragraph),
            "bullet_list" | "bullets" | "itemize" => Some(BlockKind::BulletList),
            "numbered_list" | "enumerate" | "ordered_list" => Some(BlockKind::NumberedList),
            "table" => Some(BlockKind::Table),
            "figure" | "image" => Some(BlockKind::Figure),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::BulletList => "bullet_list",
            BlockKind::NumberedList => "numbered_list",
            BlockKind::Table => "table",
            BlockKind::Figure => "figure",
        }
    }

    /// Short label used in derived ids, e.g. `list-2`.
    pub(crate) fn id_label(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::BulletList | BlockKind::NumberedList => "list",
            BlockKind::Table => "table",
            BlockKind::Figure => "figure",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Items(Vec<String>),
    Table(TablePayload),
    Figure(FigurePayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePayload {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FigurePayload {
    pub image_ref: String,
    pub caption: String,
    /// One-based position among the source's figures.
    pub order: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_id: Option<String>,
}

impl FigurePayload {
    /// File name component of the image reference.
    pub fn image_basename(&self) -> &str {
        self.image_ref
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.image_ref.as_str())
    }
}
