//! Reads the role of each body element: heading, marker, list item, plain
//! paragraph, caption, image or table. Every phase of a run works from this
//! view of the target.

use manual_sync_config::StyleSettings;
use manual_sync_docx::wordml;
use manual_sync_docx::{Docx, Element, Numbering};
use manual_sync_source::normalize::split_manual_number;
use manual_sync_source::{BlockKind, Marker, MarkerMatcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Heading {
        level: u8,
        title: String,
        /// Displayed number, from the number run or a typed prefix.
        label: Option<String>,
    },
    Marker(Marker),
    BulletItem,
    NumberedItem,
    Plain,
    Blank,
    Caption,
    Drawing,
    Table,
    Other,
}

impl ElementKind {
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            ElementKind::Heading { level, .. } => Some(*level),
            _ => None,
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, ElementKind::Heading { .. })
    }

    pub fn marker(&self) -> Option<&Marker> {
        match self {
            ElementKind::Marker(marker) => Some(marker),
            _ => None,
        }
    }

    pub fn is_list_item(&self) -> bool {
        matches!(self, ElementKind::BulletItem | ElementKind::NumberedItem)
    }

    /// Whether the element can hold content of a block of `kind`.
    pub fn fits(&self, kind: BlockKind) -> bool {
        match kind {
            BlockKind::Paragraph => matches!(self, ElementKind::Plain),
            BlockKind::BulletList | BlockKind::NumberedList => self.is_list_item(),
            BlockKind::Table => matches!(self, ElementKind::Table),
            BlockKind::Figure => matches!(self, ElementKind::Drawing),
        }
    }

    /// Exact kind match, preferred when picking a formatting reference.
    pub fn matches_exactly(&self, kind: BlockKind) -> bool {
        match kind {
            BlockKind::BulletList => matches!(self, ElementKind::BulletItem),
            BlockKind::NumberedList => matches!(self, ElementKind::NumberedItem),
            other => self.fits(other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    styles: &'a StyleSettings,
    matcher: &'a MarkerMatcher,
}

impl<'a> Classifier<'a> {
    pub fn new(styles: &'a StyleSettings, matcher: &'a MarkerMatcher) -> Self {
        Self { styles, matcher }
    }

    pub fn styles(&self) -> &'a StyleSettings {
        self.styles
    }

    pub fn matcher(&self) -> &'a MarkerMatcher {
        self.matcher
    }

    pub fn classify(&self, element: &Element, numbering: Option<&Numbering>) -> ElementKind {
        if wordml::is_table(element) {
            return ElementKind::Table;
        }
        if !wordml::is_paragraph(element) {
            return ElementKind::Other;
        }

        let style = wordml::paragraph_style(element).unwrap_or("");
        if let Some(level) = self.styles.heading_level(style) {
            return self.heading(element, level);
        }

        let text = wordml::paragraph_text(element);
        if let Some(marker) = self.matcher.parse(&text) {
            return ElementKind::Marker(marker);
        }
        if wordml::has_drawing(element) {
            return ElementKind::Drawing;
        }
        if self.styles.is_caption_style(style) {
            return ElementKind::Caption;
        }
        if let Some(num_pr) = wordml::num_pr(element) {
            let format = numbering.and_then(|numbering| numbering.num_format(&num_pr.num_id, num_pr.ilvl));
            return match format {
                Some("bullet") => ElementKind::BulletItem,
                Some(_) => ElementKind::NumberedItem,
                None => list_kind_from_style(style).unwrap_or(ElementKind::NumberedItem),
            };
        }
        if let Some(kind) = list_kind_from_style(style) {
            return kind;
        }
        if text.trim().is_empty() {
            return ElementKind::Blank;
        }
        ElementKind::Plain
    }

    fn heading(&self, element: &Element, level: u8) -> ElementKind {
        let number_style = self.styles.number_run_style.as_str();
        let title = wordml::heading_title(element, number_style);
        if let Some(label) = wordml::number_run_text(element, number_style) {
            return ElementKind::Heading {
                level,
                title,
                label: Some(label),
            };
        }
        match split_manual_number(&title) {
            Some((label, rest)) => ElementKind::Heading {
                level,
                label: Some(label.to_string()),
                title: rest.to_string(),
            },
            None => ElementKind::Heading {
                level,
                title,
                label: None,
            },
        }
    }

    /// Kinds of every body element of `docx`, index-aligned with the body.
    pub fn classify_body(&self, docx: &Docx) -> Vec<ElementKind> {
        docx.body()
            .iter()
            .map(|element| self.classify(element, docx.numbering()))
            .collect()
    }
}

fn list_kind_from_style(style: &str) -> Option<ElementKind> {
    let folded: String = style
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if folded.contains("bullet") {
        Some(ElementKind::BulletItem)
    } else if folded.contains("listnumber") {
        Some(ElementKind::NumberedItem)
    } else {
        None
    }
}

/// One line per body element, used by `outline` and for dry-run diffs.
pub fn render_outline(docx: &Docx, classifier: &Classifier<'_>, with_indices: bool) -> String {
    let mut out = String::new();
    for (index, element) in docx.body().iter().enumerate() {
        let kind = classifier.classify(element, docx.numbering());
        let line = match &kind {
            ElementKind::Heading { level, title, label } => match label {
                Some(label) => format!("H{level} {label} {title}"),
                None => format!("H{level} {title}"),
            },
            ElementKind::Marker(marker) => {
                format!("marker {}", classifier.matcher().describe(marker))
            }
            ElementKind::BulletItem => format!("  - {}", excerpt(element)),
            ElementKind::NumberedItem => {
                let num_id = wordml::num_pr(element)
                    .map(|num_pr| num_pr.num_id)
                    .unwrap_or_default();
                format!("  # {} (list {num_id})", excerpt(element))
            }
            ElementKind::Plain => format!("  {}", excerpt(element)),
            ElementKind::Blank => continue,
            ElementKind::Caption => format!("  caption: {}", excerpt(element)),
            ElementKind::Drawing => {
                let media = wordml::blip_embed(element)
                    .and_then(|id| docx.relationship_part(id))
                    .unwrap_or_else(|| "?".to_string());
                format!("  image {media}")
            }
            ElementKind::Table => {
                let rows = wordml::table_rows(element);
                let header = rows
                    .first()
                    .map(|row| wordml::row_texts(row).join(" | "))
                    .unwrap_or_default();
                format!(
                    "  table [{header}] {} data row(s)",
                    rows.len().saturating_sub(1)
                )
            }
            ElementKind::Other => continue,
        };
        if with_indices {
            out.push_str(&format!("{index:>4} "));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn excerpt(paragraph: &Element) -> String {
    const LIMIT: usize = 60;
    let text = manual_sync_source::collapse_whitespace(&wordml::paragraph_text(paragraph));
    if text.chars().count() <= LIMIT {
        return text;
    }
    let mut cut: String = text.chars().take(LIMIT).collect();
    cut.push_str("...");
    cut
}
