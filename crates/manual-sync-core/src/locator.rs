//! Resolves source blocks to anchor ranges in the target body.
//!
//! A block is found by its marker paragraph first. Blocks whose id was
//! derived from a heading may fall back to matching that heading's text;
//! blocks with declared ids never do.

use std::ops::Range;

use manual_sync_docx::{wordml, Docx};
use manual_sync_source::{keys_match, normalize_key, Block, BlockKind, MarkerKind, SourceDocument};
use serde::Serialize;

use crate::classify::ElementKind;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    Marker,
    Heading,
}

/// Half-open range of body indices a block's content replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub block_id: String,
    pub order: usize,
    pub range: Range<usize>,
    pub mode: AnchorMode,
}

impl Anchor {
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Empty anchors touching either end of a range do not overlap it.
    pub fn overlaps(&self, other: &Anchor) -> bool {
        let (a, b) = (&self.range, &other.range);
        match (a.is_empty(), b.is_empty()) {
            (true, true) => false,
            (true, false) => b.start < a.start && a.start < b.end,
            (false, true) => a.start < b.start && b.start < a.end,
            (false, false) => a.start < b.end && b.start < a.end,
        }
    }
}

#[derive(Debug, Default)]
pub struct Located {
    pub anchors: Vec<Anchor>,
    pub failures: Vec<SyncError>,
}

/// Locates every non-figure block of `source`, in source order. Blocks
/// that cannot be resolved, or whose anchor would overlap an earlier one,
/// end up in `failures`.
pub fn locate_blocks(source: &SourceDocument, docx: &Docx, kinds: &[ElementKind]) -> Located {
    let locator = Locator::new(source, docx, kinds);
    let mut located = Located::default();

    for block in source.blocks().filter(|block| block.kind != BlockKind::Figure) {
        match locator.locate(block) {
            Ok(anchor) => {
                if let Some(other) = located.anchors.iter().find(|other| other.overlaps(&anchor)) {
                    located.failures.push(SyncError::AnchorOverlap {
                        block_id: block.id.clone(),
                        other: other.block_id.clone(),
                    });
                    continue;
                }
                tracing::debug!(
                    block = %block.id,
                    mode = ?anchor.mode,
                    start = anchor.range.start,
                    end = anchor.range.end,
                    "anchor resolved"
                );
                located.anchors.push(anchor);
            }
            Err(err) => located.failures.push(err),
        }
    }

    located
}

pub struct Locator<'a> {
    source: &'a SourceDocument,
    docx: &'a Docx,
    kinds: &'a [ElementKind],
    content_end: usize,
}

impl<'a> Locator<'a> {
    pub fn new(source: &'a SourceDocument, docx: &'a Docx, kinds: &'a [ElementKind]) -> Self {
        let content_end = docx.body().content_end().min(kinds.len());
        Self {
            source,
            docx,
            kinds,
            content_end,
        }
    }

    pub fn locate(&self, block: &Block) -> SyncResult<Anchor> {
        if let Some(marker) = self.find_marker(&block.id) {
            return self.locate_after_marker(block, marker);
        }
        if block.explicit_id {
            return Err(SyncError::not_found(
                &block.id,
                format!("no marker for declared id '{}'", block.id),
            ));
        }
        self.locate_under_heading(block)
    }

    /// A block's marker. A single-block section shares its id with the
    /// block, so a marker directly followed by a heading (a section marker)
    /// is only used when no other marker carries the id.
    fn find_marker(&self, id: &str) -> Option<usize> {
        let markers: Vec<usize> = (0..self.content_end)
            .filter(|&index| {
                self.kinds[index]
                    .marker()
                    .is_some_and(|marker| marker.kind == MarkerKind::Block && marker.id == id)
            })
            .collect();
        markers
            .iter()
            .copied()
            .find(|&index| !is_section_marker(self.kinds, index))
            .or_else(|| markers.first().copied())
    }

    fn locate_after_marker(&self, block: &Block, marker: usize) -> SyncResult<Anchor> {
        let enclosing = self.kinds[..marker]
            .iter()
            .rev()
            .find_map(ElementKind::heading_level);
        let region_end = (marker + 1..self.content_end)
            .find(|&index| {
                let kind = &self.kinds[index];
                kind.marker().is_some()
                    || kind
                        .heading_level()
                        .is_some_and(|level| enclosing.map_or(true, |outer| level <= outer))
            })
            .unwrap_or(self.content_end);
        let window_end = (marker + 1..region_end)
            .find(|&index| self.kinds[index].is_heading())
            .unwrap_or(region_end);
        let window = marker + 1..window_end;

        let range = if block.kind == BlockKind::Table {
            let tables = self.tables_in(window.clone());
            match self.pick_table(block, &tables, 0)? {
                Some(index) => index..index + 1,
                None => window.start..window.start,
            }
        } else {
            self.spans(block.kind, window.clone())
                .into_iter()
                .next()
                .unwrap_or(window.start..window.start)
        };

        Ok(Anchor {
            block_id: block.id.clone(),
            order: block.order,
            range,
            mode: AnchorMode::Marker,
        })
    }

    fn locate_under_heading(&self, block: &Block) -> SyncResult<Anchor> {
        let level = self
            .source
            .section(&block.section_id)
            .map(|section| section.level);
        let candidates: Vec<usize> = (0..self.content_end)
            .filter(|&index| match &self.kinds[index] {
                ElementKind::Heading { title, .. } => keys_match(title, &block.heading_key),
                _ => false,
            })
            .collect();
        let heading = candidates
            .iter()
            .copied()
            .find(|&index| self.kinds[index].heading_level() == level)
            .or_else(|| candidates.first().copied())
            .ok_or_else(|| SyncError::not_found(&block.id, self.missing_heading_detail(block)))?;

        let own_end = (heading + 1..self.content_end)
            .find(|&index| self.kinds[index].is_heading())
            .unwrap_or(self.content_end);
        let own = heading + 1..own_end;

        let range = if block.kind == BlockKind::Table {
            let tables = self.tables_in(own);
            match self.pick_table(block, &tables, block.kind_index)? {
                Some(index) => index..index + 1,
                None => {
                    return Err(SyncError::not_found(
                        &block.id,
                        format!("no table under heading '{}'", block.heading_key),
                    ))
                }
            }
        } else if block.kind == BlockKind::Paragraph {
            self.paragraph_range(block, own)
        } else {
            self.spans(block.kind, own.clone())
                .into_iter()
                .nth(block.kind_index)
                .unwrap_or(own.end..own.end)
        };

        Ok(Anchor {
            block_id: block.id.clone(),
            order: block.order,
            range,
            mode: AnchorMode::Heading,
        })
    }

    /// Heading-matched paragraph blocks that follow each other in the source
    /// share one run of target paragraphs. Each takes as many elements as it
    /// has paragraphs; the last of the group also takes what is left of the
    /// run.
    fn paragraph_range(&self, block: &Block, own: Range<usize>) -> Range<usize> {
        let Some((group, position)) = self.paragraph_group(block) else {
            return own.end..own.end;
        };
        let runs = self.spans(BlockKind::Paragraph, own.clone());
        let Some(run) = runs.get(group.index) else {
            return own.end..own.end;
        };
        let width = |member: &Block| member.paragraphs().len().max(1);
        let start = group.members[..position]
            .iter()
            .fold(run.start, |cursor, member| (cursor + width(*member)).min(run.end));
        let end = if position + 1 == group.members.len() {
            run.end
        } else {
            (start + width(block)).min(run.end)
        };
        start..end
    }

    /// The group of consecutive heading-matched paragraph blocks `block`
    /// belongs to, and its position inside that group.
    fn paragraph_group(&self, block: &Block) -> Option<(ParagraphGroup<'a>, usize)> {
        let section = self.source.section(&block.section_id)?;
        let mut groups: Vec<ParagraphGroup<'a>> = Vec::new();
        let mut open = false;
        for member in &section.blocks {
            let by_heading = member.kind == BlockKind::Paragraph
                && !member.explicit_id
                && self.find_marker(&member.id).is_none();
            if !by_heading {
                open = false;
                continue;
            }
            match groups.last_mut() {
                Some(group) if open => group.members.push(member),
                _ => groups.push(ParagraphGroup {
                    index: groups.len(),
                    members: vec![member],
                }),
            }
            open = true;
        }
        groups.into_iter().find_map(|group| {
            let position = group.members.iter().position(|member| member.id == block.id)?;
            Some((group, position))
        })
    }

    /// Contiguous runs of elements that can hold `kind`. Runs of the exact
    /// list flavour win over runs of any list paragraphs.
    fn spans(&self, kind: BlockKind, window: Range<usize>) -> Vec<Range<usize>> {
        let exact = runs(&self.kinds[..], window.clone(), |element| {
            element.matches_exactly(kind)
        });
        if !exact.is_empty() {
            return exact;
        }
        runs(&self.kinds[..], window, |element| element.fits(kind))
    }

    fn tables_in(&self, window: Range<usize>) -> Vec<usize> {
        window
            .filter(|&index| self.kinds[index] == ElementKind::Table)
            .collect()
    }

    /// The `nth` table when its header matches, else the first table whose
    /// header matches. Tables present but all mismatched are an error.
    fn pick_table(&self, block: &Block, tables: &[usize], nth: usize) -> SyncResult<Option<usize>> {
        let Some(expected) = block.table().map(|table| &table.header) else {
            return Ok(tables.get(nth).copied());
        };
        if tables.is_empty() {
            return Ok(None);
        }
        let header_fits = |index: usize| header_matches(expected, &self.header_of(index));
        if let Some(&index) = tables.get(nth).filter(|&&index| header_fits(index)) {
            return Ok(Some(index));
        }
        if let Some(&index) = tables.iter().find(|&&index| header_fits(index)) {
            return Ok(Some(index));
        }
        let found = self.header_of(tables.get(nth).copied().unwrap_or(tables[0]));
        Err(SyncError::TableHeaderMismatch {
            block_id: block.id.clone(),
            detail: format!(
                "expected [{}], found [{}]",
                expected.join(" | "),
                found.join(" | ")
            ),
        })
    }

    fn header_of(&self, index: usize) -> Vec<String> {
        self.docx
            .body()
            .element(index)
            .and_then(|table| wordml::table_rows(table).first().map(|row| wordml::row_texts(row)))
            .unwrap_or_default()
    }

    fn missing_heading_detail(&self, block: &Block) -> String {
        let closest = self
            .kinds
            .iter()
            .filter_map(|kind| match kind {
                ElementKind::Heading { title, .. } => Some(title),
                _ => None,
            })
            .map(|title| {
                (
                    strsim::normalized_levenshtein(&normalize_key(title), &block.heading_key),
                    title,
                )
            })
            .filter(|(score, _)| *score > 0.6)
            .max_by(|a, b| a.0.total_cmp(&b.0));
        match closest {
            Some((_, title)) => format!(
                "no marker and no heading '{}' (did you mean '{title}'?)",
                block.heading_key
            ),
            None => format!("no marker and no heading '{}'", block.heading_key),
        }
    }
}

struct ParagraphGroup<'a> {
    index: usize,
    members: Vec<&'a Block>,
}

pub(crate) fn is_section_marker(kinds: &[ElementKind], index: usize) -> bool {
    kinds[index].marker().is_some() && kinds.get(index + 1).is_some_and(ElementKind::is_heading)
}

fn runs(
    kinds: &[ElementKind],
    window: Range<usize>,
    fits: impl Fn(&ElementKind) -> bool,
) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for index in window.clone() {
        match (fits(&kinds[index]), start) {
            (true, None) => start = Some(index),
            (false, Some(begin)) => {
                spans.push(begin..index);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        spans.push(begin..window.end);
    }
    spans
}

/// Order-insensitive comparison of normalized header cells.
pub fn header_matches(expected: &[String], found: &[String]) -> bool {
    let mut left: Vec<String> = expected.iter().map(|cell| normalize_key(cell)).collect();
    let mut right: Vec<String> = found.iter().map(|cell| normalize_key(cell)).collect();
    left.sort();
    right.sort();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use manual_sync_source::{extract_str, MarkerMatcher, SourceFormat};
    use manual_sync_test_support::{test_config, DocxFixture};

    fn setup(fixture: DocxFixture, manifest: &str) -> (SourceDocument, Docx, Vec<ElementKind>) {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let source = extract_str(manifest, SourceFormat::Manifest, &matcher).unwrap();
        let docx = Docx::from_bytes(&fixture.build()).unwrap();
        let kinds = Classifier::new(&config.styles, &matcher).classify_body(&docx);
        (source, docx, kinds)
    }

    const MANIFEST: &str = r#"[
        {"heading": "Search", "level": 1, "blocks": [
            {"kind": "paragraph", "payload": "Type a query."},
            {"kind": "bullet_list", "payload": ["One", "Two"]}
        ]},
        {"heading": "Shortcuts", "level": 1, "blocks": [
            {"id": "keys", "kind": "table", "payload": {"header": ["Key", "Action"], "rows": [["/", "Focus"]]}}
        ]}
    ]"#;

    #[test]
    fn heading_mode_finds_nth_span_of_kind() {
        let fixture = DocxFixture::new()
            .heading(1, Some("1"), "Search")
            .paragraph("Old text")
            .bullet("Old")
            .heading(1, Some("2"), "Shortcuts")
            .marker("[[MANUAL_BLOCK:keys]]")
            .table(&[&["Action", "Key"], &["/", "Focus"]]);
        let (source, docx, kinds) = setup(fixture, MANIFEST);
        let located = locate_blocks(&source, &docx, &kinds);

        assert!(located.failures.is_empty(), "{:?}", located.failures);
        let ranges: Vec<Range<usize>> = located.anchors.iter().map(|a| a.range.clone()).collect();
        assert_eq!(ranges, vec![1..2, 2..3, 5..6]);
        assert_eq!(located.anchors[2].mode, AnchorMode::Marker);
    }

    #[test]
    fn heading_mode_paragraphs_take_one_element_each() {
        let manifest = r#"[
            {"heading": "Usage", "level": 1, "blocks": [
                {"kind": "paragraph", "payload": "First"},
                {"kind": "paragraph", "payload": "Second"},
                {"kind": "bullet_list", "payload": ["One"]},
                {"kind": "paragraph", "payload": "Closing"}
            ]}
        ]"#;
        let fixture = DocxFixture::new()
            .heading(1, Some("1"), "Usage")
            .paragraph("Old first")
            .paragraph("Old second")
            .bullet("Old")
            .paragraph("Old closing");
        let (source, docx, kinds) = setup(fixture, manifest);
        let located = locate_blocks(&source, &docx, &kinds);

        assert!(located.failures.is_empty(), "{:?}", located.failures);
        let ranges: Vec<Range<usize>> = located.anchors.iter().map(|a| a.range.clone()).collect();
        assert_eq!(ranges, vec![1..2, 2..3, 3..4, 4..5]);
    }

    #[test]
    fn last_paragraph_of_a_group_absorbs_surplus() {
        let manifest = r#"[
            {"heading": "Usage", "level": 1, "blocks": [
                {"kind": "paragraph", "payload": "First"},
                {"kind": "paragraph", "payload": "Second"}
            ]}
        ]"#;
        let fixture = DocxFixture::new()
            .heading(1, Some("1"), "Usage")
            .paragraph("a")
            .paragraph("b")
            .paragraph("c");
        let (source, docx, kinds) = setup(fixture, manifest);
        let located = locate_blocks(&source, &docx, &kinds);

        let ranges: Vec<Range<usize>> = located.anchors.iter().map(|a| a.range.clone()).collect();
        assert_eq!(ranges, vec![1..2, 2..4]);
    }

    #[test]
    fn declared_ids_need_their_marker() {
        let fixture = DocxFixture::new()
            .heading(1, Some("1"), "Search")
            .heading(1, Some("2"), "Shortcuts")
            .table(&[&["Key", "Action"], &["/", "Focus"]]);
        let (source, docx, kinds) = setup(fixture, MANIFEST);
        let located = locate_blocks(&source, &docx, &kinds);

        let ids: Vec<&str> = located.failures.iter().filter_map(|e| e.block_id()).collect();
        assert_eq!(ids, vec!["keys"]);
        assert_eq!(
            located.anchors.iter().map(|a| a.range.clone()).collect::<Vec<_>>(),
            vec![1..1, 1..1]
        );
    }

    #[test]
    fn header_mismatch_is_reported() {
        let fixture = DocxFixture::new()
            .marker("[[MANUAL_BLOCK:keys]]")
            .table(&[&["Name", "Value"], &["a", "b"]]);
        let (source, docx, kinds) = setup(fixture, MANIFEST);
        let block = source.block("keys").unwrap();
        let err = Locator::new(&source, &docx, &kinds).locate(block).unwrap_err();
        assert!(matches!(err, SyncError::TableHeaderMismatch { .. }));
    }

    #[test]
    fn missing_heading_names_closest_candidate() {
        let fixture = DocxFixture::new().heading(1, None, "Serch");
        let (source, docx, kinds) = setup(fixture, MANIFEST);
        let block = source.blocks().next().unwrap();
        let err = Locator::new(&source, &docx, &kinds).locate(block).unwrap_err();
        assert!(err.to_string().contains("did you mean 'Serch'"), "{err}");
    }

    #[test]
    fn empty_anchors_only_overlap_from_inside() {
        let anchor = |range: Range<usize>| Anchor {
            block_id: "x".into(),
            order: 0,
            range,
            mode: AnchorMode::Marker,
        };
        assert!(!anchor(3..3).overlaps(&anchor(3..5)));
        assert!(!anchor(5..5).overlaps(&anchor(3..5)));
        assert!(anchor(4..4).overlaps(&anchor(3..5)));
        assert!(anchor(3..6).overlaps(&anchor(5..7)));
    }
}
