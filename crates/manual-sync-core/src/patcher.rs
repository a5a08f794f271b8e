//! Rewrites anchored ranges with block content, cloning the target's own
//! formatting for every element it creates.

use std::cmp::Reverse;
use std::ops::Range;

use manual_sync_docx::wordml;
use manual_sync_docx::{Body, BodyElement, Element};
use manual_sync_source::{collapse_whitespace, Block, BlockKind, TablePayload};

use crate::classify::ElementKind;
use crate::error::{SyncError, SyncResult};
use crate::locator::Anchor;

/// Replacement of one body range.
#[derive(Debug, Clone)]
pub struct Edit {
    pub block_id: String,
    pub order: usize,
    pub range: Range<usize>,
    pub replacement: Vec<BodyElement>,
}

impl Edit {
    /// Body elements this edit creates, rewrites or removes.
    pub fn change_count(&self) -> usize {
        let rewritten = self
            .replacement
            .iter()
            .filter(|element| !element.is_pristine())
            .count();
        rewritten + self.range.len().saturating_sub(self.replacement.len())
    }
}

/// Computes the edit that puts `block` into `anchor`. Returns `None` when
/// the range already holds the block's content.
pub fn plan_edit(
    block: &Block,
    anchor: &Anchor,
    body: &Body,
    kinds: &[ElementKind],
) -> SyncResult<Option<Edit>> {
    let replacement = match block.kind {
        BlockKind::Paragraph => patch_paragraphs(block, &block.paragraphs(), anchor, body, kinds)?,
        BlockKind::BulletList | BlockKind::NumberedList => {
            patch_paragraphs(block, block.items(), anchor, body, kinds)?
        }
        BlockKind::Table => patch_table(block, anchor, body, kinds)?,
        BlockKind::Figure => {
            return Err(SyncError::Validation(format!(
                "figure block '{}' cannot be patched as text",
                block.id
            )))
        }
    };

    Ok(replacement.map(|replacement| Edit {
        block_id: block.id.clone(),
        order: block.order,
        range: anchor.range.clone(),
        replacement,
    }))
}

fn patch_paragraphs(
    block: &Block,
    texts: &[String],
    anchor: &Anchor,
    body: &Body,
    kinds: &[ElementKind],
) -> SyncResult<Option<Vec<BodyElement>>> {
    let existing = &body.items()[anchor.range.clone()];
    let wanted: Vec<String> = texts.iter().map(|text| collapse_whitespace(text)).collect();
    let current: Vec<String> = existing
        .iter()
        .map(|item| collapse_whitespace(&wordml::paragraph_text(item.element())))
        .collect();
    if current == wanted {
        return Ok(None);
    }

    let reference = match existing.first() {
        Some(first) => first.element(),
        None => document_reference(block, body, kinds)?,
    };

    let mut replacement = Vec::with_capacity(wanted.len());
    for (index, text) in wanted.iter().enumerate() {
        match existing.get(index) {
            Some(item) if current[index] == *text => replacement.push(item.clone()),
            Some(item) => {
                let mut item = item.clone();
                wordml::set_paragraph_text(item.element_mut(), text);
                replacement.push(item);
            }
            None => replacement.push(BodyElement::new(clone_with_text(reference, text))),
        }
    }
    Ok(Some(replacement))
}

fn clone_with_text(reference: &Element, text: &str) -> Element {
    let mut element = reference.clone();
    wordml::strip_section_properties(&mut element);
    wordml::set_paragraph_text(&mut element, text);
    element
}

/// First element anywhere in the body that can serve as a formatting model
/// for `block`, preferring an exact kind match.
fn document_reference<'b>(
    block: &Block,
    body: &'b Body,
    kinds: &[ElementKind],
) -> SyncResult<&'b Element> {
    let index = kinds
        .iter()
        .position(|kind| kind.matches_exactly(block.kind))
        .or_else(|| kinds.iter().position(|kind| kind.fits(block.kind)))
        .ok_or_else(|| {
            SyncError::style_clone(
                &block.id,
                format!("the target has no {} to copy formatting from", block.kind),
            )
        })?;
    body.element(index).ok_or_else(|| {
        SyncError::style_clone(&block.id, format!("reference element {index} is missing"))
    })
}

fn patch_table(
    block: &Block,
    anchor: &Anchor,
    body: &Body,
    kinds: &[ElementKind],
) -> SyncResult<Option<Vec<BodyElement>>> {
    let payload = block.table().ok_or_else(|| {
        SyncError::Validation(format!("table block '{}' has no table payload", block.id))
    })?;

    match body.items().get(anchor.range.clone()).and_then(|items| items.first()) {
        Some(existing) if !anchor.is_empty() => {
            let table = existing.element();
            let (header_rows, data_rows) = split_rows(table);
            if rows_match(&data_rows, &payload.rows) {
                return Ok(None);
            }
            let rows = rebuild_rows(block, payload, header_rows, &data_rows)?;
            let mut updated = existing.clone();
            wordml::replace_rows(updated.element_mut(), rows);
            Ok(Some(vec![updated]))
        }
        _ => {
            let template = document_reference(block, body, kinds)?;
            let (header_rows, data_rows) = split_rows(template);
            let mut header_rows: Vec<Element> = header_rows.into_iter().cloned().collect();
            if let Some(header) = header_rows.first_mut() {
                wordml::set_row_texts(header, &payload.header);
            }
            let rows = rebuild_rows(block, payload, header_rows.iter().collect(), &data_rows)?;
            let mut table = template.clone();
            wordml::replace_rows(&mut table, rows);
            Ok(Some(vec![BodyElement::new(table)]))
        }
    }
}

/// Header rows are the leading rows flagged as repeating headers, and at
/// least the first row.
fn split_rows(table: &Element) -> (Vec<&Element>, Vec<&Element>) {
    let rows = wordml::table_rows(table);
    let flagged = rows
        .iter()
        .take_while(|row| {
            row.child("w:trPr")
                .is_some_and(|props| props.child("w:tblHeader").is_some())
        })
        .count();
    let split = flagged.max(1).min(rows.len());
    let (header, data) = rows.split_at(split);
    (header.to_vec(), data.to_vec())
}

fn rows_match(data_rows: &[&Element], wanted: &[Vec<String>]) -> bool {
    data_rows.len() == wanted.len()
        && data_rows.iter().zip(wanted).all(|(row, values)| {
            let cells = wordml::row_texts(row);
            folded(values, cells.len())
                == cells
                    .iter()
                    .map(|cell| collapse_whitespace(cell))
                    .collect::<Vec<_>>()
        })
}

/// Values as they land in a row of `count` cells: surplus values share the
/// last cell, missing values are empty.
fn folded(values: &[String], count: usize) -> Vec<String> {
    let mut cells: Vec<String> = (0..count)
        .map(|index| values.get(index).map(|value| collapse_whitespace(value)).unwrap_or_default())
        .collect();
    if count > 0 && values.len() > count {
        cells[count - 1] = collapse_whitespace(&values[count - 1..].join(" "));
    }
    cells
}

fn rebuild_rows(
    block: &Block,
    payload: &TablePayload,
    header_rows: Vec<&Element>,
    data_rows: &[&Element],
) -> SyncResult<Vec<Element>> {
    let mut rows: Vec<Element> = header_rows.into_iter().cloned().collect();
    for (index, values) in payload.rows.iter().enumerate() {
        let base = data_rows
            .get(index)
            .or_else(|| data_rows.last())
            .ok_or_else(|| {
                SyncError::style_clone(&block.id, "the table has no data row to copy")
            })?;
        let mut row = (*base).clone();
        let cells = wordml::row_texts(&row);
        let current: Vec<String> = cells.iter().map(|cell| collapse_whitespace(cell)).collect();
        if index >= data_rows.len() || current != folded(values, cells.len()) {
            wordml::set_row_texts(&mut row, values);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Applies `edits` bottom to top so earlier indices stay valid. Insertions
/// at one point end up in source order. Returns the number of changed body
/// elements.
pub fn apply_edits(body: &mut Body, mut edits: Vec<Edit>) -> SyncResult<usize> {
    edits.sort_by_key(|edit| {
        (
            Reverse(edit.range.start),
            Reverse(edit.range.end),
            Reverse(edit.order),
        )
    });

    for pair in edits.windows(2) {
        let (later, earlier) = (&pair[0], &pair[1]);
        if earlier.range.end > later.range.start && !earlier.range.is_empty() {
            return Err(SyncError::Validation(format!(
                "edits for '{}' and '{}' overlap",
                earlier.block_id, later.block_id
            )));
        }
    }

    let mut changes = 0;
    for edit in edits {
        changes += edit.change_count();
        tracing::debug!(
            block = %edit.block_id,
            start = edit.range.start,
            end = edit.range.end,
            elements = edit.replacement.len(),
            "applying edit"
        );
        body.splice(edit.range, edit.replacement);
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::locator::AnchorMode;
    use manual_sync_docx::Docx;
    use manual_sync_source::{extract_str, MarkerMatcher, SourceDocument, SourceFormat};
    use manual_sync_test_support::{test_config, DocxFixture};

    fn setup(fixture: DocxFixture, manifest: &str) -> (SourceDocument, Docx, Vec<ElementKind>) {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let source = extract_str(manifest, SourceFormat::Manifest, &matcher).unwrap();
        let docx = Docx::from_bytes(&fixture.build()).unwrap();
        let kinds = Classifier::new(&config.styles, &matcher).classify_body(&docx);
        (source, docx, kinds)
    }

    fn anchor(id: &str, order: usize, range: Range<usize>) -> Anchor {
        Anchor {
            block_id: id.into(),
            order,
            range,
            mode: AnchorMode::Marker,
        }
    }

    #[test]
    fn list_grows_by_cloning_first_item() {
        let manifest = r#"[{"heading": "Steps", "blocks": [
            {"id": "steps", "kind": "numbered_list", "payload": ["Open", "Search", "Save"]}
        ]}]"#;
        let (source, mut docx, kinds) = setup(
            DocxFixture::new().marker("[[MANUAL_BLOCK:steps]]").numbered("Open").numbered("Close"),
            manifest,
        );
        let block = source.block("steps").unwrap();
        let edit = plan_edit(block, &anchor("steps", 0, 1..3), docx.body(), &kinds)
            .unwrap()
            .unwrap();
        assert!(edit.replacement[0].is_pristine());
        assert_eq!(edit.change_count(), 2);

        apply_edits(docx.body_mut(), vec![edit]).unwrap();
        let texts: Vec<String> = (1..4)
            .map(|index| wordml::paragraph_text(docx.body().element(index).unwrap()))
            .collect();
        assert_eq!(texts, vec!["Open", "Search", "Save"]);
        let num_pr = wordml::num_pr(docx.body().element(3).unwrap()).unwrap();
        assert_eq!(num_pr.num_id, "2");
    }

    #[test]
    fn unchanged_content_needs_no_edit() {
        let manifest = r#"[{"heading": "Intro", "blocks": [
            {"id": "intro", "kind": "paragraph", "payload": "Hello   world"}
        ]}]"#;
        let (source, docx, kinds) = setup(
            DocxFixture::new().marker("[[MANUAL_BLOCK:intro]]").paragraph("Hello world"),
            manifest,
        );
        let block = source.block("intro").unwrap();
        assert!(plan_edit(block, &anchor("intro", 0, 1..2), docx.body(), &kinds)
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_range_without_reference_is_a_style_clone_error() {
        let manifest = r#"[{"heading": "Intro", "blocks": [
            {"id": "intro", "kind": "bullet_list", "payload": ["a"]}
        ]}]"#;
        let (source, docx, kinds) = setup(
            DocxFixture::new().marker("[[MANUAL_BLOCK:intro]]").paragraph("x"),
            manifest,
        );
        let block = source.block("intro").unwrap();
        let err = plan_edit(block, &anchor("intro", 0, 1..1), docx.body(), &kinds).unwrap_err();
        assert!(matches!(err, SyncError::StyleClone { .. }));
    }

    #[test]
    fn table_keeps_header_and_resizes_data_rows() {
        let manifest = r#"[{"heading": "Keys", "blocks": [
            {"id": "keys", "kind": "table", "payload": {"header": ["Key", "Action"],
             "rows": [["/", "Focus search"], ["?", "Help"], ["g", "Go", "home"]]}}
        ]}]"#;
        let (source, mut docx, kinds) = setup(
            DocxFixture::new()
                .marker("[[MANUAL_BLOCK:keys]]")
                .table(&[&["KEY", "ACTION"], &["/", "Focus search"]]),
            manifest,
        );
        let block = source.block("keys").unwrap();
        let edit = plan_edit(block, &anchor("keys", 0, 1..2), docx.body(), &kinds)
            .unwrap()
            .unwrap();
        apply_edits(docx.body_mut(), vec![edit]).unwrap();

        let table = docx.body().element(1).unwrap();
        let rows = wordml::table_rows(table);
        assert_eq!(rows.len(), 4);
        assert_eq!(wordml::row_texts(rows[0]), vec!["KEY", "ACTION"]);
        assert_eq!(wordml::row_texts(rows[3]), vec!["g", "Go home"]);
        assert!(rows[2].find("w:tcPr").is_some());
    }

    #[test]
    fn overlapping_edits_are_rejected() {
        let edit = |id: &str, range: Range<usize>| Edit {
            block_id: id.into(),
            order: 0,
            range,
            replacement: Vec::new(),
        };
        let mut body = Body::parse(
            r#"<w:document xmlns:w="urn:w"><w:body><w:p/><w:p/><w:p/></w:body></w:document>"#,
        )
        .unwrap();
        let err = apply_edits(&mut body, vec![edit("a", 0..2), edit("b", 1..3)]).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
