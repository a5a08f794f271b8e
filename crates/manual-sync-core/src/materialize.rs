//! Gives sections that only exist as a marker in the target a heading and
//! one marker per block, so the following phases can anchor their content.

use std::cmp::Reverse;

use manual_sync_docx::{wordml, BodyElement, Docx, Element};
use manual_sync_source::{keys_match, BlockKind, MarkerKind, Section, SourceDocument};

use crate::classify::{Classifier, ElementKind};

#[derive(Debug, Default)]
pub struct Materialized {
    pub sections: Vec<String>,
    pub warnings: Vec<String>,
    pub changes: usize,
}

pub fn materialize_sections(
    docx: &mut Docx,
    source: &SourceDocument,
    classifier: &Classifier<'_>,
) -> Materialized {
    let mut outcome = Materialized::default();
    let kinds = classifier.classify_body(docx);
    let content_end = docx.body().content_end().min(kinds.len());
    let mut inserts: Vec<(usize, usize, Vec<BodyElement>)> = Vec::new();

    for (position, section) in source.sections.iter().enumerate() {
        let has_heading = kinds.iter().any(|kind| match kind {
            ElementKind::Heading { title, .. } => keys_match(title, &section.title),
            _ => false,
        });
        if has_heading {
            continue;
        }
        let Some(marker) = (0..content_end).find(|&index| {
            kinds[index]
                .marker()
                .is_some_and(|marker| marker.kind == MarkerKind::Block && marker.id == section.id)
        }) else {
            continue;
        };

        let Some(heading) = heading_for(docx, &kinds, classifier, section) else {
            outcome.warnings.push(format!(
                "section '{}' has a marker but the target has no heading to copy",
                section.id
            ));
            continue;
        };
        let Some(marker_paragraph) = docx.body().element(marker) else {
            continue;
        };

        let mut elements = vec![BodyElement::new(heading)];
        for block in &section.blocks {
            let (kind, id) = match (block.kind, block.figure()) {
                (BlockKind::Figure, Some(figure)) => (
                    MarkerKind::Figure,
                    figure.figure_id.clone().unwrap_or_else(|| block.id.clone()),
                ),
                _ => (MarkerKind::Block, block.id.clone()),
            };
            let exists = kinds.iter().enumerate().any(|(index, element)| {
                index != marker
                    && element
                        .marker()
                        .is_some_and(|found| found.kind == kind && found.id == id)
            });
            if exists {
                continue;
            }
            let mut paragraph = marker_paragraph.clone();
            wordml::set_paragraph_text(&mut paragraph, &classifier.matcher().token(kind, &id));
            elements.push(BodyElement::new(paragraph));
        }

        tracing::info!(section = %section.id, elements = elements.len(), "section materialized");
        outcome.changes += elements.len();
        outcome.sections.push(section.id.clone());
        inserts.push((marker + 1, position, elements));
    }

    inserts.sort_by_key(|(at, position, _)| (Reverse(*at), Reverse(*position)));
    for (at, _, elements) in inserts {
        docx.body_mut().splice(at..at, elements);
    }
    outcome
}

/// A heading for `section` cloned from an existing one: same level with a
/// number run first, then same level, then any numbered heading restyled,
/// then any heading.
fn heading_for(
    docx: &Docx,
    kinds: &[ElementKind],
    classifier: &Classifier<'_>,
    section: &Section,
) -> Option<Element> {
    let styles = classifier.styles();
    let number_style = styles.number_run_style.as_str();
    let headings: Vec<(usize, u8, bool)> = kinds
        .iter()
        .enumerate()
        .filter_map(|(index, kind)| {
            let level = kind.heading_level()?;
            let element = docx.body().element(index)?;
            Some((index, level, wordml::has_number_run(element, number_style)))
        })
        .collect();

    let pick = headings
        .iter()
        .find(|(_, level, numbered)| *level == section.level && *numbered)
        .or_else(|| headings.iter().find(|(_, level, _)| *level == section.level))
        .or_else(|| headings.iter().find(|(_, _, numbered)| *numbered))
        .or_else(|| headings.first())?;
    let (index, level, _) = *pick;

    let mut heading = docx.body().element(index)?.clone();
    wordml::strip_section_properties(&mut heading);
    if level != section.level {
        wordml::set_paragraph_style(&mut heading, &styles.heading_style(section.level));
        set_outline_level(&mut heading, section.level);
    }
    wordml::set_heading_title(&mut heading, number_style, &section.title);
    Some(heading)
}

/// Moves an auto-numbered heading to the numbering level of `level`.
fn set_outline_level(heading: &mut Element, level: u8) {
    if let Some(ilvl) = heading
        .child_mut(wordml::W_PPR)
        .and_then(|ppr| ppr.child_mut("w:numPr"))
        .and_then(|num_pr| num_pr.child_mut("w:ilvl"))
    {
        ilvl.set_attr("w:val", level.saturating_sub(1).to_string());
    }
}
