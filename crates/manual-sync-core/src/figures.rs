//! Places source figures into the target: swaps image media, rewrites
//! captions, creates images behind bare figure markers and finally moves
//! figure groups so they appear in source order.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use manual_sync_config::FigureSettings;
use manual_sync_docx::{
    image_content_type, wordml, BodyElement, Docx, Element, IMAGE_RELATIONSHIP,
};
use manual_sync_source::{collapse_whitespace, Block, FigurePayload, MarkerKind, SourceDocument};

use crate::classify::{Classifier, ElementKind};
use crate::error::{SyncError, SyncResult};

/// A figure in the target: an optional marker paragraph, the image
/// paragraph and an optional caption right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FigureGroup {
    pub marker: Option<(usize, String)>,
    pub drawing: Option<usize>,
    pub caption: Option<usize>,
}

impl FigureGroup {
    pub fn span(&self) -> Range<usize> {
        let start = self
            .marker
            .as_ref()
            .map(|(index, _)| *index)
            .or(self.drawing)
            .unwrap_or(0);
        let last = self.caption.or(self.drawing).unwrap_or(start);
        start..last + 1
    }

    pub fn marker_id(&self) -> Option<&str> {
        self.marker.as_ref().map(|(_, id)| id.as_str())
    }
}

pub fn figure_groups(kinds: &[ElementKind]) -> Vec<FigureGroup> {
    let mut groups = Vec::new();
    let mut index = 0;
    while index < kinds.len() {
        let marker = match &kinds[index] {
            ElementKind::Marker(marker) if marker.kind == MarkerKind::Figure => {
                Some((index, marker.id.clone()))
            }
            ElementKind::Drawing => None,
            _ => {
                index += 1;
                continue;
            }
        };
        let mut next = if marker.is_some() { index + 1 } else { index };
        let mut group = FigureGroup {
            marker,
            drawing: None,
            caption: None,
        };
        if kinds.get(next) == Some(&ElementKind::Drawing) {
            group.drawing = Some(next);
            next += 1;
            if kinds.get(next) == Some(&ElementKind::Caption) {
                group.caption = Some(next);
                next += 1;
            }
        }
        groups.push(group);
        index = next;
    }
    groups
}

/// Id a figure answers to in figure markers.
fn figure_key<'b>(block: &'b Block, figure: &'b FigurePayload) -> &'b str {
    figure.figure_id.as_deref().unwrap_or(block.id.as_str())
}

#[derive(Debug, Default)]
pub struct FigureOutcome {
    pub matched: Vec<String>,
    pub placed: Vec<String>,
    pub failures: Vec<SyncError>,
    pub orphans: Vec<String>,
    pub changes: usize,
}

pub struct FigurePlacer<'a> {
    classifier: &'a Classifier<'a>,
    settings: &'a FigureSettings,
    base_dir: &'a Path,
}

struct Insert {
    at: usize,
    order: usize,
    elements: Vec<BodyElement>,
}

enum ImageUpdate {
    Unchanged,
    Overwritten,
    Relinked(String),
}

impl<'a> FigurePlacer<'a> {
    pub fn new(
        classifier: &'a Classifier<'a>,
        settings: &'a FigureSettings,
        base_dir: &'a Path,
    ) -> Self {
        Self {
            classifier,
            settings,
            base_dir,
        }
    }

    pub fn place(&self, docx: &mut Docx, source: &SourceDocument) -> SyncResult<FigureOutcome> {
        let mut outcome = FigureOutcome::default();
        let figures: Vec<(&Block, &FigurePayload)> = source
            .figures()
            .into_iter()
            .filter_map(|block| block.figure().map(|figure| (block, figure)))
            .collect();

        let kinds = self.classifier.classify_body(docx);
        let groups = figure_groups(&kinds);
        let known: HashSet<&str> = figures
            .iter()
            .flat_map(|(block, figure)| [block.id.as_str(), figure_key(block, figure)])
            .collect();
        outcome.orphans = groups
            .iter()
            .filter_map(FigureGroup::marker_id)
            .filter(|id| !known.contains(id))
            .map(str::to_string)
            .collect();

        let assignments = assign_groups(docx, &groups, &figures);
        let mut next_doc_pr = docx
            .body()
            .iter()
            .map(wordml::max_doc_pr_id)
            .max()
            .unwrap_or(0);
        let mut inserts: Vec<Insert> = Vec::new();
        let mut settled: Vec<usize> = Vec::new();

        for (position, (&(block, figure), assigned)) in
            figures.iter().zip(&assignments).enumerate()
        {
            let Some(group_index) = *assigned else {
                outcome.failures.push(SyncError::not_found(
                    &block.id,
                    format!(
                        "no figure marker '{}' and no image named '{}'",
                        figure_key(block, figure),
                        figure.image_basename()
                    ),
                ));
                continue;
            };
            let group = &groups[group_index];
            let Some(path) = resolve_image(self.base_dir, &figure.image_ref) else {
                outcome.failures.push(SyncError::ImageMissing {
                    block_id: block.id.clone(),
                    path: self.base_dir.join(&figure.image_ref),
                });
                continue;
            };
            let Ok(bytes) = fs::read(&path) else {
                outcome.failures.push(SyncError::ImageMissing {
                    block_id: block.id.clone(),
                    path,
                });
                continue;
            };
            let caption =
                caption_text(&self.settings.caption_prefix, settled.len() + 1, &figure.caption);

            let placed = match group.drawing {
                Some(drawing) => {
                    let (placed, changes) = self.update_existing(
                        docx,
                        block,
                        figure,
                        group,
                        drawing,
                        &path,
                        bytes,
                        &caption,
                        &kinds,
                        &mut inserts,
                    )?;
                    outcome.changes += changes;
                    placed
                }
                None => {
                    let Some((marker_index, _)) = group.marker.as_ref() else {
                        continue;
                    };
                    let built = self.build_new(
                        docx,
                        block,
                        figure,
                        &path,
                        bytes,
                        &caption,
                        &kinds,
                        &mut next_doc_pr,
                    );
                    match built {
                        Ok(elements) => {
                            outcome.changes += elements.len();
                            inserts.push(Insert {
                                at: marker_index + 1,
                                order: block.order,
                                elements,
                            });
                            true
                        }
                        Err(err) => {
                            outcome.failures.push(err);
                            continue;
                        }
                    }
                }
            };

            outcome.matched.push(block.id.clone());
            if placed {
                outcome.placed.push(block.id.clone());
            }
            settled.push(position);
        }

        inserts.sort_by_key(|insert| (Reverse(insert.at), Reverse(insert.order)));
        for insert in inserts {
            docx.body_mut().splice(insert.at..insert.at, insert.elements);
        }

        let settled_figures: Vec<(&Block, &FigurePayload)> =
            settled.iter().map(|&position| figures[position]).collect();
        outcome.changes += self.restore_order(docx, &settled_figures);
        Ok(outcome)
    }

    /// Updates the image and caption of a figure already in the target.
    /// Returns whether the image changed and how many elements changed.
    #[allow(clippy::too_many_arguments)]
    fn update_existing(
        &self,
        docx: &mut Docx,
        block: &Block,
        figure: &FigurePayload,
        group: &FigureGroup,
        drawing: usize,
        path: &Path,
        bytes: Vec<u8>,
        caption: &str,
        kinds: &[ElementKind],
        inserts: &mut Vec<Insert>,
    ) -> SyncResult<(bool, usize)> {
        let mut changes = 0;
        let embed = docx
            .body()
            .element(drawing)
            .and_then(wordml::blip_embed)
            .map(str::to_string);
        let update = install_image(docx, embed.as_deref(), figure_key(block, figure), path, bytes)?;
        let name = figure.image_basename().to_string();

        if let Some(item) = docx.body_mut().get_mut(drawing) {
            let current_name = wordml::doc_pr(item.element())
                .and_then(|doc_pr| doc_pr.attr("name"))
                .map(str::to_string);
            let renamed = current_name.as_deref() != Some(name.as_str());
            if let ImageUpdate::Relinked(rel) = &update {
                wordml::set_blip_embed(item.element_mut(), rel);
            }
            if renamed {
                wordml::set_doc_pr(item.element_mut(), None, &name);
            }
            if renamed || matches!(update, ImageUpdate::Relinked(_)) {
                changes += 1;
            }
        }

        match group.caption {
            Some(index) => {
                if let Some(item) = docx.body_mut().get_mut(index) {
                    let current = collapse_whitespace(&wordml::paragraph_text(item.element()));
                    if current != caption {
                        wordml::set_paragraph_text(item.element_mut(), caption);
                        changes += 1;
                    }
                }
            }
            None if !figure.caption.is_empty() => {
                let paragraph = self.caption_paragraph(docx, kinds, caption);
                inserts.push(Insert {
                    at: drawing + 1,
                    order: block.order,
                    elements: vec![BodyElement::new(paragraph)],
                });
                changes += 1;
            }
            None => {}
        }

        let placed = !matches!(update, ImageUpdate::Unchanged);
        if placed {
            tracing::debug!(figure = %block.id, image = %path.display(), "image replaced");
        }
        Ok((placed, changes))
    }

    /// Image and caption paragraphs for a figure marker with no image yet,
    /// cloned from the first image and caption in the document.
    #[allow(clippy::too_many_arguments)]
    fn build_new(
        &self,
        docx: &mut Docx,
        block: &Block,
        figure: &FigurePayload,
        path: &Path,
        bytes: Vec<u8>,
        caption: &str,
        kinds: &[ElementKind],
        next_doc_pr: &mut u32,
    ) -> SyncResult<Vec<BodyElement>> {
        let template = kinds
            .iter()
            .position(|kind| *kind == ElementKind::Drawing)
            .and_then(|index| docx.body().element(index))
            .cloned()
            .ok_or_else(|| {
                SyncError::style_clone(&block.id, "the target has no image to copy formatting from")
            })?;

        let mut drawing = template;
        wordml::strip_section_properties(&mut drawing);
        let embed = wordml::blip_embed(&drawing).map(str::to_string);
        match install_image(docx, embed.as_deref(), figure_key(block, figure), path, bytes)? {
            ImageUpdate::Relinked(rel) => wordml::set_blip_embed(&mut drawing, &rel),
            ImageUpdate::Overwritten | ImageUpdate::Unchanged => {}
        }
        *next_doc_pr += 1;
        wordml::set_doc_pr(&mut drawing, Some(*next_doc_pr), figure.image_basename());

        let mut elements = vec![BodyElement::new(drawing)];
        if !figure.caption.is_empty() {
            elements.push(BodyElement::new(self.caption_paragraph(docx, kinds, caption)));
        }
        tracing::debug!(figure = %block.id, "image created behind marker");
        Ok(elements)
    }

    fn caption_paragraph(&self, docx: &Docx, kinds: &[ElementKind], text: &str) -> Element {
        let template = kinds
            .iter()
            .position(|kind| *kind == ElementKind::Caption)
            .and_then(|index| docx.body().element(index));
        match template {
            Some(template) => {
                let mut paragraph = template.clone();
                wordml::strip_section_properties(&mut paragraph);
                wordml::set_paragraph_text(&mut paragraph, text);
                paragraph
            }
            None => {
                let styles = self.classifier.styles();
                let style = styles.caption_styles.first().map(String::as_str);
                wordml::new_paragraph(style, text)
            }
        }
    }

    /// Moves figure groups into the slots they already occupy so that they
    /// read in source order. Returns the number of moved elements.
    fn restore_order(&self, docx: &mut Docx, figures: &[(&Block, &FigurePayload)]) -> usize {
        let kinds = self.classifier.classify_body(docx);
        let groups = figure_groups(&kinds);
        let spans: Vec<Range<usize>> = assign_groups(docx, &groups, figures)
            .into_iter()
            .flatten()
            .map(|index| groups[index].span())
            .collect();
        if spans.windows(2).all(|pair| pair[0].start < pair[1].start) {
            return 0;
        }

        let contents: Vec<Vec<BodyElement>> = spans
            .iter()
            .map(|span| docx.body().items()[span.clone()].to_vec())
            .collect();
        let mut slots = spans.clone();
        slots.sort_by_key(|slot| slot.start);

        let mut moved = 0;
        for (slot, content) in slots.iter().zip(contents).rev() {
            moved += content.len();
            docx.body_mut().splice(slot.clone(), content);
        }
        tracing::info!(figures = spans.len(), "figures reordered to source order");
        moved
    }
}

/// Whether the matched figures of `source` read in source order.
pub fn figure_order_holds(
    docx: &Docx,
    classifier: &Classifier<'_>,
    source: &SourceDocument,
) -> bool {
    let figures: Vec<(&Block, &FigurePayload)> = source
        .figures()
        .into_iter()
        .filter_map(|block| block.figure().map(|figure| (block, figure)))
        .collect();
    let kinds = classifier.classify_body(docx);
    let groups = figure_groups(&kinds);
    let starts: Vec<usize> = assign_groups(docx, &groups, &figures)
        .into_iter()
        .flatten()
        .map(|index| groups[index].span().start)
        .collect();
    starts.windows(2).all(|pair| pair[0] < pair[1])
}

/// Matches each figure to a target group, by marker first and then by
/// image file name. A group serves at most one figure.
fn assign_groups(
    docx: &Docx,
    groups: &[FigureGroup],
    figures: &[(&Block, &FigurePayload)],
) -> Vec<Option<usize>> {
    let mut taken: HashSet<usize> = HashSet::new();
    let mut assigned = vec![None; figures.len()];

    for (slot, (block, figure)) in figures.iter().enumerate() {
        let key = figure_key(block, figure);
        let found = (0..groups.len()).find(|&index| {
            let group = &groups[index];
            !taken.contains(&index)
                && group
                    .marker_id()
                    .is_some_and(|id| id == key || id == block.id)
        });
        if let Some(index) = found {
            taken.insert(index);
            assigned[slot] = Some(index);
        }
    }

    for (slot, (_, figure)) in figures.iter().enumerate() {
        if assigned[slot].is_some() {
            continue;
        }
        let wanted = figure.image_basename();
        let found = (0..groups.len()).find(|&index| {
            let group = &groups[index];
            !taken.contains(&index)
                && group.marker.is_none()
                && group
                    .drawing
                    .and_then(|drawing| docx.body().element(drawing))
                    .is_some_and(|element| {
                        image_names(docx, element)
                            .iter()
                            .any(|name| names_match(name, wanted))
                    })
        });
        if let Some(index) = found {
            taken.insert(index);
            assigned[slot] = Some(index);
        }
    }

    assigned
}

/// File names an image paragraph is known by: its media part and the name
/// and description of the drawing.
fn image_names(docx: &Docx, paragraph: &Element) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(part) = wordml::blip_embed(paragraph).and_then(|id| docx.relationship_part(id)) {
        names.push(basename(&part).to_string());
    }
    if let Some(doc_pr) = wordml::doc_pr(paragraph) {
        for attr in ["name", "descr"] {
            if let Some(value) = doc_pr.attr(attr) {
                names.push(basename(value).to_string());
            }
        }
    }
    names
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn names_match(left: &str, right: &str) -> bool {
    !left.is_empty()
        && (left.eq_ignore_ascii_case(right) || stem(left).eq_ignore_ascii_case(stem(right)))
}

fn caption_text(prefix: &str, number: usize, caption: &str) -> String {
    let caption = collapse_whitespace(caption);
    if caption.is_empty() {
        format!("{prefix} {number}.")
    } else {
        format!("{prefix} {number}. {caption}")
    }
}

/// Resolves an image reference against `base_dir`. References without an
/// extension also try the usual screenshot formats.
pub fn resolve_image(base_dir: &Path, image_ref: &str) -> Option<PathBuf> {
    let path = base_dir.join(image_ref);
    if path.is_file() {
        return Some(path);
    }
    if path.extension().is_some() {
        return None;
    }
    ["png", "jpg", "jpeg"]
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Writes the image bytes into the package unless the current media part
/// already holds them.
fn install_image(
    docx: &mut Docx,
    embed: Option<&str>,
    key: &str,
    path: &Path,
    bytes: Vec<u8>,
) -> SyncResult<ImageUpdate> {
    let current_part = embed.and_then(|id| docx.relationship_part(id));
    if let Some(part) = current_part.as_deref() {
        if docx.part(part) == Some(bytes.as_slice()) {
            return Ok(ImageUpdate::Unchanged);
        }
    }

    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "png".to_string());
    let file_name = format!("sync_{}.{ext}", media_stem(key));
    let part_name = format!("word/media/{file_name}");

    docx.put_part(&part_name, bytes)?;
    docx.content_types_mut()
        .ensure_default(&ext, image_content_type(&ext));
    if current_part.as_deref() == Some(part_name.as_str()) {
        return Ok(ImageUpdate::Overwritten);
    }
    let rel = docx
        .relationships_mut()
        .add(IMAGE_RELATIONSHIP, &format!("media/{file_name}"));
    Ok(ImageUpdate::Relinked(rel))
}

fn media_stem(id: &str) -> String {
    id.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_sync_source::MarkerMatcher;
    use manual_sync_test_support::{png_bytes, test_config, DocxFixture};

    #[test]
    fn groups_collect_marker_image_and_caption() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let docx = Docx::from_bytes(
            &DocxFixture::new()
                .marker("[[IMG:home]]")
                .figure("home.png", png_bytes(1), "Figure 1. Home")
                .paragraph("text")
                .image("bare.png", png_bytes(2))
                .marker("[[IMG:empty]]")
                .build(),
        )
        .unwrap();

        let groups = figure_groups(&classifier.classify_body(&docx));
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].span(), 0..3);
        assert_eq!(groups[1].marker, None);
        assert_eq!(groups[1].span(), 4..5);
        assert_eq!(groups[2].marker_id(), Some("empty"));
        assert_eq!(groups[2].span(), 5..6);
    }

    #[test]
    fn names_match_ignores_case_and_extension() {
        assert!(names_match("Home.PNG", "home.png"));
        assert!(names_match("home.png", "home"));
        assert!(!names_match("home.png", "search.png"));
    }

    #[test]
    fn caption_text_numbers_figures() {
        assert_eq!(caption_text("Figure", 2, "Search  results"), "Figure 2. Search results");
        assert_eq!(caption_text("Abb.", 1, ""), "Abb. 1.");
    }

    #[test]
    fn media_names_are_sanitized() {
        assert_eq!(media_stem("fig:home page"), "fig_home_page");
    }
}
