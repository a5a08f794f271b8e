//! WordprocessingML helpers over [`Element`] trees: paragraph styles and
//! text, runs, numbering properties, tables and inline drawings.

use crate::xml::{Element, Node};

pub const W_P: &str = "w:p";
pub const W_R: &str = "w:r";
pub const W_T: &str = "w:t";
pub const W_PPR: &str = "w:pPr";
pub const W_RPR: &str = "w:rPr";
pub const W_TBL: &str = "w:tbl";
pub const W_TR: &str = "w:tr";
pub const W_TC: &str = "w:tc";
pub const W_SECT_PR: &str = "w:sectPr";

/// Subtrees whose text is not part of the paragraph's visible body text.
const HIDDEN_SUBTREES: &[&str] = &[W_PPR, W_RPR, "w:drawing", "w:pict", "mc:Fallback"];

pub fn is_paragraph(element: &Element) -> bool {
    element.is(W_P)
}

pub fn is_table(element: &Element) -> bool {
    element.is(W_TBL)
}

pub fn paragraph_style(paragraph: &Element) -> Option<&str> {
    paragraph
        .child(W_PPR)?
        .child("w:pStyle")?
        .attr("w:val")
}

pub fn set_paragraph_style(paragraph: &mut Element, style: &str) {
    let ppr = paragraph.ensure_child(W_PPR, 0);
    ppr.ensure_child("w:pStyle", 0).set_attr("w:val", style);
}

/// Visible text of a paragraph. Tabs become `\t`, breaks become `\n`.
pub fn paragraph_text(paragraph: &Element) -> String {
    let mut out = String::new();
    visible_text(paragraph, &mut out);
    out
}

fn visible_text(element: &Element, out: &mut String) {
    for child in element.elements() {
        match child.name.as_str() {
            W_T => out.push_str(&child.text()),
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" => out.push('\n'),
            name if HIDDEN_SUBTREES.contains(&name) => {}
            _ => visible_text(child, out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumPr {
    pub num_id: String,
    pub ilvl: u32,
}

pub fn num_pr(paragraph: &Element) -> Option<NumPr> {
    let num_pr = paragraph.child(W_PPR)?.child("w:numPr")?;
    let num_id = num_pr.child("w:numId")?.attr("w:val")?.to_string();
    let ilvl = num_pr
        .child("w:ilvl")
        .and_then(|ilvl| ilvl.attr("w:val"))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    Some(NumPr { num_id, ilvl })
}

/// Points the paragraph's numbering properties at `num_id`. Paragraphs
/// without numbering properties are left alone.
pub fn set_num_id(paragraph: &mut Element, num_id: &str) -> bool {
    let Some(num_pr) = paragraph
        .child_mut(W_PPR)
        .and_then(|ppr| ppr.child_mut("w:numPr"))
    else {
        return false;
    };
    num_pr.ensure_child("w:numId", 1).set_attr("w:val", num_id);
    true
}

pub fn has_drawing(paragraph: &Element) -> bool {
    paragraph
        .descendants()
        .any(|element| element.is("w:drawing") || element.is("w:pict"))
}

/// Removes section properties so a cloned paragraph does not start a new
/// page section.
pub fn strip_section_properties(paragraph: &mut Element) {
    if let Some(ppr) = paragraph.child_mut(W_PPR) {
        ppr.retain_elements(|child| !child.is(W_SECT_PR));
    }
}

pub fn run_style(run: &Element) -> Option<&str> {
    run.child(W_RPR)?.child("w:rStyle")?.attr("w:val")
}

/// Replaces the paragraph's content with a single run holding `text`. The
/// paragraph properties and the first run's formatting are kept.
pub fn set_paragraph_text(paragraph: &mut Element, text: &str) {
    replace_runs(paragraph, text, |_| false);
}

fn replace_runs(paragraph: &mut Element, text: &str, keep: impl Fn(&Element) -> bool) {
    let rpr = paragraph
        .elements()
        .filter(|child| !keep(child))
        .flat_map(|child| child.descendants())
        .filter(|element| element.is(W_R))
        .find(|run| run.child(W_T).is_some())
        .or_else(|| paragraph.find(W_R))
        .and_then(|run| run.child(W_RPR))
        .cloned();
    paragraph.retain_elements(|child| child.is(W_PPR) || keep(child));
    paragraph.children.retain(|node| !matches!(node, Node::Text(_)));
    if !text.is_empty() {
        paragraph.push(text_run(rpr, text));
    }
}

/// A run holding `text`, with tabs and line breaks expanded.
pub fn text_run(rpr: Option<Element>, text: &str) -> Element {
    let mut run = Element::new(W_R);
    if let Some(rpr) = rpr {
        run.push(rpr);
    }
    for (line_index, line) in text.split('\n').enumerate() {
        if line_index > 0 {
            run.push(Element::new("w:br"));
        }
        for (piece_index, piece) in line.split('\t').enumerate() {
            if piece_index > 0 {
                run.push(Element::new("w:tab"));
            }
            if !piece.is_empty() {
                run.push(text_element(piece));
            }
        }
    }
    run
}

fn text_element(text: &str) -> Element {
    let mut element = Element::new(W_T);
    let needs_preserve = text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.contains("  ");
    if needs_preserve {
        element.set_attr("xml:space", "preserve");
    }
    element.with_text(text)
}

pub fn new_paragraph(style: Option<&str>, text: &str) -> Element {
    let mut paragraph = Element::new(W_P);
    if let Some(style) = style {
        set_paragraph_style(&mut paragraph, style);
    }
    set_paragraph_text(&mut paragraph, text);
    paragraph
}

// Heading number runs.

pub fn is_number_run(element: &Element, number_style: &str) -> bool {
    element.is(W_R) && run_style(element) == Some(number_style)
}

fn is_tab_run(element: &Element) -> bool {
    element.is(W_R) && element.child("w:tab").is_some() && element.child(W_T).is_none()
}

pub fn has_number_run(paragraph: &Element, number_style: &str) -> bool {
    paragraph
        .elements()
        .any(|child| is_number_run(child, number_style))
}

pub fn number_run_text(paragraph: &Element, number_style: &str) -> Option<String> {
    paragraph
        .elements()
        .find(|child| is_number_run(child, number_style))
        .map(|run| paragraph_text(run).trim().to_string())
}

/// Rewrites the text of the number run. Returns false when there is none.
pub fn set_number_run_text(paragraph: &mut Element, number_style: &str, label: &str) -> bool {
    let Some(run) = paragraph
        .elements_mut()
        .find(|child| is_number_run(child, number_style))
    else {
        return false;
    };
    run.retain_elements(|child| child.is(W_RPR));
    run.push(text_element(label));
    true
}

/// Inserts a number run and a tab run right after the paragraph properties.
pub fn insert_number_run(paragraph: &mut Element, number_style: &str, label: &str) {
    let at = paragraph
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(e) if e.is(W_PPR)))
        .map(|index| index + 1)
        .unwrap_or(0);
    let number = Element::new(W_R)
        .with_child(
            Element::new(W_RPR).with_child(Element::new("w:rStyle").with_attr("w:val", number_style)),
        )
        .with_child(text_element(label));
    let tab = Element::new(W_R).with_child(Element::new("w:tab"));
    paragraph.children.insert(at, Node::Element(tab));
    paragraph.children.insert(at, Node::Element(number));
    paragraph.self_closing = false;
}

/// Heading text without the number run and the tab that follows it.
pub fn heading_title(paragraph: &Element, number_style: &str) -> String {
    let numbered = has_number_run(paragraph, number_style);
    let mut out = String::new();
    for child in paragraph.elements() {
        if child.is(W_PPR) || is_number_run(child, number_style) || (numbered && is_tab_run(child))
        {
            continue;
        }
        visible_text(child, &mut out);
    }
    out.trim().to_string()
}

/// Replaces the heading title, keeping any number run in front of it.
pub fn set_heading_title(paragraph: &mut Element, number_style: &str, title: &str) {
    let numbered = has_number_run(paragraph, number_style);
    replace_runs(paragraph, title, |child| {
        is_number_run(child, number_style) || (numbered && is_tab_run(child))
    });
}

// Tables.

pub fn table_rows(table: &Element) -> Vec<&Element> {
    table.children_named(W_TR).collect()
}

pub fn row_cells(row: &Element) -> Vec<&Element> {
    row.children_named(W_TC).collect()
}

pub fn cell_text(cell: &Element) -> String {
    cell.children_named(W_P)
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn row_texts(row: &Element) -> Vec<String> {
    row_cells(row).into_iter().map(cell_text).collect()
}

pub fn set_cell_text(cell: &mut Element, text: &str) {
    let mut seen_paragraph = false;
    cell.retain_elements(|child| {
        if child.is(W_P) {
            let first = !seen_paragraph;
            seen_paragraph = true;
            return first;
        }
        child.is("w:tcPr")
    });
    match cell.child_mut(W_P) {
        Some(paragraph) => set_paragraph_text(paragraph, text),
        None => cell.push(new_paragraph(None, text)),
    }
}

/// Writes `values` into the row's cells. Extra values are joined into the
/// last cell; missing values clear the remaining cells.
pub fn set_row_texts(row: &mut Element, values: &[String]) {
    let count = row.children_named(W_TC).count();
    if count == 0 {
        return;
    }
    for (index, cell) in row.elements_mut().filter(|child| child.is(W_TC)).enumerate() {
        let text = if index + 1 == count && values.len() > count {
            values[index..].join(" ")
        } else {
            values.get(index).cloned().unwrap_or_default()
        };
        set_cell_text(cell, &text);
    }
}

/// Replaces every row of the table with `rows`, placed where the first row
/// used to be.
pub fn replace_rows(table: &mut Element, rows: Vec<Element>) {
    let at = table
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(e) if e.is(W_TR)))
        .unwrap_or(table.children.len());
    table.retain_elements(|child| !child.is(W_TR));
    let at = at.min(table.children.len());
    table
        .children
        .splice(at..at, rows.into_iter().map(Node::Element));
    table.self_closing = false;
}

// Inline drawings.

pub fn blip_embed(paragraph: &Element) -> Option<&str> {
    paragraph
        .descendants()
        .find(|element| element.is("a:blip"))
        .and_then(|blip| blip.attr("r:embed"))
}

pub fn set_blip_embed(paragraph: &mut Element, relationship_id: &str) {
    paragraph.visit_mut(&mut |element| {
        if element.is("a:blip") {
            element.set_attr("r:embed", relationship_id);
        }
    });
}

pub fn doc_pr(paragraph: &Element) -> Option<&Element> {
    paragraph.find("wp:docPr")
}

pub fn doc_pr_id(element: &Element) -> Option<u32> {
    doc_pr(element)?.attr("id")?.parse().ok()
}

/// Sets the drawing's non-visual properties. `id` is left alone when `None`.
pub fn set_doc_pr(paragraph: &mut Element, id: Option<u32>, name: &str) {
    paragraph.visit_mut(&mut |element| {
        if element.is("wp:docPr") {
            if let Some(id) = id {
                element.set_attr("id", id.to_string());
            }
            element.set_attr("name", name);
        }
    });
}

/// Highest drawing id used anywhere under `element`.
pub fn max_doc_pr_id(element: &Element) -> u32 {
    element
        .descendants()
        .filter(|candidate| candidate.is("wp:docPr"))
        .filter_map(|doc_pr| doc_pr.attr("id")?.parse().ok())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    fn element(xml: &str) -> Element {
        XmlDocument::parse("test", xml).unwrap().root
    }

    #[test]
    fn paragraph_text_skips_properties_and_expands_tabs() {
        let p = element(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left"/></w:tabs></w:pPr><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t></w:r><w:hyperlink><w:r><w:t>C</w:t></w:r></w:hyperlink></w:p>"#,
        );
        assert_eq!(paragraph_text(&p), "A\tBC");
    }

    #[test]
    fn set_text_keeps_first_run_format() {
        let mut p = element(
            r#"<w:p><w:pPr><w:pStyle w:val="ListBullet"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>Old</w:t></w:r><w:r><w:t> tail</w:t></w:r></w:p>"#,
        );
        set_paragraph_text(&mut p, " New  item");
        assert_eq!(
            p.to_xml(),
            r#"<w:p><w:pPr><w:pStyle w:val="ListBullet"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve"> New  item</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn number_runs_are_kept_when_retitling() {
        let mut p = element(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:rPr><w:rStyle w:val="SectionNumber"/></w:rPr><w:t>4.1</w:t></w:r><w:r><w:tab/></w:r><w:r><w:t>Old title</w:t></w:r></w:p>"#,
        );
        assert_eq!(heading_title(&p, "SectionNumber"), "Old title");
        set_heading_title(&mut p, "SectionNumber", "New title");
        assert!(set_number_run_text(&mut p, "SectionNumber", "5.1"));
        assert_eq!(number_run_text(&p, "SectionNumber").as_deref(), Some("5.1"));
        assert_eq!(paragraph_text(&p), "5.1\tNew title");
    }

    #[test]
    fn inserted_number_run_precedes_title() {
        let mut p = element(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Usage</w:t></w:r></w:p>"#,
        );
        insert_number_run(&mut p, "SectionNumber", "3");
        assert_eq!(paragraph_text(&p), "3\tUsage");
        assert_eq!(heading_title(&p, "SectionNumber"), "Usage");
    }

    #[test]
    fn row_texts_fold_extra_values_into_last_cell() {
        let mut row = element(
            r#"<w:tr><w:tc><w:tcPr/><w:p><w:r><w:t>a</w:t></w:r></w:p><w:p/></w:tc><w:tc><w:p/></w:tc></w:tr>"#,
        );
        set_row_texts(&mut row, &["x".into(), "y".into(), "z".into()]);
        assert_eq!(row_texts(&row), vec!["x", "y z"]);
        assert_eq!(row_cells(&row)[0].children_named(W_P).count(), 1);
    }

    #[test]
    fn numbering_properties_are_read_and_repointed() {
        let mut p = element(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="7"/></w:numPr></w:pPr></w:p>"#,
        );
        assert_eq!(
            num_pr(&p),
            Some(NumPr {
                num_id: "7".into(),
                ilvl: 1
            })
        );
        assert!(set_num_id(&mut p, "12"));
        assert_eq!(num_pr(&p).unwrap().num_id, "12");
    }
}
