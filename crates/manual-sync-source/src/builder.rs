//! Shared assembly of parsed sections into a `SourceDocument`.
//!
//! Both front ends (LaTeX and manifest) produce drafts; this module assigns
//! stable ids, figure numbers and per-kind indices, and rejects duplicate
//! declared ids.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::error::{SourceError, SourceResult};
use crate::model::{Block, BlockKind, Payload, Section, SourceDocument};
use crate::normalize::normalize_key;

#[derive(Debug, Clone)]
pub(crate) struct DraftSection {
    pub explicit_id: Option<String>,
    pub title: String,
    pub level: u8,
    pub blocks: Vec<DraftBlock>,
}

#[derive(Debug, Clone)]
pub(crate) struct DraftBlock {
    pub explicit_id: Option<String>,
    pub kind: BlockKind,
    pub payload: Payload,
}

pub(crate) fn assemble(
    origin: Option<PathBuf>,
    drafts: Vec<DraftSection>,
) -> SourceResult<SourceDocument> {
    let mut declared: HashSet<String> = HashSet::new();
    for draft in &drafts {
        let explicit = draft
            .explicit_id
            .iter()
            .chain(draft.blocks.iter().filter_map(|block| block.explicit_id.as_ref()));
        for id in explicit {
            if !declared.insert(id.clone()) {
                return Err(SourceError::DuplicateId { id: id.clone() });
            }
        }
    }

    let mut section_ids: HashSet<String> = HashSet::new();
    let mut block_ids: HashSet<String> = HashSet::new();
    let mut sections = Vec::with_capacity(drafts.len());
    let mut order = 0usize;
    let mut figure_number = 0usize;

    for draft in drafts {
        let heading_key = normalize_key(&draft.title);
        let explicit_section = draft.explicit_id.is_some();
        let section_id = match draft.explicit_id {
            Some(id) => id,
            None => unique(heading_key.clone(), &section_ids, &declared),
        };
        section_ids.insert(section_id.clone());

        let single = draft.blocks.len() == 1;
        let mut kind_counts: HashMap<BlockKind, usize> = HashMap::new();
        let mut label_counts: HashMap<&'static str, usize> = HashMap::new();
        let mut blocks = Vec::with_capacity(draft.blocks.len());

        for draft_block in draft.blocks {
            let kind_index = {
                let count = kind_counts.entry(draft_block.kind).or_default();
                *count += 1;
                *count - 1
            };
            let label_index = {
                let count = label_counts.entry(draft_block.kind.id_label()).or_default();
                *count += 1;
                *count
            };

            let explicit_block = draft_block.explicit_id.is_some();
            let id = match draft_block.explicit_id {
                Some(id) => id,
                None => {
                    let candidate = derived_block_id(
                        &heading_key,
                        single,
                        draft_block.kind,
                        label_index,
                        &draft_block.payload,
                    );
                    unique(candidate, &block_ids, &declared)
                }
            };
            block_ids.insert(id.clone());

            let mut payload = draft_block.payload;
            if let Payload::Figure(figure) = &mut payload {
                figure_number += 1;
                if figure.order == 0 {
                    figure.order = figure_number;
                }
            }

            blocks.push(Block {
                id,
                explicit_id: explicit_block,
                kind: draft_block.kind,
                order,
                heading_key: heading_key.clone(),
                section_id: section_id.clone(),
                kind_index,
                payload,
            });
            order += 1;
        }

        sections.push(Section {
            id: section_id,
            explicit_id: explicit_section,
            title: draft.title,
            level: draft.level,
            blocks,
        });
    }

    Ok(SourceDocument { origin, sections })
}

fn derived_block_id(
    heading_key: &str,
    single: bool,
    kind: BlockKind,
    label_index: usize,
    payload: &Payload,
) -> String {
    if single {
        return heading_key.to_string();
    }
    if let Payload::Table(table) = payload {
        if let Some(title) = table.title.as_deref() {
            let key = normalize_key(title);
            if !key.is_empty() {
                return key;
            }
        }
    }
    format!("{heading_key}/{}-{label_index}", kind.id_label())
}

fn unique(candidate: String, taken: &HashSet<String>, declared: &HashSet<String>) -> String {
    if !taken.contains(&candidate) && !declared.contains(&candidate) {
        return candidate;
    }
    let mut suffix = 2;
    loop {
        let next = format!("{candidate}~{suffix}");
        if !taken.contains(&next) && !declared.contains(&next) {
            return next;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FigurePayload, TablePayload};

    fn paragraph(text: &str) -> DraftBlock {
        DraftBlock {
            explicit_id: None,
            kind: BlockKind::Paragraph,
            payload: Payload::Text(text.into()),
        }
    }

    #[test]
    fn single_block_takes_section_key() {
        let doc = assemble(
            None,
            vec![DraftSection {
                explicit_id: None,
                title: "2. Scope".into(),
                level: 1,
                blocks: vec![paragraph("hello")],
            }],
        )
        .unwrap();
        assert_eq!(doc.sections[0].id, "scope");
        assert_eq!(doc.sections[0].blocks[0].id, "scope");
        assert_eq!(doc.sections[0].blocks[0].heading_key, "scope");
    }

    #[test]
    fn several_blocks_get_kind_suffixes_and_table_titles() {
        let table = DraftBlock {
            explicit_id: None,
            kind: BlockKind::Table,
            payload: Payload::Table(TablePayload {
                header: vec!["A".into()],
                rows: vec![],
                title: Some("Top Navigation Links".into()),
            }),
        };
        let doc = assemble(
            None,
            vec![DraftSection {
                explicit_id: None,
                title: "Navigation".into(),
                level: 1,
                blocks: vec![paragraph("one"), paragraph("two"), table],
            }],
        )
        .unwrap();
        let ids: Vec<_> = doc.blocks().map(|b| b.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "navigation/paragraph-1",
                "navigation/paragraph-2",
                "top navigation links"
            ]
        );
        assert_eq!(doc.sections[0].blocks[1].kind_index, 1);
    }

    #[test]
    fn duplicate_declared_ids_are_rejected() {
        let mut block = paragraph("x");
        block.explicit_id = Some("intro".into());
        let err = assemble(
            None,
            vec![DraftSection {
                explicit_id: Some("intro".into()),
                title: "Intro".into(),
                level: 1,
                blocks: vec![block],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::DuplicateId { id } if id == "intro"));
    }

    #[test]
    fn figures_are_numbered_in_document_order() {
        let figure = |image: &str| DraftBlock {
            explicit_id: None,
            kind: BlockKind::Figure,
            payload: Payload::Figure(FigurePayload {
                image_ref: image.into(),
                caption: String::new(),
                order: 0,
                figure_id: None,
            }),
        };
        let doc = assemble(
            None,
            vec![
                DraftSection {
                    explicit_id: None,
                    title: "One".into(),
                    level: 1,
                    blocks: vec![figure("a.png")],
                },
                DraftSection {
                    explicit_id: None,
                    title: "Two".into(),
                    level: 1,
                    blocks: vec![figure("b.png")],
                },
            ],
        )
        .unwrap();
        let orders: Vec<_> = doc
            .figures()
            .iter()
            .map(|b| b.figure().unwrap().order)
            .collect();
        assert_eq!(orders, vec![1, 2]);
    }
}
