//! JSON block manifest front end.
//!
//! Two layouts are accepted: a bare array of `{heading, level, blocks}`
//! sections whose blocks carry `{id, kind, payload, order}`, and the object
//! written by the manual builder, `{meta, sections: [{section_id, title, level,
//! order, blocks: [{block_id, type, ...}]}]}` with flat payload fields.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::builder::{assemble, DraftBlock, DraftSection};
use crate::error::{SourceError, SourceResult};
use crate::model::{BlockKind, FigurePayload, Payload, SourceDocument, TablePayload};

#[derive(Debug, Deserialize)]
struct RawSection {
    #[serde(default, alias = "id")]
    section_id: Option<String>,
    #[serde(default, alias = "heading")]
    title: Option<String>,
    #[serde(default)]
    level: Option<u8>,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    blocks: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    sections: Vec<RawSection>,
}

pub(crate) fn parse_manifest(text: &str, origin: Option<PathBuf>) -> SourceResult<SourceDocument> {
    let value: Value = serde_json::from_str(text)?;
    let mut sections: Vec<RawSection> = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        Value::Object(ref object) if object.contains_key("sections") => {
            serde_json::from_value::<RawManifest>(value)?.sections
        }
        _ => {
            return Err(SourceError::Manifest(
                "expected an array of sections or an object with a 'sections' array".into(),
            ))
        }
    };
    sections.sort_by_key(|section| section.order.unwrap_or(i64::MAX));

    let mut drafts = Vec::with_capacity(sections.len());
    for (position, section) in sections.into_iter().enumerate() {
        drafts.push(section_draft(position, section)?);
    }
    assemble(origin, drafts)
}

fn section_draft(position: usize, section: RawSection) -> SourceResult<DraftSection> {
    let title = section
        .title
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| SourceError::Manifest(format!("section {} has no title", position + 1)))?;
    let level = section.level.unwrap_or(1).clamp(1, 9);

    let mut raw_blocks: Vec<(i64, Map<String, Value>)> = section
        .blocks
        .into_iter()
        .map(|block| {
            let order = block.get("order").and_then(Value::as_i64).unwrap_or(i64::MAX);
            (order, block)
        })
        .collect();
    raw_blocks.sort_by_key(|(order, _)| *order);

    let mut blocks = Vec::with_capacity(raw_blocks.len());
    for (index, (_, fields)) in raw_blocks.into_iter().enumerate() {
        blocks.push(block_draft(&title, index, fields)?);
    }

    Ok(DraftSection {
        explicit_id: section.section_id.filter(|id| !id.trim().is_empty()),
        title,
        level,
        blocks,
    })
}

fn block_draft(
    section_title: &str,
    index: usize,
    mut fields: Map<String, Value>,
) -> SourceResult<DraftBlock> {
    let explicit_id = string_field(&fields, &["block_id", "id"]);
    let label = explicit_id
        .clone()
        .unwrap_or_else(|| format!("{section_title}#{}", index + 1));

    let kind_name = string_field(&fields, &["type", "kind"]).ok_or_else(|| {
        SourceError::MissingPayload {
            id: label.clone(),
            field: "kind",
        }
    })?;
    let kind = BlockKind::parse(&kind_name).ok_or_else(|| SourceError::UnknownKind {
        id: label.clone(),
        kind: kind_name.clone(),
    })?;

    // The array layout nests content under `payload`; flatten it so both
    // layouts read the same field names.
    if let Some(payload) = fields.remove("payload") {
        match payload {
            Value::Object(mut inner) => {
                if let Some(order) = inner.remove("order") {
                    fields.insert("figure_order".into(), order);
                }
                fields.extend(inner);
            }
            Value::String(text) => {
                fields.insert("text".into(), Value::String(text));
            }
            Value::Array(items) => {
                fields.insert("items".into(), Value::Array(items));
            }
            _ => {}
        }
    }

    let payload = match kind {
        BlockKind::Paragraph => {
            let text = string_field(&fields, &["text"]).ok_or(SourceError::MissingPayload {
                id: label.clone(),
                field: "text",
            })?;
            Payload::Text(text)
        }
        BlockKind::BulletList | BlockKind::NumberedList => {
            let items = string_list(&fields, "items").ok_or(SourceError::MissingPayload {
                id: label.clone(),
                field: "items",
            })?;
            Payload::Items(items)
        }
        BlockKind::Table => {
            let header = string_list(&fields, "header")
                .or_else(|| string_list(&fields, "columns"))
                .ok_or(SourceError::MissingPayload {
                    id: label.clone(),
                    field: "header",
                })?;
            let rows = match fields.get("rows") {
                Some(Value::Array(rows)) => rows
                    .iter()
                    .map(|row| match row {
                        Value::Array(cells) => cells.iter().map(value_text).collect(),
                        other => vec![value_text(other)],
                    })
                    .collect(),
                _ => Vec::new(),
            };
            Payload::Table(TablePayload {
                header,
                rows,
                title: string_field(&fields, &["title", "caption"]),
            })
        }
        BlockKind::Figure => {
            let image_ref = string_field(&fields, &["image_ref", "image_rel", "image", "src"])
                .ok_or(SourceError::MissingPayload {
                    id: label.clone(),
                    field: "image reference",
                })?;
            let order = fields
                .get("figure_order")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            Payload::Figure(FigurePayload {
                image_ref,
                caption: string_field(&fields, &["caption"]).unwrap_or_default(),
                order,
                figure_id: string_field(&fields, &["figure_id"]),
            })
        }
    };

    Ok(DraftBlock {
        explicit_id,
        kind,
        payload,
    })
}

fn string_field(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match fields.get(*name) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    })
}

fn string_list(fields: &Map<String, Value>, name: &str) -> Option<Vec<String>> {
    match fields.get(name) {
        Some(Value::Array(items)) => Some(items.iter().map(value_text).collect()),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_builder_object_layout() {
        let doc = parse_manifest(
            r#"{
                "meta": {"app_target": "Demo"},
                "sections": [
                    {"section_id": "usage", "title": "Usage", "level": 1, "order": 2,
                     "blocks": [{"block_id": "usage.steps", "type": "numbered_list", "items": ["Open", "Save"]}]},
                    {"section_id": "intro", "title": "Introduction", "level": 1, "order": 1,
                     "blocks": [{"block_id": "intro.text", "type": "paragraph", "text": "Hello"}]}
                ],
                "trace": []
            }"#,
            None,
        )
        .unwrap();
        let ids: Vec<_> = doc.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["intro", "usage"]);
        assert_eq!(
            doc.block("usage.steps").unwrap().items(),
            &["Open".to_string(), "Save".to_string()]
        );
    }

    #[test]
    fn reads_array_layout_with_nested_payloads() {
        let doc = parse_manifest(
            r#"[{"heading": "Links", "level": 2, "blocks": [
                {"id": "links.table", "kind": "table", "order": 1,
                 "payload": {"header": ["Label", "Target"], "rows": [["Home", "/"], ["Docs", 3]]}}
            ]}]"#,
            None,
        )
        .unwrap();
        let table = doc.block("links.table").unwrap().table().unwrap();
        assert_eq!(table.header, vec!["Label", "Target"]);
        assert_eq!(table.rows[1], vec!["Docs".to_string(), "3".to_string()]);
        assert_eq!(doc.sections[0].level, 2);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = parse_manifest(
            r#"[{"heading": "X", "blocks": [{"id": "x.1", "kind": "chart", "payload": {}}]}]"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::UnknownKind { ref kind, .. } if kind == "chart"));
    }

    #[test]
    fn missing_payload_is_rejected() {
        let err = parse_manifest(
            r#"[{"heading": "X", "blocks": [{"id": "x.1", "kind": "paragraph"}]}]"#,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::MissingPayload { field: "text", .. }));
    }
}
