//! Post-patch checks. Any failure aborts the run before the target is
//! written.

use std::collections::{BTreeSet, HashSet};

use manual_sync_config::NumberingSettings;
use manual_sync_docx::{Docx, XmlDocument, DOCUMENT_PART};
use manual_sync_source::SourceDocument;

use crate::classify::{Classifier, ElementKind};
use crate::error::{SyncError, SyncResult};
use crate::figures::figure_order_holds;

/// `NS:id` descriptions of every marker paragraph in the body.
pub fn marker_set(kinds: &[ElementKind], classifier: &Classifier<'_>) -> BTreeSet<String> {
    kinds
        .iter()
        .filter_map(ElementKind::marker)
        .map(|marker| classifier.matcher().describe(marker))
        .collect()
}

pub fn validate(
    docx: &Docx,
    classifier: &Classifier<'_>,
    source: &SourceDocument,
    markers_before: &BTreeSet<String>,
    numbering: &NumberingSettings,
) -> SyncResult<()> {
    XmlDocument::parse(DOCUMENT_PART, &docx.document_xml())
        .map_err(|err| SyncError::Validation(format!("patched document is not well formed: {err}")))?;

    let kinds = classifier.classify_body(docx);
    let markers_after = marker_set(&kinds, classifier);
    let lost: Vec<&str> = markers_before
        .difference(&markers_after)
        .map(String::as_str)
        .collect();
    if !lost.is_empty() {
        return Err(SyncError::Validation(format!(
            "marker(s) lost while patching: {}",
            lost.join(", ")
        )));
    }

    if !figure_order_holds(docx, classifier, source) {
        return Err(SyncError::Validation(
            "figures no longer follow source order".into(),
        ));
    }

    if numbering.heading_labels {
        let mut seen = HashSet::new();
        for kind in &kinds {
            if let ElementKind::Heading {
                label: Some(label),
                title,
                ..
            } = kind
            {
                if !seen.insert(label.as_str()) {
                    return Err(SyncError::Validation(format!(
                        "heading label {label} is used twice (second at '{title}')"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_sync_source::{extract_str, MarkerMatcher, SourceFormat};
    use manual_sync_test_support::{test_config, DocxFixture};

    fn empty_source(matcher: &MarkerMatcher) -> SourceDocument {
        extract_str(r#"{"sections": []}"#, SourceFormat::Manifest, matcher).unwrap()
    }

    #[test]
    fn lost_marker_fails() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let docx = Docx::from_bytes(&DocxFixture::new().paragraph("text").build()).unwrap();
        let before: BTreeSet<String> = ["MANUAL_BLOCK:gone".to_string()].into_iter().collect();

        let err = validate(
            &docx,
            &classifier,
            &empty_source(&matcher),
            &before,
            &config.numbering,
        )
        .unwrap_err();
        assert!(err.to_string().contains("MANUAL_BLOCK:gone"));
        assert!(err.is_fatal());
    }

    #[test]
    fn duplicate_heading_labels_fail() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let docx = Docx::from_bytes(
            &DocxFixture::new()
                .heading(1, Some("1"), "Intro")
                .marker("[[MANUAL_BLOCK:intro]]")
                .heading(1, Some("1"), "Usage")
                .build(),
        )
        .unwrap();
        let before = marker_set(&classifier.classify_body(&docx), &classifier);
        assert_eq!(before.len(), 1);

        let result = validate(
            &docx,
            &classifier,
            &empty_source(&matcher),
            &before,
            &config.numbering,
        );
        assert!(matches!(result, Err(SyncError::Validation(_))));

        let mut relaxed = config.numbering.clone();
        relaxed.heading_labels = false;
        validate(&docx, &classifier, &empty_source(&matcher), &before, &relaxed).unwrap();
    }
}
