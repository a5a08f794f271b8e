//! Restores heading and numbered-list numbering after patching by counting
//! the final document from the top.

use std::collections::{BTreeSet, HashMap, HashSet};

use manual_sync_config::NumberingSettings;
use manual_sync_docx::{wordml, Docx};
use manual_sync_source::normalize::split_manual_number;

use crate::classify::{Classifier, ElementKind};
use crate::error::SyncError;
use crate::report::Renumbered;

const MAX_LEVEL: usize = 9;

#[derive(Debug, Default)]
pub struct NumberingOutcome {
    pub renumbered: Vec<Renumbered>,
    pub lists_restarted: usize,
    pub warnings: Vec<SyncError>,
    pub changes: usize,
}

/// Heading levels present in a document.
pub fn heading_levels(kinds: &[ElementKind]) -> BTreeSet<u8> {
    kinds.iter().filter_map(ElementKind::heading_level).collect()
}

/// Rewrites heading labels and restarts numbered lists. `levels_before`
/// holds the heading levels the target had before the run.
pub fn reconcile(
    docx: &mut Docx,
    classifier: &Classifier<'_>,
    settings: &NumberingSettings,
    levels_before: &BTreeSet<u8>,
) -> NumberingOutcome {
    let mut outcome = NumberingOutcome::default();
    if settings.heading_labels {
        renumber_headings(docx, classifier, levels_before, &mut outcome);
    }
    if settings.restart_numbered_lists {
        restart_lists(docx, classifier, &mut outcome);
    }
    outcome
}

fn renumber_headings(
    docx: &mut Docx,
    classifier: &Classifier<'_>,
    levels_before: &BTreeSet<u8>,
    outcome: &mut NumberingOutcome,
) {
    let number_style = classifier.styles().number_run_style.clone();
    let kinds = classifier.classify_body(docx);

    let levels_with_runs: HashSet<u8> = kinds
        .iter()
        .enumerate()
        .filter_map(|(index, kind)| {
            let level = kind.heading_level()?;
            let element = docx.body().element(index)?;
            wordml::has_number_run(element, &number_style).then_some(level)
        })
        .collect();
    let labelled = labelled_per_level(&kinds);
    let primary_num_id = kinds.iter().enumerate().find_map(|(index, kind)| {
        kind.heading_level()?;
        wordml::num_pr(docx.body().element(index)?).map(|num_pr| num_pr.num_id)
    });

    let mut counters = [0u32; MAX_LEVEL + 1];
    let mut warned: HashSet<u8> = HashSet::new();

    for (index, kind) in kinds.iter().enumerate() {
        let ElementKind::Heading { level, title, label } = kind else {
            continue;
        };
        let depth = usize::from(*level).min(MAX_LEVEL);

        if !levels_before.contains(level) && warned.insert(*level) {
            outcome.warnings.push(SyncError::NumberingConflict(format!(
                "heading level {level} did not exist before the run; '{title}' starts it at 1"
            )));
        }
        if depth > 1 && counters[depth - 1] == 0 {
            outcome.warnings.push(SyncError::NumberingConflict(format!(
                "heading '{title}' at level {level} has no parent heading"
            )));
        }

        counters[depth] += 1;
        for deeper in counters.iter_mut().skip(depth + 1) {
            *deeper = 0;
        }
        let new_label = format_label(&counters[1..=depth]);

        let Some(item) = docx.body_mut().get_mut(index) else {
            continue;
        };
        let element = item.element();
        let numbered_by_run = wordml::has_number_run(element, &number_style);
        let auto_num_id = wordml::num_pr(element).map(|num_pr| num_pr.num_id);
        let numbered_by_hand = labelled.get(level).is_some_and(|&count| count > 1);

        let previous = if numbered_by_run {
            if label.as_deref() == Some(new_label.as_str()) {
                continue;
            }
            wordml::set_number_run_text(item.element_mut(), &number_style, &new_label);
            label.clone()
        } else if let Some(num_id) = auto_num_id {
            match &primary_num_id {
                Some(primary) if *primary != num_id => {
                    wordml::set_num_id(item.element_mut(), primary);
                    None
                }
                _ => continue,
            }
        } else if levels_with_runs.contains(level) {
            wordml::insert_number_run(item.element_mut(), &number_style, &new_label);
            None
        } else if let Some(old) = label.as_ref().filter(|_| numbered_by_hand) {
            if *old == new_label {
                continue;
            }
            let visible = wordml::heading_title(element, &number_style);
            let rest = split_manual_number(&visible)
                .map(|(_, rest)| rest.to_string())
                .unwrap_or_else(|| title.clone());
            let relabelled = format!("{new_label} {rest}");
            wordml::set_heading_title(item.element_mut(), &number_style, &relabelled);
            Some(old.clone())
        } else {
            continue;
        };

        tracing::debug!(heading = %title, label = %new_label, "heading renumbered");
        outcome.changes += 1;
        outcome.renumbered.push(Renumbered {
            heading: title.clone(),
            level: *level,
            previous,
            label: new_label,
        });
    }
}

/// Headings per level that show a number. A lone typed prefix such as
/// "2024 Roadmap" is part of the title, not a label.
fn labelled_per_level(kinds: &[ElementKind]) -> HashMap<u8, usize> {
    let mut counts = HashMap::new();
    for kind in kinds {
        if let ElementKind::Heading {
            level,
            label: Some(_),
            ..
        } = kind
        {
            *counts.entry(*level).or_insert(0) += 1;
        }
    }
    counts
}

/// Joins counters with dots. A missing parent level shows as `0`, which
/// keeps labels unique.
fn format_label(counters: &[u32]) -> String {
    counters
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Each contiguous group of numbered paragraphs is one list that starts at
/// 1. A group reusing the numbering instance of an earlier group gets a
/// fresh instance that restarts.
fn restart_lists(docx: &mut Docx, classifier: &Classifier<'_>, outcome: &mut NumberingOutcome) {
    let kinds = classifier.classify_body(docx);
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for (index, kind) in kinds.iter().enumerate() {
        if *kind == ElementKind::NumberedItem {
            current.push(index);
        } else if !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut seen: HashSet<String> = HashSet::new();
    for group in groups {
        let Some(num_id) = group
            .iter()
            .find_map(|&index| wordml::num_pr(docx.body().element(index)?))
            .map(|num_pr| num_pr.num_id)
        else {
            continue;
        };
        if seen.insert(num_id.clone()) {
            continue;
        }

        let Some(numbering) = docx.numbering_mut() else {
            outcome.warnings.push(SyncError::NumberingConflict(
                "numbered lists share one sequence but the target has no numbering definitions"
                    .into(),
            ));
            return;
        };
        let Some(fresh) = numbering.add_restart_instance(&num_id) else {
            outcome.warnings.push(SyncError::NumberingConflict(format!(
                "numbering instance {num_id} has no definition to restart from"
            )));
            continue;
        };

        for &index in &group {
            let Some(item) = docx.body_mut().get_mut(index) else {
                continue;
            };
            let shares = wordml::num_pr(item.element())
                .is_some_and(|num_pr| num_pr.num_id == num_id);
            if shares {
                wordml::set_num_id(item.element_mut(), &fresh);
                outcome.changes += 1;
            }
        }
        tracing::debug!(from = %num_id, to = %fresh, "numbered list restarted");
        seen.insert(fresh);
        outcome.lists_restarted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_sync_source::MarkerMatcher;
    use manual_sync_test_support::{test_config, DocxFixture, DECIMAL_NUM_ID};

    fn labels(docx: &Docx, classifier: &Classifier<'_>) -> Vec<String> {
        classifier
            .classify_body(docx)
            .into_iter()
            .filter_map(|kind| match kind {
                ElementKind::Heading { label, .. } => label,
                _ => None,
            })
            .collect()
    }

    #[test]
    fn format_label_keeps_missing_parents() {
        assert_eq!(format_label(&[2, 1]), "2.1");
        assert_eq!(format_label(&[0, 1]), "0.1");
        assert_eq!(format_label(&[3]), "3");
    }

    #[test]
    fn heading_runs_are_recounted() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let mut docx = Docx::from_bytes(
            &DocxFixture::new()
                .heading(1, Some("1"), "Intro")
                .heading(2, Some("1.1"), "Scope")
                .heading(2, Some("1.1"), "Audience")
                .heading(1, Some("4"), "Usage")
                .heading(2, None, "Search")
                .build(),
        )
        .unwrap();

        let before = heading_levels(&classifier.classify_body(&docx));
        let outcome = reconcile(&mut docx, &classifier, &config.numbering, &before);

        assert_eq!(labels(&docx, &classifier), vec!["1", "1.1", "1.2", "2", "2.1"]);
        assert_eq!(outcome.renumbered.len(), 3);
        assert_eq!(outcome.renumbered[1].previous.as_deref(), Some("4"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn new_level_warns_and_second_pass_is_stable() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let mut docx = Docx::from_bytes(
            &DocxFixture::new()
                .heading(1, Some("1"), "Intro")
                .heading(3, Some("9"), "Deep")
                .build(),
        )
        .unwrap();

        let before: BTreeSet<u8> = [1].into_iter().collect();
        let outcome = reconcile(&mut docx, &classifier, &config.numbering, &before);
        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(labels(&docx, &classifier), vec!["1", "1.0.1"]);

        let levels = heading_levels(&classifier.classify_body(&docx));
        let again = reconcile(&mut docx, &classifier, &config.numbering, &levels);
        assert_eq!(again.changes, 0);
    }

    #[test]
    fn lone_typed_number_stays_part_of_the_title() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let mut docx = Docx::from_bytes(
            &DocxFixture::new()
                .heading(1, None, "Intro")
                .heading(1, None, "2024 Roadmap")
                .build(),
        )
        .unwrap();

        let before = heading_levels(&classifier.classify_body(&docx));
        let outcome = reconcile(&mut docx, &classifier, &config.numbering, &before);

        assert_eq!(outcome.changes, 0);
        assert!(outcome.renumbered.is_empty());
        let text = wordml::heading_title(docx.body().element(1).unwrap(), "SectionNumber");
        assert_eq!(text, "2024 Roadmap");
    }

    #[test]
    fn typed_numbers_are_relabelled_when_the_level_is_numbered_by_hand() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let mut docx = Docx::from_bytes(
            &DocxFixture::new()
                .heading(1, None, "1 Intro")
                .heading(1, None, "3 Usage")
                .build(),
        )
        .unwrap();

        let before = heading_levels(&classifier.classify_body(&docx));
        let outcome = reconcile(&mut docx, &classifier, &config.numbering, &before);

        assert_eq!(labels(&docx, &classifier), vec!["1", "2"]);
        assert_eq!(outcome.renumbered[0].previous.as_deref(), Some("3"));
    }

    #[test]
    fn run_numbered_level_gets_a_run_and_keeps_typed_text() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let mut docx = Docx::from_bytes(
            &DocxFixture::new()
                .heading(1, Some("1"), "Intro")
                .heading(1, None, "2024 Roadmap")
                .build(),
        )
        .unwrap();

        let before = heading_levels(&classifier.classify_body(&docx));
        reconcile(&mut docx, &classifier, &config.numbering, &before);

        let element = docx.body().element(1).unwrap();
        assert_eq!(wordml::number_run_text(element, "SectionNumber").as_deref(), Some("2"));
        assert_eq!(wordml::heading_title(element, "SectionNumber"), "2024 Roadmap");
    }

    #[test]
    fn second_list_sharing_an_instance_restarts() {
        let config = test_config();
        let matcher = MarkerMatcher::new(&config.markers).unwrap();
        let classifier = Classifier::new(&config.styles, &matcher);
        let mut docx = Docx::from_bytes(
            &DocxFixture::new()
                .numbered("a")
                .numbered("b")
                .paragraph("between")
                .numbered("c")
                .build(),
        )
        .unwrap();

        let outcome = reconcile(&mut docx, &classifier, &config.numbering, &BTreeSet::new());
        assert_eq!(outcome.lists_restarted, 1);
        let first = wordml::num_pr(docx.body().element(0).unwrap()).unwrap();
        let second = wordml::num_pr(docx.body().element(3).unwrap()).unwrap();
        assert_eq!(first.num_id, DECIMAL_NUM_ID);
        assert_eq!(second.num_id, "4");
        assert!(docx.numbering().unwrap().restarts_at_one("4"));
    }
}
