use similar::TextDiff;

/// Outline lines shown around each change.
const CONTEXT: usize = 2;

/// Unified diff of two outline renderings, or `None` when they are equal.
pub fn build_unified_diff(original: &str, modified: &str, path: &str) -> Option<String> {
    if original == modified {
        return None;
    }
    let (old, new) = (format!("a/{path}"), format!("b/{path}"));
    let rendered = TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(CONTEXT)
        .header(&old, &new)
        .to_string();
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_for_identical_outlines() {
        assert!(build_unified_diff("H1 Intro\n", "H1 Intro\n", "manual.docx").is_none());
    }

    #[test]
    fn produces_diff_for_changed_outline() {
        let diff =
            build_unified_diff("H1 4 Usage\n", "H1 5 Usage\n", "manual.docx").unwrap();
        assert!(diff.contains("--- a/manual.docx"));
        assert!(diff.contains("-H1 4 Usage"));
        assert!(diff.contains("+H1 5 Usage"));
    }
}
