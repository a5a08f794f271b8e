/// Collapses every run of whitespace into a single space and trims the ends.
pub fn collapse_whitespace(input: &str) -> String {
    let mut collapsed = String::with_capacity(input.len());
    for (idx, segment) in input.split_whitespace().enumerate() {
        if idx > 0 {
            collapsed.push(' ');
        }
        collapsed.push_str(segment);
    }
    collapsed
}

/// Normalised lookup key for headings and titles.
///
/// The key is case-folded and whitespace-collapsed, and leading manual
/// numbering such as `5.1` or `3.` is stripped so that `5.1 Overview` and
/// `Overview` produce the same key.
pub fn normalize_key(input: &str) -> String {
    let collapsed = collapse_whitespace(input).to_lowercase();
    strip_manual_number(&collapsed).to_string()
}

/// Key with every non-alphanumeric character removed. Used as a tolerant
/// second comparison so punctuation differences between a typeset title and
/// a word-processor heading do not prevent a match.
pub fn compact_key(input: &str) -> String {
    normalize_key(input)
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .collect()
}

/// Returns true when two titles refer to the same heading.
pub fn keys_match(left: &str, right: &str) -> bool {
    let left_key = normalize_key(left);
    let right_key = normalize_key(right);
    if left_key == right_key {
        return true;
    }
    let left_compact = compact_key(left);
    !left_compact.is_empty() && left_compact == compact_key(right)
}

/// Splits a leading manual number (`5.1`, `2.`, `10.3.4`) from the rest of
/// a title. Returns `None` when the text does not start with one or when the
/// number is the whole text.
pub fn split_manual_number(input: &str) -> Option<(&str, &str)> {
    let bytes = input.as_bytes();
    let mut idx = 0;
    let mut expect_digit = true;
    let mut saw_digit = false;

    while idx < bytes.len() {
        let byte = bytes[idx];
        if byte.is_ascii_digit() {
            saw_digit = true;
            expect_digit = false;
            idx += 1;
        } else if byte == b'.' && !expect_digit {
            expect_digit = true;
            idx += 1;
        } else {
            break;
        }
    }

    if !saw_digit {
        return None;
    }

    let number = &input[..idx];
    let rest = &input[idx..];
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() || trimmed.is_empty() {
        return None;
    }
    Some((number.trim_end_matches('.'), trimmed))
}

fn strip_manual_number(input: &str) -> &str {
    match split_manual_number(input) {
        Some((_, rest)) => rest,
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_manual_numbers_and_case() {
        assert_eq!(normalize_key("5.1  Search   Results"), "search results");
        assert_eq!(normalize_key("3. Scope"), "scope");
        assert_eq!(normalize_key("Scope"), "scope");
    }

    #[test]
    fn keeps_numbers_that_are_the_whole_title() {
        assert_eq!(normalize_key("2024"), "2024");
        assert_eq!(normalize_key("3D Viewer"), "3d viewer");
    }

    #[test]
    fn split_manual_number_reports_label() {
        assert_eq!(split_manual_number("10.3.4 Notes"), Some(("10.3.4", "Notes")));
        assert_eq!(split_manual_number("4.\tBuild"), Some(("4", "Build")));
        assert_eq!(split_manual_number("Build"), None);
    }

    #[test]
    fn compact_comparison_ignores_punctuation() {
        assert!(keys_match(
            "Left Navigation (Common Signed-out Items)",
            "2.2 Left navigation common signed out items"
        ));
        assert!(!keys_match("Scope", "Prerequisites"));
    }
}
