//! Tolerant balanced-delimiter scanning over LaTeX text.
//!
//! Positions are byte offsets into the complete source so errors can report
//! line numbers. Delimiters are ASCII, so byte-wise scanning never splits a
//! multi-byte character at a reported boundary.

use std::ops::Range;

use crate::error::{SourceError, SourceResult};

const VERBATIM_ENVS: &[&str] = &["verbatim", "verbatim*", "lstlisting", "minted"];

pub(crate) fn line_of(src: &str, pos: usize) -> usize {
    src.as_bytes()[..pos.min(src.len())]
        .iter()
        .filter(|byte| **byte == b'\n')
        .count()
        + 1
}

pub(crate) fn syntax(src: &str, pos: usize, message: impl Into<String>) -> SourceError {
    SourceError::Syntax {
        line: line_of(src, pos),
        message: message.into(),
    }
}

pub(crate) fn is_verbatim(env: &str) -> bool {
    VERBATIM_ENVS.contains(&env)
}

/// Position just past a `%` comment that starts at `pos`, newline included.
pub(crate) fn comment_end(src: &str, pos: usize) -> usize {
    match src[pos..].find('\n') {
        Some(offset) => pos + offset + 1,
        None => src.len(),
    }
}

/// Reads the command that starts with the backslash at `pos`. Returns the
/// command name (letters, or a single symbol) and the position after it.
pub(crate) fn command_at(src: &str, pos: usize) -> Option<(&str, usize)> {
    let bytes = src.as_bytes();
    if bytes.get(pos) != Some(&b'\\') {
        return None;
    }
    let start = pos + 1;
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }
    if end == start {
        let ch = src[start..].chars().next()?;
        end = start + ch.len_utf8();
    }
    Some((&src[start..end], end))
}

/// Skips spaces and tabs plus at most one line break.
pub(crate) fn skip_spaces(src: &str, mut pos: usize) -> usize {
    let bytes = src.as_bytes();
    let mut newlines = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\r' => pos += 1,
            b'\n' if newlines == 0 => {
                newlines += 1;
                pos += 1;
            }
            _ => break,
        }
    }
    pos
}

/// If a group delimited by `open`/`close` starts at `pos`, returns the inner
/// range and the position after the closing delimiter.
pub(crate) fn group_at(
    src: &str,
    pos: usize,
    open: u8,
    close: u8,
) -> SourceResult<Option<(Range<usize>, usize)>> {
    let bytes = src.as_bytes();
    if bytes.get(pos) != Some(&open) {
        return Ok(None);
    }
    let mut depth = 1usize;
    let mut idx = pos + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'%' => idx = comment_end(src, idx),
            b'{' if open != b'{' => match group_at(src, idx, b'{', b'}')? {
                Some((_, next)) => idx = next,
                None => idx += 1,
            },
            byte if byte == open => {
                depth += 1;
                idx += 1;
            }
            byte if byte == close => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some((pos + 1..idx, idx + 1)));
                }
                idx += 1;
            }
            _ => idx += 1,
        }
    }
    Err(syntax(
        src,
        pos,
        format!("unclosed '{}'", char::from(open)),
    ))
}

/// Required `{...}` argument after optional whitespace.
pub(crate) fn required_arg(src: &str, pos: usize, what: &str) -> SourceResult<(Range<usize>, usize)> {
    let at = skip_spaces(src, pos);
    match group_at(src, at, b'{', b'}')? {
        Some(found) => Ok(found),
        None => Err(syntax(src, pos, format!("expected {{...}} argument for {what}"))),
    }
}

/// Optional `[...]` argument after optional whitespace.
pub(crate) fn optional_arg(src: &str, pos: usize) -> SourceResult<(Option<Range<usize>>, usize)> {
    let at = skip_spaces(src, pos);
    match group_at(src, at, b'[', b']')? {
        Some((inner, next)) => Ok((Some(inner), next)),
        None => Ok((None, pos)),
    }
}

/// Finds the `\end{env}` that closes an environment whose body starts at
/// `from`. Returns the body end (start of `\end`) and the position after it.
pub(crate) fn env_end(src: &str, from: usize, env: &str) -> SourceResult<(usize, usize)> {
    if is_verbatim(env) {
        let needle = format!("\\end{{{env}}}");
        return match src[from..].find(&needle) {
            Some(offset) => Ok((from + offset, from + offset + needle.len())),
            None => Err(syntax(src, from, format!("environment '{env}' is never closed"))),
        };
    }

    let bytes = src.as_bytes();
    let mut stack: Vec<(String, usize)> = Vec::new();
    let mut idx = from;
    while idx < bytes.len() {
        match bytes[idx] {
            b'%' => idx = comment_end(src, idx),
            b'{' => match group_at(src, idx, b'{', b'}')? {
                Some((_, next)) => idx = next,
                None => idx += 1,
            },
            b'}' => return Err(syntax(src, idx, format!("unexpected '}}' inside '{env}'"))),
            b'\\' => {
                let Some((name, after)) = command_at(src, idx) else {
                    idx += 1;
                    continue;
                };
                match name {
                    "begin" => {
                        let (inner, next) = required_arg(src, after, "\\begin")?;
                        let nested = src[inner].trim().to_string();
                        if is_verbatim(&nested) {
                            let (_, past) = env_end(src, next, &nested)?;
                            idx = past;
                        } else {
                            stack.push((nested, idx));
                            idx = next;
                        }
                    }
                    "end" => {
                        let (inner, next) = required_arg(src, after, "\\end")?;
                        let name = src[inner].trim();
                        match stack.pop() {
                            None if name == env => return Ok((idx, next)),
                            None => {
                                return Err(syntax(
                                    src,
                                    idx,
                                    format!("\\end{{{name}}} does not close \\begin{{{env}}}"),
                                ))
                            }
                            Some((open, _)) if open == name => {}
                            Some((open, _)) => {
                                return Err(syntax(
                                    src,
                                    idx,
                                    format!("\\end{{{name}}} does not close \\begin{{{open}}}"),
                                ))
                            }
                        }
                        idx = next;
                    }
                    _ => idx = after,
                }
            }
            _ => idx += 1,
        }
    }

    let (open, at) = stack.pop().unwrap_or((env.to_string(), from));
    Err(syntax(src, at, format!("environment '{open}' is never closed")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Separator {
    /// `\\` row break.
    RowBreak,
    /// `&` cell delimiter.
    Cell,
    /// `\item`.
    Item,
}

/// Splits `range` at separators that sit outside braces and nested
/// environments.
pub(crate) fn split_top_level(
    src: &str,
    range: Range<usize>,
    separator: Separator,
) -> SourceResult<Vec<Range<usize>>> {
    let bytes = src.as_bytes();
    let mut pieces = Vec::new();
    let mut piece_start = range.start;
    let mut idx = range.start;

    while idx < range.end {
        match bytes[idx] {
            b'%' => idx = comment_end(src, idx).min(range.end),
            b'{' => match group_at(src, idx, b'{', b'}')? {
                Some((_, next)) => idx = next,
                None => idx += 1,
            },
            b'&' if separator == Separator::Cell => {
                pieces.push(piece_start..idx);
                idx += 1;
                piece_start = idx;
            }
            b'\\' => {
                if bytes.get(idx + 1) == Some(&b'\\') {
                    if separator == Separator::RowBreak {
                        pieces.push(piece_start..idx);
                        idx += 2;
                        piece_start = idx;
                    } else {
                        idx += 2;
                    }
                    continue;
                }
                let Some((name, after)) = command_at(src, idx) else {
                    idx += 1;
                    continue;
                };
                match name {
                    "begin" => {
                        let (inner, next) = required_arg(src, after, "\\begin")?;
                        let nested = src[inner].trim().to_string();
                        let (_, past) = env_end(src, next, &nested)?;
                        idx = past;
                    }
                    "item" if separator == Separator::Item => {
                        pieces.push(piece_start..idx);
                        idx = after;
                        piece_start = idx;
                    }
                    _ => idx = after,
                }
            }
            _ => idx += 1,
        }
    }
    pieces.push(piece_start..range.end.max(piece_start));
    Ok(pieces)
}

/// Locates the first `\name` command inside `range`, skipping comments.
pub(crate) fn find_command(src: &str, range: Range<usize>, name: &str) -> Option<(usize, usize)> {
    let bytes = src.as_bytes();
    let mut idx = range.start;
    while idx < range.end {
        match bytes[idx] {
            b'%' => idx = comment_end(src, idx),
            b'\\' => match command_at(src, idx) {
                Some((found, after)) if found == name => return Some((idx, after)),
                Some((_, after)) => idx = after,
                None => idx += 1,
            },
            _ => idx += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_at_handles_nesting_and_escapes() {
        let src = r"{a {b} \} c}rest";
        let (inner, next) = group_at(src, 0, b'{', b'}').unwrap().unwrap();
        assert_eq!(&src[inner], r"a {b} \} c");
        assert_eq!(&src[next..], "rest");
    }

    #[test]
    fn env_end_skips_nested_environments() {
        let src = r"\item a \begin{itemize}\item b\end{itemize}\end{enumerate} tail";
        let (body_end, after) = env_end(src, 0, "enumerate").unwrap();
        assert!(src[..body_end].ends_with(r"\end{itemize}"));
        assert_eq!(&src[after..], " tail");
    }

    #[test]
    fn env_end_reports_mismatch_with_line() {
        let src = "a\n\\begin{itemize}\n\\end{enumerate}";
        let err = env_end(src, 0, "center").unwrap_err();
        match err {
            SourceError::Syntax { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("does not close"), "{message}");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn split_rows_ignores_breaks_inside_groups() {
        let src = r"a & {b \\ c} \\ d & e \\";
        let rows = split_top_level(src, 0..src.len(), Separator::RowBreak).unwrap();
        let texts: Vec<_> = rows.iter().map(|r| src[r.clone()].trim()).collect();
        assert_eq!(texts, vec![r"a & {b \\ c}", "d & e", ""]);
    }

    #[test]
    fn split_items_skips_nested_lists() {
        let src = r" \item one \begin{itemize}\item inner\end{itemize} \item two";
        let items = split_top_level(src, 0..src.len(), Separator::Item).unwrap();
        assert_eq!(items.len(), 3);
        assert!(src[items[1].clone()].contains("inner"));
        assert_eq!(src[items[2].clone()].trim(), "two");
    }

    #[test]
    fn unclosed_brace_is_an_error() {
        let err = group_at("x\n{oops", 2, b'{', b'}').unwrap_err();
        assert!(matches!(err, SourceError::Syntax { line: 2, .. }));
    }
}
