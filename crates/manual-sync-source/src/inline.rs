//! Reduction of inline LaTeX markup to plain text.

use crate::normalize::collapse_whitespace;
use crate::scan::{comment_end, command_at, group_at};

/// Commands whose arguments carry no visible text.
const DROPPED: &[&str] = &[
    "label",
    "index",
    "vspace",
    "hspace",
    "includegraphics",
    "phantom",
    "setlength",
    "addcontentsline",
    "footnote",
    "cite",
    "pagebreak",
    "newpage",
    "clearpage",
    "noindent",
    "centering",
    "raggedright",
    "small",
    "footnotesize",
    "large",
    "Large",
    "normalsize",
    "bfseries",
    "itshape",
    "ttfamily",
    "hline",
    "toprule",
    "midrule",
    "bottomrule",
    "cmidrule",
    "cline",
];

/// Commands whose last argument is the visible text.
const LAST_ARG: &[&str] = &["href", "multicolumn", "multirow", "textcolor", "colorbox"];

/// Commands whose argument is shown verbatim.
const VERBATIM_ARG: &[&str] = &["url", "path", "nolinkurl"];

/// Converts a fragment of LaTeX into collapsed plain text.
pub fn latex_to_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    render(input, 0, input.len(), &mut out);
    collapse_whitespace(&out)
}

fn render(src: &str, start: usize, end: usize, out: &mut String) {
    let bytes = src.as_bytes();
    let mut idx = start;
    while idx < end {
        match bytes[idx] {
            b'%' => idx = comment_end(src, idx).min(end),
            b'{' | b'}' | b'$' => idx += 1,
            b'~' => {
                out.push(' ');
                idx += 1;
            }
            b'\\' => idx = render_command(src, idx, end, out),
            _ => {
                let Some(ch) = src[idx..end].chars().next() else {
                    break;
                };
                out.push(ch);
                idx += ch.len_utf8();
            }
        }
    }
}

fn render_command(src: &str, idx: usize, end: usize, out: &mut String) -> usize {
    let Some((name, mut after)) = command_at(src, idx) else {
        return idx + 1;
    };
    if after > end {
        return end;
    }

    let first = name.as_bytes()[0];
    if !first.is_ascii_alphabetic() {
        match name {
            "&" | "%" | "_" | "$" | "#" | "{" | "}" => out.push_str(name),
            "\\" | "," | ";" | " " | ":" => out.push(' '),
            _ => {}
        }
        return after;
    }

    if src.as_bytes().get(after) == Some(&b'*') {
        after += 1;
    }

    match name {
        "item" => {
            out.push(' ');
            skip_optional(src, after, end)
        }
        "begin" => {
            // Environment names and tabular column specs are not text.
            let mut next = skip_group(src, after, end);
            next = skip_optional(src, next, end);
            if src.as_bytes().get(next) == Some(&b'{') && starts_tabular(src, after) {
                next = skip_group(src, next, end);
            }
            out.push(' ');
            next
        }
        "end" => {
            out.push(' ');
            skip_group(src, after, end)
        }
        "textbackslash" => {
            out.push('\\');
            skip_empty_group(src, after, end)
        }
        "textasciitilde" => {
            out.push('~');
            skip_empty_group(src, after, end)
        }
        "textasciicircum" => {
            out.push('^');
            skip_empty_group(src, after, end)
        }
        "textbar" => {
            out.push('|');
            skip_empty_group(src, after, end)
        }
        "textless" => {
            out.push('<');
            skip_empty_group(src, after, end)
        }
        "textgreater" => {
            out.push('>');
            skip_empty_group(src, after, end)
        }
        "ldots" | "dots" | "textellipsis" => {
            out.push_str("...");
            skip_empty_group(src, after, end)
        }
        "LaTeX" | "TeX" => {
            out.push_str(name);
            skip_empty_group(src, after, end)
        }
        "quad" | "qquad" | "newline" | "linebreak" | "par" => {
            out.push(' ');
            after
        }
        _ if DROPPED.contains(&name) => {
            let mut next = skip_optional(src, after, end);
            while src.as_bytes().get(next) == Some(&b'{') {
                next = skip_group(src, next, end);
            }
            next
        }
        _ if VERBATIM_ARG.contains(&name) => {
            let next = skip_optional(src, after, end);
            match raw_group(src, next, end) {
                Some((inner, past)) => {
                    out.push_str(&src[inner]);
                    past
                }
                None => next,
            }
        }
        _ if LAST_ARG.contains(&name) => {
            let mut next = skip_optional(src, after, end);
            let mut last = None;
            while let Ok(Some((inner, past))) = group_at(src, next, b'{', b'}') {
                if past > end {
                    break;
                }
                last = Some(inner);
                next = past;
            }
            if let Some(inner) = last {
                render(src, inner.start, inner.end, out);
            }
            next
        }
        _ => {
            let mut next = skip_optional(src, after, end);
            while let Ok(Some((inner, past))) = group_at(src, next, b'{', b'}') {
                if past > end {
                    break;
                }
                render(src, inner.start, inner.end, out);
                next = past;
            }
            next
        }
    }
}

fn starts_tabular(src: &str, after_begin: usize) -> bool {
    match group_at(src, after_begin, b'{', b'}') {
        Ok(Some((inner, _))) => matches!(src[inner].trim(), "tabular" | "longtable" | "tabularx"),
        _ => false,
    }
}

/// Brace group read without comment or escape handling, as `\url` does.
fn raw_group(src: &str, pos: usize, end: usize) -> Option<(std::ops::Range<usize>, usize)> {
    let bytes = src.as_bytes();
    if bytes.get(pos) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    for (offset, byte) in bytes[pos..end].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let close = pos + offset;
                    return Some((pos + 1..close, close + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn skip_group(src: &str, pos: usize, end: usize) -> usize {
    match group_at(src, pos, b'{', b'}') {
        Ok(Some((_, past))) => past.min(end),
        _ => pos,
    }
}

fn skip_empty_group(src: &str, pos: usize, end: usize) -> usize {
    if src[pos.min(end)..end].starts_with("{}") {
        pos + 2
    } else {
        pos
    }
}

fn skip_optional(src: &str, pos: usize, end: usize) -> usize {
    match group_at(src, pos, b'[', b']') {
        Ok(Some((_, past))) => past.min(end),
        _ => pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_formatting() {
        assert_eq!(
            latex_to_text(r"Open \texttt{Settings} \& press \textbf{Save}."),
            "Open Settings & press Save."
        );
    }

    #[test]
    fn keeps_urls_verbatim() {
        assert_eq!(
            latex_to_text(r"Visit \url{https://example.com/a_b%20c} now"),
            "Visit https://example.com/a_b%20c now"
        );
        assert_eq!(
            latex_to_text(r"\href{https://example.com}{the site}"),
            "the site"
        );
    }

    #[test]
    fn reduces_escapes_and_special_commands() {
        assert_eq!(
            latex_to_text(r"50\% of C:\textbackslash{}tmp\_dir ~ok"),
            r"50% of C:\tmp_dir ok"
        );
    }

    #[test]
    fn drops_labels_and_comments() {
        assert_eq!(
            latex_to_text("Intro\\label{sec:intro} text % hidden\nmore"),
            "Intro text more"
        );
    }

    #[test]
    fn flattens_nested_lists() {
        assert_eq!(
            latex_to_text(r"Options: \begin{itemize}\item Fast \item Safe\end{itemize}"),
            "Options: Fast Safe"
        );
    }
}
