//! Structural LaTeX front end.
//!
//! Recognises sectioning commands, `itemize`/`enumerate`, `longtable` and the
//! `tabular` family (optionally inside a `table` float), `figure` floats and
//! the `\screenshotbox{image}{caption}{note}` macro. Everything else between
//! those constructs becomes paragraph text.

use std::ops::Range;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::builder::{assemble, DraftBlock, DraftSection};
use crate::error::SourceResult;
use crate::inline::latex_to_text;
use crate::markers::{MarkerKind, MarkerMatcher};
use crate::model::{BlockKind, FigurePayload, Payload, SourceDocument, TablePayload};
use crate::scan::{
    comment_end, command_at, env_end, find_command, group_at, is_verbatim, optional_arg,
    required_arg, split_top_level, syntax, Separator,
};

/// Commands skipped together with their arguments when they appear between
/// blocks.
const LAYOUT_COMMANDS: &[&str] = &[
    "maketitle",
    "tableofcontents",
    "listoffigures",
    "listoftables",
    "newpage",
    "clearpage",
    "pagebreak",
    "label",
    "vspace",
    "hspace",
    "noindent",
    "centering",
    "appendix",
    "bigskip",
    "medskip",
    "smallskip",
    "vfill",
    "hfill",
    "setlength",
    "addcontentsline",
    "bibliography",
    "bibliographystyle",
    "input",
    "include",
    "includegraphics",
    "caption",
    "item",
];

const TABULAR_ENVS: &[&str] = &["tabular", "tabular*", "tabularx", "longtable", "longtable*"];

/// Environments whose leading arguments are layout parameters.
const ARG_ENVS: &[(&str, usize)] = &[("minipage", 1), ("multicols", 1), ("adjustbox", 1)];

const TABLE_RULES: &[&str] = &[
    "toprule",
    "midrule",
    "bottomrule",
    "hline",
    "cline",
    "cmidrule",
    "endhead",
    "endfirsthead",
    "endfoot",
    "endlastfoot",
    "label",
    "caption",
    "centering",
    "addlinespace",
];

pub(crate) fn parse_latex(
    text: &str,
    matcher: &MarkerMatcher,
    origin: Option<PathBuf>,
) -> SourceResult<SourceDocument> {
    let body = document_body(text);
    let mut parser = LatexParser::new(text, matcher);
    parser.parse_flow(body)?;
    parser.flush_paragraph();
    let drafts = parser.finish();
    assemble(origin, drafts)
}

/// Range between `\begin{document}` and `\end{document}`, or the whole text
/// when the source is a fragment.
fn document_body(text: &str) -> Range<usize> {
    const BEGIN: &str = "\\begin{document}";
    const END: &str = "\\end{document}";
    let start = text.find(BEGIN).map(|pos| pos + BEGIN.len()).unwrap_or(0);
    let end = text[start..]
        .find(END)
        .map(|pos| start + pos)
        .unwrap_or(text.len());
    start..end
}

struct LatexParser<'a> {
    src: &'a str,
    matcher: &'a MarkerMatcher,
    sections: Vec<DraftSection>,
    pending_block: Option<String>,
    pending_figure: Option<String>,
    paragraph: String,
}

impl<'a> LatexParser<'a> {
    fn new(src: &'a str, matcher: &'a MarkerMatcher) -> Self {
        Self {
            src,
            matcher,
            sections: Vec::new(),
            pending_block: None,
            pending_figure: None,
            paragraph: String::new(),
        }
    }

    fn finish(self) -> Vec<DraftSection> {
        if let Some(id) = self.pending_block.or(self.pending_figure) {
            warn!(marker = %id, "marker comment at end of source has no following block");
        }
        self.sections
    }

    fn parse_flow(&mut self, range: Range<usize>) -> SourceResult<()> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut idx = range.start;

        while idx < range.end {
            match bytes[idx] {
                b'%' => {
                    let next = comment_end(src, idx).min(range.end);
                    self.comment(&src[idx + 1..next]);
                    idx = next;
                }
                b'\n' => {
                    let mut probe = idx + 1;
                    let mut blank = false;
                    while probe < range.end && bytes[probe].is_ascii_whitespace() {
                        if bytes[probe] == b'\n' {
                            blank = true;
                        }
                        probe += 1;
                    }
                    if blank {
                        self.flush_paragraph();
                    } else {
                        self.paragraph.push(' ');
                    }
                    idx = probe;
                }
                b'{' => match group_at(src, idx, b'{', b'}')? {
                    Some((_, next)) => {
                        self.paragraph.push_str(&src[idx..next]);
                        idx = next;
                    }
                    None => idx += 1,
                },
                b'}' => return Err(syntax(src, idx, "unexpected '}'")),
                b'\\' => idx = self.command(idx, range.end)?,
                _ => {
                    let Some(ch) = src[idx..range.end].chars().next() else {
                        break;
                    };
                    self.paragraph.push(ch);
                    idx += ch.len_utf8();
                }
            }
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) {
        let Some(marker) = self.matcher.parse(text) else {
            return;
        };
        self.flush_paragraph();
        let slot = match marker.kind {
            MarkerKind::Block => &mut self.pending_block,
            MarkerKind::Figure => &mut self.pending_figure,
        };
        if let Some(previous) = slot.replace(marker.id) {
            warn!(marker = %previous, "marker comment is not followed by a block; ignoring it");
        }
    }

    fn command(&mut self, idx: usize, limit: usize) -> SourceResult<usize> {
        let src = self.src;
        let Some((name, after)) = command_at(src, idx) else {
            return Ok(idx + 1);
        };

        match name {
            "section" | "subsection" | "subsubsection" => {
                let level = match name {
                    "section" => 1,
                    "subsection" => 2,
                    _ => 3,
                };
                let mut next = after;
                if src.as_bytes().get(next) == Some(&b'*') {
                    next += 1;
                }
                let (_, next) = optional_arg(src, next)?;
                let (title, next) = required_arg(src, next, name)?;
                self.start_section(level, &src[title]);
                Ok(next)
            }
            "begin" => {
                let (env, next) = required_arg(src, after, "\\begin")?;
                let env = src[env].trim();
                let (body_end, past) = env_end(src, next, env)?;
                if past > limit {
                    return Err(syntax(src, idx, format!("environment '{env}' crosses its parent")));
                }
                self.environment(env, next..body_end)?;
                Ok(past)
            }
            "end" => {
                let (env, _) = required_arg(src, after, "\\end")?;
                Err(syntax(
                    src,
                    idx,
                    format!("unexpected \\end{{{}}}", src[env].trim()),
                ))
            }
            "screenshotbox" => {
                let (image, next) = required_arg(src, after, "\\screenshotbox")?;
                let (caption, next) = required_arg(src, next, "\\screenshotbox")?;
                let (_, next) = required_arg(src, next, "\\screenshotbox")?;
                self.push_figure(&src[image], &src[caption]);
                Ok(next)
            }
            _ if LAYOUT_COMMANDS.contains(&name) => {
                self.flush_paragraph();
                skip_arguments(src, after)
            }
            _ if name.as_bytes()[0].is_ascii_alphabetic() => {
                let end = inline_extent(src, after)?;
                self.paragraph.push_str(&src[idx..end]);
                Ok(end)
            }
            _ => {
                self.paragraph.push_str(&src[idx..after]);
                Ok(after)
            }
        }
    }

    fn environment(&mut self, env: &str, body: Range<usize>) -> SourceResult<()> {
        match env {
            "itemize" | "enumerate" => {
                self.flush_paragraph();
                let kind = if env == "itemize" {
                    BlockKind::BulletList
                } else {
                    BlockKind::NumberedList
                };
                let items = self.list_items(body)?;
                self.push_block(kind, Payload::Items(items));
            }
            _ if TABULAR_ENVS.contains(&env) => {
                self.flush_paragraph();
                let table = self.tabular(env, body.clone(), None)?;
                self.push_table(table, body.start);
            }
            "table" | "table*" => {
                self.flush_paragraph();
                let title = self.caption_in(body.clone())?;
                match self.inner_tabular(body.clone())? {
                    Some((env, inner)) => {
                        let table = self.tabular(&env, inner, title)?;
                        self.push_table(table, body.start);
                    }
                    None => debug!("table float without a tabular body skipped"),
                }
            }
            "figure" | "figure*" => {
                self.flush_paragraph();
                match find_command(self.src, body.clone(), "includegraphics") {
                    Some((_, after)) => {
                        let (_, next) = optional_arg(self.src, after)?;
                        let (image, _) = required_arg(self.src, next, "\\includegraphics")?;
                        let caption = self.caption_in(body)?.unwrap_or_default();
                        let image = self.src[image].trim().to_string();
                        self.push_figure_text(image, caption);
                    }
                    None => debug!("figure without \\includegraphics skipped"),
                }
            }
            _ if is_verbatim(env) => {
                self.flush_paragraph();
                let text = self.src[body].trim().to_string();
                if !text.is_empty() {
                    self.push_block(BlockKind::Paragraph, Payload::Text(text));
                }
            }
            _ => {
                let mut start = body.start;
                let skip = ARG_ENVS
                    .iter()
                    .find(|(name, _)| *name == env)
                    .map(|(_, count)| *count)
                    .unwrap_or(0);
                for _ in 0..skip {
                    let (_, next) = optional_arg(self.src, start)?;
                    let (_, next) = required_arg(self.src, next, env)?;
                    start = next;
                }
                self.parse_flow(start..body.end)?;
            }
        }
        Ok(())
    }

    fn list_items(&self, body: Range<usize>) -> SourceResult<Vec<String>> {
        let pieces = split_top_level(self.src, body, Separator::Item)?;
        let items = pieces
            .into_iter()
            .skip(1)
            .map(|piece| {
                let (_, start) = optional_arg(self.src, piece.start).unwrap_or((None, piece.start));
                latex_to_text(&self.src[start.min(piece.end)..piece.end])
            })
            .filter(|item| !item.is_empty())
            .collect();
        Ok(items)
    }

    fn caption_in(&self, body: Range<usize>) -> SourceResult<Option<String>> {
        let Some((_, after)) = find_command(self.src, body, "caption") else {
            return Ok(None);
        };
        let (_, next) = optional_arg(self.src, after)?;
        let (caption, _) = required_arg(self.src, next, "\\caption")?;
        let text = latex_to_text(&self.src[caption]);
        Ok((!text.is_empty()).then_some(text))
    }

    fn inner_tabular(&self, body: Range<usize>) -> SourceResult<Option<(String, Range<usize>)>> {
        let mut cursor = body.start;
        while let Some((start, after)) = find_command(self.src, cursor..body.end, "begin") {
            let (env, next) = required_arg(self.src, after, "\\begin")?;
            let env = self.src[env].trim().to_string();
            let (body_end, past) = env_end(self.src, next, &env)?;
            if TABULAR_ENVS.contains(&env.as_str()) {
                return Ok(Some((env, next..body_end)));
            }
            debug!(env = %env, offset = start, "skipping nested environment in table float");
            cursor = past;
        }
        Ok(None)
    }

    fn tabular(
        &self,
        env: &str,
        body: Range<usize>,
        title: Option<String>,
    ) -> SourceResult<TablePayload> {
        let src = self.src;
        let mut start = body.start;
        let (_, next) = optional_arg(src, start)?;
        start = next;
        if matches!(env, "tabularx" | "tabular*") {
            let (_, next) = required_arg(src, start, env)?;
            start = next;
        }
        let (_, next) = required_arg(src, start, env)?;
        start = next;

        let title = match title {
            Some(title) => Some(title),
            None => self.caption_in(start..body.end)?,
        };

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut head_rows: Option<usize> = None;
        let mut in_continuation_head = false;
        for row in split_top_level(src, start..body.end, Separator::RowBreak)? {
            let text = &src[row.clone()];
            if text.contains("\\endfirsthead") {
                in_continuation_head = true;
                head_rows = Some(rows.len());
                continue;
            }
            if text.contains("\\endhead") {
                if in_continuation_head {
                    in_continuation_head = false;
                } else {
                    head_rows = Some(rows.len());
                }
            } else if in_continuation_head {
                continue;
            }
            if text.contains("\\endfoot") || text.contains("\\endlastfoot") {
                if let Some(head) = head_rows {
                    rows.truncate(head);
                }
            }

            let row = strip_row_prefix(src, row);
            let cleaned = strip_rules(&src[row.clone()]);
            if cleaned.trim().is_empty() {
                continue;
            }
            let cells = split_top_level(src, row, Separator::Cell)?
                .into_iter()
                .map(|cell| latex_to_text(&strip_rules(&src[cell])))
                .collect::<Vec<_>>();
            if cells.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            rows.push(cells);
        }

        if rows.is_empty() {
            return Err(syntax(src, body.start, format!("'{env}' has no rows")));
        }
        let header = rows.remove(0);
        Ok(TablePayload {
            header,
            rows,
            title,
        })
    }

    fn start_section(&mut self, level: u8, raw_title: &str) {
        self.flush_paragraph();
        if let Some(id) = self.pending_figure.take() {
            warn!(marker = %id, "figure marker before a heading ignored");
        }
        self.sections.push(DraftSection {
            explicit_id: self.pending_block.take(),
            title: latex_to_text(raw_title),
            level,
            blocks: Vec::new(),
        });
    }

    fn flush_paragraph(&mut self) {
        let raw = std::mem::take(&mut self.paragraph);
        let text = latex_to_text(&raw);
        if text.is_empty() {
            return;
        }
        self.push_block(BlockKind::Paragraph, Payload::Text(text));
    }

    fn push_table(&mut self, table: TablePayload, offset: usize) {
        debug!(
            offset,
            columns = table.header.len(),
            rows = table.rows.len(),
            "table extracted"
        );
        self.push_block(BlockKind::Table, Payload::Table(table));
    }

    fn push_figure(&mut self, raw_image: &str, raw_caption: &str) {
        let image = raw_image.trim().replace("\\_", "_");
        let caption = latex_to_text(raw_caption);
        self.push_figure_text(image, caption);
    }

    fn push_figure_text(&mut self, image_ref: String, caption: String) {
        let figure_id = self.pending_figure.take();
        let explicit = self.pending_block.take().or_else(|| figure_id.clone());
        self.push_draft(DraftBlock {
            explicit_id: explicit,
            kind: BlockKind::Figure,
            payload: Payload::Figure(FigurePayload {
                image_ref,
                caption,
                order: 0,
                figure_id,
            }),
        });
    }

    fn push_block(&mut self, kind: BlockKind, payload: Payload) {
        if let Some(id) = self.pending_figure.take() {
            warn!(marker = %id, kind = %kind, "figure marker before a non-figure block ignored");
        }
        let explicit_id = self.pending_block.take();
        self.push_draft(DraftBlock {
            explicit_id,
            kind,
            payload,
        });
    }

    fn push_draft(&mut self, block: DraftBlock) {
        match self.sections.last_mut() {
            Some(section) => section.blocks.push(block),
            None => debug!(kind = %block.kind, "content before the first section ignored"),
        }
    }
}

/// Skips `*`, `[...]` and `{...}` arguments directly after a command.
fn skip_arguments(src: &str, mut pos: usize) -> SourceResult<usize> {
    let bytes = src.as_bytes();
    if bytes.get(pos) == Some(&b'*') {
        pos += 1;
    }
    loop {
        match bytes.get(pos) {
            Some(b'[') => match group_at(src, pos, b'[', b']')? {
                Some((_, next)) => pos = next,
                None => return Ok(pos),
            },
            Some(b'{') => match group_at(src, pos, b'{', b'}')? {
                Some((_, next)) => pos = next,
                None => return Ok(pos),
            },
            _ => return Ok(pos),
        }
    }
}

/// End of an inline command and the argument groups attached to it.
fn inline_extent(src: &str, after_name: usize) -> SourceResult<usize> {
    skip_arguments(src, after_name)
}

/// Removes a `[dimension]` left over from a preceding `\\[2pt]`.
fn strip_row_prefix(src: &str, row: Range<usize>) -> Range<usize> {
    let trimmed_start = row.start
        + src[row.clone()]
            .len()
            .saturating_sub(src[row.clone()].trim_start().len());
    match group_at(src, trimmed_start, b'[', b']') {
        Ok(Some((_, next))) if next <= row.end => next..row.end,
        _ => row,
    }
}

/// Removes booktabs rules and longtable head/foot markers from a row.
fn strip_rules(row: &str) -> String {
    let mut out = String::with_capacity(row.len());
    let bytes = row.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            if let Some((name, after)) = command_at(row, idx) {
                if TABLE_RULES.contains(&name) {
                    let mut next = after;
                    if let Ok(Some((_, past))) = group_at(row, next, b'(', b')') {
                        next = past;
                    }
                    while let Ok(Some((_, past))) = group_at(row, next, b'[', b']') {
                        next = past;
                    }
                    while let Ok(Some((_, past))) = group_at(row, next, b'{', b'}') {
                        next = past;
                    }
                    idx = next;
                    continue;
                }
                out.push_str(&row[idx..after]);
                idx = after;
                continue;
            }
        }
        let Some(ch) = row[idx..].chars().next() else {
            break;
        };
        out.push(ch);
        idx += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_sync_config::Config;

    fn parse(text: &str) -> SourceDocument {
        let matcher = MarkerMatcher::new(&Config::builtin().markers).unwrap();
        parse_latex(text, &matcher, None).unwrap()
    }

    #[test]
    fn strip_rules_removes_booktabs_commands() {
        assert_eq!(
            strip_rules(r"\toprule Name & \cmidrule(lr){1-2} Value"),
            " Name &  Value"
        );
    }

    #[test]
    fn ignores_preamble_and_trailer() {
        let doc = parse(
            "\\documentclass{article}\n\\title{Ignored}\n\\begin{document}\n\\section{Scope}\nBody text.\n\\end{document}\nAfter",
        );
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].blocks[0].payload, Payload::Text("Body text.".into()));
    }
}
