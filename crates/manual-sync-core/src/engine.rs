use std::path::{Path, PathBuf};

use manual_sync_config::Config;
use manual_sync_docx::Docx;
use manual_sync_source::{extract_file, MarkerMatcher, SourceDocument};

use crate::classify::{render_outline, Classifier};
use crate::diff::build_unified_diff;
use crate::error::{ExitCode, SyncError, SyncResult};
use crate::figures::FigurePlacer;
use crate::fs::write_atomic;
use crate::locator::locate_blocks;
use crate::materialize::materialize_sections;
use crate::numbering::{heading_levels, reconcile};
use crate::patcher::{apply_edits, plan_edit};
use crate::report::{RunState, SyncReport};
use crate::validate::{marker_set, validate};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub backup: bool,
    pub diff: bool,
    /// Where to write the result. Defaults to the target itself.
    pub output: Option<PathBuf>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: true,
            diff: false,
            output: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub source: PathBuf,
    /// Block manifest read instead of `source`. Image paths still resolve
    /// against the directory of `source`.
    pub manifest: Option<PathBuf>,
    pub target: PathBuf,
    pub config: Config,
    pub options: SyncOptions,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub exit_code: ExitCode,
    pub report: SyncReport,
    pub diff: Option<String>,
    /// Path written, `None` for dry runs and runs without changes.
    pub output: Option<PathBuf>,
}

/// Reads the blocks of a sync: the manifest when given, the source
/// otherwise.
pub fn load_source(
    source: &Path,
    manifest: Option<&Path>,
    config: &Config,
) -> SyncResult<SourceDocument> {
    if !source.exists() {
        return Err(SyncError::InvalidArguments(format!(
            "source {} does not exist",
            source.display()
        )));
    }
    let matcher = MarkerMatcher::new(&config.markers)?;
    let path = manifest.unwrap_or(source);
    Ok(extract_file(path, &matcher)?)
}

/// Runs one synchronisation. Fatal errors leave the target untouched;
/// recoverable ones end up in the report.
pub fn run_sync(request: SyncRequest) -> SyncResult<SyncOutcome> {
    let output = request
        .options
        .output
        .clone()
        .unwrap_or_else(|| request.target.clone());
    let mut report = SyncReport::new(
        request.source.clone(),
        request.target.clone(),
        request.options.dry_run,
    );

    match run_phases(&request, &output, &mut report) {
        Ok((diff, written)) => Ok(SyncOutcome {
            exit_code: ExitCode::Success,
            report,
            diff,
            output: written,
        }),
        Err(err) => {
            tracing::error!(from = %report.state, "run aborted: {err}");
            report.state = RunState::Aborted;
            Err(err)
        }
    }
}

fn run_phases(
    request: &SyncRequest,
    output: &Path,
    report: &mut SyncReport,
) -> SyncResult<(Option<String>, Option<PathBuf>)> {
    let config = &request.config;
    let source = load_source(&request.source, request.manifest.as_deref(), config)?;
    advance(report, RunState::Extracted)?;

    let matcher = MarkerMatcher::new(&config.markers)?;
    let classifier = Classifier::new(&config.styles, &matcher);
    let mut docx = Docx::open(&request.target)?;

    let initial = classifier.classify_body(&docx);
    let levels_before = heading_levels(&initial);
    let markers_before = marker_set(&initial, &classifier);
    let outline_before = render_outline(&docx, &classifier, false);

    let materialized = materialize_sections(&mut docx, &source, &classifier);
    report.changes += materialized.changes;
    report.materialized = materialized.sections;
    for warning in materialized.warnings {
        report.warn(warning);
    }

    let kinds = classifier.classify_body(&docx);
    let located = locate_blocks(&source, &docx, &kinds);
    for failure in &located.failures {
        report.skip(failure);
    }
    advance(report, RunState::Located)?;

    let mut edits = Vec::new();
    for anchor in &located.anchors {
        let Some(block) = source.block(&anchor.block_id) else {
            continue;
        };
        match plan_edit(block, anchor, docx.body(), &kinds) {
            Ok(Some(edit)) => {
                report.matched.push(block.id.clone());
                if edit.change_count() > 0 {
                    report.changed.push(block.id.clone());
                }
                edits.push(edit);
            }
            Ok(None) => report.matched.push(block.id.clone()),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => report.skip(&err),
        }
    }
    report.changes += apply_edits(docx.body_mut(), edits)?;

    let base_dir = image_base_dir(&request.source);
    let placer = FigurePlacer::new(&classifier, &config.figures, &base_dir);
    let figures = placer.place(&mut docx, &source)?;
    for failure in &figures.failures {
        report.skip(failure);
    }
    report.matched.extend(figures.matched);
    report.images_placed = figures.placed;
    report.orphans = figures.orphans;
    for orphan in &report.orphans {
        tracing::info!(figure = %orphan, "figure in target has no source counterpart");
    }
    report.changes += figures.changes;
    advance(report, RunState::Patched)?;

    let numbering = reconcile(&mut docx, &classifier, &config.numbering, &levels_before);
    for warning in &numbering.warnings {
        report.skip(warning);
    }
    report.renumbered = numbering.renumbered;
    report.lists_restarted = numbering.lists_restarted;
    report.changes += numbering.changes;
    advance(report, RunState::Renumbered)?;

    validate(&docx, &classifier, &source, &markers_before, &config.numbering)?;
    advance(report, RunState::Validated)?;

    let diff = if request.options.diff {
        let outline_after = render_outline(&docx, &classifier, false);
        build_unified_diff(
            &outline_before,
            &outline_after,
            request.target.to_string_lossy().as_ref(),
        )
    } else {
        None
    };

    if request.options.dry_run {
        tracing::info!(changes = report.changes, "dry run, target left untouched");
        return Ok((diff, None));
    }

    let written = if report.changes > 0 || output != request.target.as_path() {
        let bytes = docx.to_bytes()?;
        write_atomic(output, &bytes, request.options.backup)?;
        tracing::info!(path = %output.display(), bytes = bytes.len(), "document written");
        Some(output.to_path_buf())
    } else {
        None
    };
    advance(report, RunState::Committed)?;
    Ok((diff, written))
}

fn advance(report: &mut SyncReport, next: RunState) -> SyncResult<()> {
    if !report.state.can_advance_to(next) {
        return Err(SyncError::Validation(format!(
            "illegal run transition {} -> {next}",
            report.state
        )));
    }
    tracing::info!(from = %report.state, to = %next, "run state");
    report.state = next;
    Ok(())
}

fn image_base_dir(source: &Path) -> PathBuf {
    match source.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_base_dir_defaults_to_current_directory() {
        assert_eq!(image_base_dir(Path::new("manual.tex")), PathBuf::from("."));
        assert_eq!(
            image_base_dir(Path::new("docs/manual.tex")),
            PathBuf::from("docs")
        );
    }

    #[test]
    fn missing_source_is_an_argument_error() {
        let err = load_source(Path::new("/nonexistent/manual.tex"), None, &Config::builtin())
            .unwrap_err();
        assert_eq!(err.exit_code(), ExitCode::InvalidArguments);
    }
}
