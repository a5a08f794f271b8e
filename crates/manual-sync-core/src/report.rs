use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{SkipReason, SyncError};

/// Run lifecycle. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Extracted,
    Located,
    Patched,
    Renumbered,
    Validated,
    Committed,
    Aborted,
}

impl RunState {
    /// Whether the run may move from `self` to `next`.
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Aborted) => true,
            (Idle, Extracted)
            | (Extracted, Located)
            | (Located, Patched)
            | (Patched, Renumbered)
            | (Renumbered, Validated)
            | (Validated, Committed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Committed | RunState::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Extracted => "extracted",
            RunState::Located => "located",
            RunState::Patched => "patched",
            RunState::Renumbered => "renumbered",
            RunState::Validated => "validated",
            RunState::Committed => "committed",
            RunState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBlock {
    pub id: String,
    pub reason: SkipReason,
    pub detail: String,
}

/// A heading whose displayed number was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Renumbered {
    pub heading: String,
    pub level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source: PathBuf,
    pub target: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub state: RunState,
    pub dry_run: bool,
    /// Blocks whose anchor was resolved (figures included).
    pub matched: Vec<String>,
    /// Matched blocks whose content actually changed.
    pub changed: Vec<String>,
    pub skipped: Vec<SkippedBlock>,
    pub renumbered: Vec<Renumbered>,
    /// Numbered-list groups restarted at 1.
    pub lists_restarted: usize,
    pub images_placed: Vec<String>,
    pub materialized: Vec<String>,
    pub warnings: Vec<String>,
    pub orphans: Vec<String>,
    /// Number of body elements inserted, rewritten, removed or moved.
    pub changes: usize,
}

impl SyncReport {
    pub fn new(source: PathBuf, target: PathBuf, dry_run: bool) -> Self {
        Self {
            source,
            target,
            generated_at: Utc::now(),
            state: RunState::Idle,
            dry_run,
            matched: Vec::new(),
            changed: Vec::new(),
            skipped: Vec::new(),
            renumbered: Vec::new(),
            lists_restarted: 0,
            images_placed: Vec::new(),
            materialized: Vec::new(),
            warnings: Vec::new(),
            orphans: Vec::new(),
            changes: 0,
        }
    }

    /// Records a recoverable error against its block. Errors without a skip
    /// reason become warnings.
    pub fn skip(&mut self, error: &SyncError) {
        match (error.skip_reason(), error.block_id()) {
            (Some(reason), Some(id)) => {
                tracing::warn!(block = id, reason = reason.as_str(), "{error}");
                self.skipped.push(SkippedBlock {
                    id: id.to_string(),
                    reason,
                    detail: error.to_string(),
                });
            }
            _ => self.warn(error.to_string()),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn is_skipped(&self, id: &str) -> bool {
        self.skipped.iter().any(|skipped| skipped.id == id)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(
            f,
            "sync {} -> {}: {}{mode}",
            self.source.display(),
            self.target.display(),
            self.state
        )?;
        writeln!(
            f,
            "matched: {}, changed: {}, skipped: {}, images placed: {}, element changes: {}",
            self.matched.len(),
            self.changed.len(),
            self.skipped.len(),
            self.images_placed.len(),
            self.changes
        )?;
        for id in &self.changed {
            writeln!(f, "  changed {id}")?;
        }
        for id in &self.materialized {
            writeln!(f, "  materialized section {id}")?;
        }
        for skipped in &self.skipped {
            writeln!(
                f,
                "  skipped {} [{}]: {}",
                skipped.id,
                skipped.reason.as_str(),
                skipped.detail
            )?;
        }
        for entry in &self.renumbered {
            match &entry.previous {
                Some(previous) => writeln!(
                    f,
                    "  renumbered {} -> {} {}",
                    previous, entry.label, entry.heading
                )?,
                None => writeln!(f, "  numbered {} {}", entry.label, entry.heading)?,
            }
        }
        if self.lists_restarted > 0 {
            writeln!(f, "  restarted {} numbered list(s)", self.lists_restarted)?;
        }
        for id in &self.images_placed {
            writeln!(f, "  placed image {id}")?;
        }
        for id in &self.orphans {
            writeln!(f, "  orphan figure marker {id}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {warning}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        assert!(RunState::Idle.can_advance_to(RunState::Extracted));
        assert!(RunState::Validated.can_advance_to(RunState::Committed));
        assert!(RunState::Patched.can_advance_to(RunState::Aborted));
        assert!(!RunState::Extracted.can_advance_to(RunState::Patched));
        assert!(!RunState::Committed.can_advance_to(RunState::Aborted));
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        for state in [RunState::Committed, RunState::Aborted] {
            assert!(state.is_terminal());
            assert!(!state.can_advance_to(RunState::Aborted));
            assert!(!state.can_advance_to(RunState::Idle));
        }
        assert!(!RunState::Validated.is_terminal());
    }

    #[test]
    fn skip_records_reason_and_detail() {
        let mut report = SyncReport::new("m.tex".into(), "m.docx".into(), false);
        report.skip(&SyncError::not_found("video-card-table", "no marker"));
        report.skip(&SyncError::NumberingConflict("level 3 is new".into()));

        assert!(report.is_skipped("video-card-table"));
        assert_eq!(report.skipped[0].reason, SkipReason::AnchorNotFound);
        assert_eq!(report.warnings.len(), 1);

        let text = report.to_string();
        assert!(text.contains("skipped video-card-table [anchor_not_found]"));
        let json = report.to_json();
        assert!(json.contains("\"reason\": \"anchor_not_found\""));
    }
}
