use std::io;
use std::path::PathBuf;

use manual_sync_config::ConfigError;
use manual_sync_docx::DocxError;
use manual_sync_source::SourceError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    SourceParse = 2,
    TargetIo = 3,
    Validation = 4,
    Config = 5,
    InvalidArguments = 6,
}

impl ExitCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            2 => Some(Self::SourceParse),
            3 => Some(Self::TargetIo),
            4 => Some(Self::Validation),
            5 => Some(Self::Config),
            6 => Some(Self::InvalidArguments),
            _ => None,
        }
    }
}

/// Why a block was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AnchorNotFound,
    AnchorOverlap,
    TableHeaderMismatch,
    StyleCloneFailed,
    ImageMissing,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnchorNotFound => "anchor_not_found",
            Self::AnchorOverlap => "anchor_overlap",
            Self::TableHeaderMismatch => "table_header_mismatch",
            Self::StyleCloneFailed => "style_clone_failed",
            Self::ImageMissing => "image_missing",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source parse error: {0}")]
    SourceParse(#[from] SourceError),

    #[error("no anchor for block '{block_id}': {detail}")]
    AnchorNotFound { block_id: String, detail: String },

    #[error("anchor for block '{block_id}' overlaps block '{other}'")]
    AnchorOverlap { block_id: String, other: String },

    #[error("cannot clone target formatting for block '{block_id}': {detail}")]
    StyleClone { block_id: String, detail: String },

    #[error("table header of block '{block_id}' does not match the target ({detail})")]
    TableHeaderMismatch { block_id: String, detail: String },

    #[error("image for block '{block_id}' not found at {path}")]
    ImageMissing { block_id: String, path: PathBuf },

    #[error("numbering conflict: {0}")]
    NumberingConflict(String),

    #[error("cannot read target: {0}")]
    TargetRead(#[from] DocxError),

    #[error("failed to write {path}: {source}")]
    TargetWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl SyncError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::SourceParse(_) => ExitCode::SourceParse,
            Self::TargetRead(_) | Self::TargetWrite { .. } => ExitCode::TargetIo,
            Self::Config(_) => ExitCode::Config,
            Self::InvalidArguments(_) => ExitCode::InvalidArguments,
            Self::Validation(_) => ExitCode::Validation,
            Self::AnchorNotFound { .. }
            | Self::AnchorOverlap { .. }
            | Self::StyleClone { .. }
            | Self::TableHeaderMismatch { .. }
            | Self::ImageMissing { .. }
            | Self::NumberingConflict(_) => ExitCode::Success,
        }
    }

    /// Fatal errors abort the run before anything is written.
    pub fn is_fatal(&self) -> bool {
        self.exit_code() != ExitCode::Success
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::AnchorNotFound { .. } => Some(SkipReason::AnchorNotFound),
            Self::AnchorOverlap { .. } => Some(SkipReason::AnchorOverlap),
            Self::StyleClone { .. } => Some(SkipReason::StyleCloneFailed),
            Self::TableHeaderMismatch { .. } => Some(SkipReason::TableHeaderMismatch),
            Self::ImageMissing { .. } => Some(SkipReason::ImageMissing),
            _ => None,
        }
    }

    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::AnchorNotFound { block_id, .. }
            | Self::AnchorOverlap { block_id, .. }
            | Self::StyleClone { block_id, .. }
            | Self::TableHeaderMismatch { block_id, .. }
            | Self::ImageMissing { block_id, .. } => Some(block_id),
            _ => None,
        }
    }

    pub(crate) fn not_found(block_id: &str, detail: impl Into<String>) -> Self {
        Self::AnchorNotFound {
            block_id: block_id.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn style_clone(block_id: &str, detail: impl Into<String>) -> Self {
        Self::StyleClone {
            block_id: block_id.to_string(),
            detail: detail.into(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_map_to_skip_reasons() {
        let err = SyncError::not_found("intro", "no heading 'intro'");
        assert!(!err.is_fatal());
        assert_eq!(err.skip_reason(), Some(SkipReason::AnchorNotFound));
        assert_eq!(err.block_id(), Some("intro"));
    }

    #[test]
    fn fatal_errors_carry_exit_codes() {
        let err = SyncError::Validation("marker lost".into());
        assert!(err.is_fatal());
        assert_eq!(err.exit_code() as u8, 4);
        assert_eq!(ExitCode::from_u8(3), Some(ExitCode::TargetIo));
        assert_eq!(ExitCode::from_u8(1), None);
    }
}
