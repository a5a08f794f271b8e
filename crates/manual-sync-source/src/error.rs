use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while turning a source file into blocks. Every variant is
/// fatal for a sync run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read source {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("block '{id}' has unknown kind '{kind}'")]
    UnknownKind { id: String, kind: String },

    #[error("block '{id}' is missing its {field}")]
    MissingPayload { id: String, field: &'static str },

    #[error("duplicate id '{id}'")]
    DuplicateId { id: String },

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("invalid manifest json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid marker namespace '{namespace}': {source}")]
    MarkerPattern {
        namespace: String,
        source: regex::Error,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;
