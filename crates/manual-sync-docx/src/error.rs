use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Stream(#[from] io::Error),

    #[error("invalid package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("package has no '{0}' part")]
    MissingPart(String),

    #[error("part '{part}' is not valid UTF-8")]
    Encoding { part: String },

    #[error("malformed XML in '{part}' at byte {position}: {message}")]
    Xml {
        part: String,
        position: usize,
        message: String,
    },

    #[error("unexpected structure in '{part}': {message}")]
    Structure { part: String, message: String },
}

impl DocxError {
    pub(crate) fn xml(part: &str, position: usize, message: impl ToString) -> Self {
        Self::Xml {
            part: part.to_string(),
            position,
            message: message.to_string(),
        }
    }

    pub(crate) fn structure(part: &str, message: impl Into<String>) -> Self {
        Self::Structure {
            part: part.to_string(),
            message: message.into(),
        }
    }
}

pub type DocxResult<T> = Result<T, DocxError>;
