//! Block extraction for manual synchronisation.
//!
//! A source is either a LaTeX manual or a JSON block manifest. Both are
//! turned into a [`SourceDocument`]: ordered sections holding addressable
//! blocks with stable ids. Parsing errors are fatal and surface as
//! [`SourceError`].

mod builder;
pub mod error;
mod inline;
mod latex;
mod manifest;
pub mod markers;
pub mod model;
pub mod normalize;
mod scan;

use std::fs;
use std::path::Path;

pub use error::{SourceError, SourceResult};
pub use inline::latex_to_text;
pub use markers::{Marker, MarkerKind, MarkerMatcher};
pub use model::{
    Block, BlockKind, FigurePayload, Payload, Section, SourceDocument, TablePayload,
};
pub use normalize::{collapse_whitespace, compact_key, keys_match, normalize_key};

/// Source syntax, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Latex,
    Manifest,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Manifest,
            _ => SourceFormat::Latex,
        }
    }
}

/// Reads and parses the source at `path`.
pub fn extract_file(path: &Path, matcher: &MarkerMatcher) -> SourceResult<SourceDocument> {
    let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = SourceFormat::from_path(path);
    tracing::debug!(path = %path.display(), ?format, "extracting blocks");
    let mut document = extract_str(&text, format, matcher)?;
    document.origin = Some(path.to_path_buf());
    Ok(document)
}

/// Parses in-memory source text.
pub fn extract_str(
    text: &str,
    format: SourceFormat,
    matcher: &MarkerMatcher,
) -> SourceResult<SourceDocument> {
    match format {
        SourceFormat::Latex => latex::parse_latex(text, matcher, None),
        SourceFormat::Manifest => manifest::parse_manifest(text, None),
    }
}
