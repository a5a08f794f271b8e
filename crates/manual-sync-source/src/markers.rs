use manual_sync_config::MarkerSettings;
use regex::Regex;

use crate::error::{SourceError, SourceResult};

/// Which namespace a marker token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Block,
    Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker {
    pub kind: MarkerKind,
    pub id: String,
}

/// Recognises `<NAMESPACE>:<id>` tokens, optionally wrapped in `[[ ]]`.
#[derive(Debug, Clone)]
pub struct MarkerMatcher {
    block: Regex,
    figure: Regex,
    block_namespace: String,
    figure_namespace: String,
}

impl MarkerMatcher {
    pub fn new(settings: &MarkerSettings) -> SourceResult<Self> {
        Ok(Self {
            block: token_regex(&settings.block_namespace)?,
            figure: token_regex(&settings.figure_namespace)?,
            block_namespace: settings.block_namespace.clone(),
            figure_namespace: settings.figure_namespace.clone(),
        })
    }

    /// Parses text that consists of exactly one marker token.
    pub fn parse(&self, text: &str) -> Option<Marker> {
        let trimmed = text.trim();
        if let Some(captures) = self.figure.captures(trimmed) {
            return Some(Marker {
                kind: MarkerKind::Figure,
                id: captures[1].to_string(),
            });
        }
        self.block.captures(trimmed).map(|captures| Marker {
            kind: MarkerKind::Block,
            id: captures[1].to_string(),
        })
    }

    /// Token text written into marker paragraphs.
    pub fn token(&self, kind: MarkerKind, id: &str) -> String {
        let namespace = match kind {
            MarkerKind::Block => &self.block_namespace,
            MarkerKind::Figure => &self.figure_namespace,
        };
        format!("[[{namespace}:{id}]]")
    }

    pub fn describe(&self, marker: &Marker) -> String {
        let namespace = match marker.kind {
            MarkerKind::Block => &self.block_namespace,
            MarkerKind::Figure => &self.figure_namespace,
        };
        format!("{namespace}:{}", marker.id)
    }
}

fn token_regex(namespace: &str) -> SourceResult<Regex> {
    let pattern = format!(
        r"^(?:\[\[)?\s*{}:([A-Za-z0-9_.:-]+)\s*(?:\]\])?$",
        regex::escape(namespace)
    );
    Regex::new(&pattern).map_err(|source| SourceError::MarkerPattern {
        namespace: namespace.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_sync_config::Config;

    fn matcher() -> MarkerMatcher {
        MarkerMatcher::new(&Config::builtin().markers).unwrap()
    }

    #[test]
    fn parses_plain_and_wrapped_tokens() {
        let matcher = matcher();
        assert_eq!(
            matcher.parse("MANUAL_BLOCK:scope.list"),
            Some(Marker {
                kind: MarkerKind::Block,
                id: "scope.list".into()
            })
        );
        assert_eq!(
            matcher.parse("  [[IMG:fig_home]] "),
            Some(Marker {
                kind: MarkerKind::Figure,
                id: "fig_home".into()
            })
        );
    }

    #[test]
    fn rejects_tokens_embedded_in_prose() {
        let matcher = matcher();
        assert_eq!(matcher.parse("see MANUAL_BLOCK:scope for details"), None);
        assert_eq!(matcher.parse("OTHER:scope"), None);
    }

    #[test]
    fn renders_wrapped_tokens() {
        let matcher = matcher();
        assert_eq!(
            matcher.token(MarkerKind::Figure, "fig-1"),
            "[[IMG:fig-1]]"
        );
    }
}
