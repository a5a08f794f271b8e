//! Configuration primitives and loader for the manual-sync toolkit.
//!
//! The loader resolves configuration using a fixed precedence stack:
//! override flag → working directory → git root → built-in defaults.
//! Parsed settings are normalised into typed structures so the engine and the
//! CLI never touch raw TOML.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = ".manual-sync.toml";

const DEFAULT_BLOCK_NAMESPACE: &str = "MANUAL_BLOCK";
const DEFAULT_FIGURE_NAMESPACE: &str = "IMG";
const DEFAULT_HEADING_PREFIX: &str = "Heading";
const DEFAULT_NUMBER_RUN_STYLE: &str = "SectionNumber";
const DEFAULT_CAPTION_PREFIX: &str = "Figure";

/// Complete configuration resolved from defaults and on-disk overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub markers: MarkerSettings,
    pub styles: StyleSettings,
    pub numbering: NumberingSettings,
    pub figures: FigureSettings,
    pub output: OutputSettings,
    pub sources: ConfigSources,
}

/// Namespaces of the sentinel paragraphs that delimit anchors in a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerSettings {
    pub block_namespace: String,
    pub figure_namespace: String,
}

impl MarkerSettings {
    /// Token for a block or section marker, e.g. `MANUAL_BLOCK:scope`.
    pub fn block_token(&self, id: &str) -> String {
        format!("{}:{id}", self.block_namespace)
    }

    /// Token for a figure marker, e.g. `IMG:figure_01`.
    pub fn figure_token(&self, id: &str) -> String {
        format!("{}:{id}", self.figure_namespace)
    }
}

/// Style names the engine relies on when reading and cloning target content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleSettings {
    pub heading_prefix: String,
    pub number_run_style: String,
    pub caption_styles: Vec<String>,
}

impl StyleSettings {
    /// Returns the heading level encoded in a paragraph style id such as
    /// `Heading2`, or `None` for non-heading styles.
    pub fn heading_level(&self, style: &str) -> Option<u8> {
        let rest = style.strip_prefix(self.heading_prefix.as_str())?;
        let level: u8 = rest.trim().parse().ok()?;
        (1..=9).contains(&level).then_some(level)
    }

    pub fn heading_style(&self, level: u8) -> String {
        format!("{}{level}", self.heading_prefix)
    }

    pub fn is_caption_style(&self, style: &str) -> bool {
        self.caption_styles
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(style))
    }
}

/// Settings for the numbering reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberingSettings {
    pub heading_labels: bool,
    pub restart_numbered_lists: bool,
}

/// Settings for the figure placer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FigureSettings {
    pub caption_prefix: String,
}

/// How results are committed and reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSettings {
    pub backup: bool,
    pub format: ReportFormat,
}

/// Rendering of the sync report.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReportFormat {
    Plain,
    Json,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Plain => "plain",
            ReportFormat::Json => "json",
        })
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "plain" => Ok(ReportFormat::Plain),
            "json" => Ok(ReportFormat::Json),
            _ => Err(()),
        }
    }
}

/// Provenance information for resolved configuration.
#[derive(Clone, Debug)]
pub struct ConfigSources {
    pub working_directory: PathBuf,
    pub layers: Vec<ConfigSource>,
}

/// Specific layer of configuration (default/git/local/override).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSource {
    pub kind: ConfigSourceKind,
    pub path: Option<PathBuf>,
}

impl ConfigSource {
    fn default() -> Self {
        ConfigSource {
            kind: ConfigSourceKind::Default,
            path: None,
        }
    }

    fn for_file(kind: ConfigSourceKind, path: PathBuf) -> Self {
        ConfigSource {
            kind,
            path: Some(path),
        }
    }

    fn describe(&self) -> String {
        match (&self.kind, &self.path) {
            (ConfigSourceKind::Default, _) => "built-in defaults".to_owned(),
            (kind, Some(path)) => format!("{} at {}", kind, path.display()),
            (kind, None) => kind.to_string(),
        }
    }
}

/// Kinds of configuration sources, ordered from lowest to highest precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigSourceKind {
    Default,
    GitRoot,
    Local,
    Override,
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSourceKind::Default => "defaults",
            ConfigSourceKind::GitRoot => "git-root config",
            ConfigSourceKind::Local => "local config",
            ConfigSourceKind::Override => "override config",
        };
        f.write_str(label)
    }
}

/// Loader options, typically supplied by the CLI layer.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub override_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

/// Errors surfaced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve working directory {attempted}: {source}")]
    WorkingDirectory {
        attempted: PathBuf,
        source: io::Error,
    },
    #[error("override config {path} not found")]
    OverrideNotFound { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("configuration validation failed:\n{0}")]
    Validation(ConfigValidationErrors),
}

impl Config {
    /// Loads configuration using the precedence rules and returns typed settings.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let working_dir = resolve_working_dir(options.working_dir)?;
        let override_path = options
            .override_path
            .map(|path| make_absolute(&path, &working_dir));

        if let Some(path) = &override_path {
            if !path.exists() {
                return Err(ConfigError::OverrideNotFound { path: path.clone() });
            }
        }

        let mut layers = vec![ConfigSource::default()];
        let mut merged = defaults_layer(ConfigSource::default());

        let local = working_dir.join(CONFIG_FILE_NAME);
        let git_root = find_git_root(&working_dir)
            .map(|root| root.join(CONFIG_FILE_NAME))
            .filter(|path| *path != local);
        // The override file is applied last even when discovery would find it.
        let shadowed = override_path.clone();
        let discovered = [
            (ConfigSourceKind::GitRoot, git_root),
            (ConfigSourceKind::Local, Some(local)),
        ]
        .into_iter()
        .filter_map(|(kind, path)| Some((kind, path?)))
        .filter(move |(_, path)| path.exists() && Some(path) != shadowed.as_ref());
        let explicit = override_path
            .into_iter()
            .map(|path| (ConfigSourceKind::Override, path));

        for (kind, path) in discovered.chain(explicit) {
            let source = ConfigSource::for_file(kind, path);
            if let Some(path) = source.path.as_deref() {
                merged.merge(load_layer(path, source.clone())?);
            }
            layers.push(source);
        }

        let resolved = merged.finalize().map_err(ConfigError::Validation)?;
        Ok(Config {
            markers: resolved.markers,
            styles: resolved.styles,
            numbering: resolved.numbering,
            figures: resolved.figures,
            output: resolved.output,
            sources: ConfigSources {
                working_directory: working_dir,
                layers,
            },
        })
    }

    /// Built-in defaults only, without consulting the filesystem.
    pub fn builtin() -> Self {
        Config {
            markers: MarkerSettings {
                block_namespace: DEFAULT_BLOCK_NAMESPACE.to_string(),
                figure_namespace: DEFAULT_FIGURE_NAMESPACE.to_string(),
            },
            styles: StyleSettings {
                heading_prefix: DEFAULT_HEADING_PREFIX.to_string(),
                number_run_style: DEFAULT_NUMBER_RUN_STYLE.to_string(),
                caption_styles: vec!["ImageCaption".into(), "Caption".into()],
            },
            numbering: NumberingSettings {
                heading_labels: true,
                restart_numbered_lists: true,
            },
            figures: FigureSettings {
                caption_prefix: DEFAULT_CAPTION_PREFIX.to_string(),
            },
            output: OutputSettings {
                backup: true,
                format: ReportFormat::Plain,
            },
            sources: ConfigSources {
                working_directory: PathBuf::from("."),
                layers: vec![ConfigSource::default()],
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builtin()
    }
}

fn resolve_working_dir(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(path) => fs::canonicalize(&path).map_err(|source| ConfigError::WorkingDirectory {
            attempted: path,
            source,
        }),
        None => env::current_dir().map_err(|source| ConfigError::WorkingDirectory {
            attempted: PathBuf::from("."),
            source,
        }),
    }
}

fn make_absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn load_layer(path: &Path, source: ConfigSource) -> Result<PartialConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.into(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.into(),
        source,
    })?;
    Ok(raw.into_partial(source))
}

fn defaults_layer(source: ConfigSource) -> PartialConfig {
    let located = |value: &str| Some(Located::new(value.to_string(), source.clone()));
    PartialConfig {
        block_namespace: located(DEFAULT_BLOCK_NAMESPACE),
        figure_namespace: located(DEFAULT_FIGURE_NAMESPACE),
        heading_prefix: located(DEFAULT_HEADING_PREFIX),
        number_run_style: located(DEFAULT_NUMBER_RUN_STYLE),
        caption_styles: Some(Located::new(
            vec!["ImageCaption".into(), "Caption".into()],
            source.clone(),
        )),
        heading_labels: Some(Located::new(true, source.clone())),
        restart_numbered_lists: Some(Located::new(true, source.clone())),
        caption_prefix: located(DEFAULT_CAPTION_PREFIX),
        backup: Some(Located::new(true, source.clone())),
        format: located("plain"),
    }
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

#[derive(Clone, Debug)]
struct Located<T> {
    value: T,
    source: ConfigSource,
}

impl<T> Located<T> {
    fn new(value: T, source: ConfigSource) -> Self {
        Located { value, source }
    }
}

#[derive(Clone, Debug, Default)]
struct PartialConfig {
    block_namespace: Option<Located<String>>,
    figure_namespace: Option<Located<String>>,
    heading_prefix: Option<Located<String>>,
    number_run_style: Option<Located<String>>,
    caption_styles: Option<Located<Vec<String>>>,
    heading_labels: Option<Located<bool>>,
    restart_numbered_lists: Option<Located<bool>>,
    caption_prefix: Option<Located<String>>,
    backup: Option<Located<bool>>,
    format: Option<Located<String>>,
}

fn merge_field<T>(slot: &mut Option<Located<T>>, other: Option<Located<T>>) {
    if other.is_some() {
        *slot = other;
    }
}

impl PartialConfig {
    fn merge(&mut self, other: PartialConfig) {
        merge_field(&mut self.block_namespace, other.block_namespace);
        merge_field(&mut self.figure_namespace, other.figure_namespace);
        merge_field(&mut self.heading_prefix, other.heading_prefix);
        merge_field(&mut self.number_run_style, other.number_run_style);
        merge_field(&mut self.caption_styles, other.caption_styles);
        merge_field(&mut self.heading_labels, other.heading_labels);
        merge_field(&mut self.restart_numbered_lists, other.restart_numbered_lists);
        merge_field(&mut self.caption_prefix, other.caption_prefix);
        merge_field(&mut self.backup, other.backup);
        merge_field(&mut self.format, other.format);
    }

    fn finalize(self) -> Result<ResolvedConfig, ConfigValidationErrors> {
        let mut errors = Vec::new();

        let block_namespace = require_namespace(
            self.block_namespace,
            DEFAULT_BLOCK_NAMESPACE,
            "markers.block_namespace",
            &mut errors,
        );
        let figure_namespace = require_namespace(
            self.figure_namespace,
            DEFAULT_FIGURE_NAMESPACE,
            "markers.figure_namespace",
            &mut errors,
        );
        if block_namespace == figure_namespace {
            errors.push(
                ConfigValidationError::new(
                    None,
                    format!("block and figure namespaces must differ (both '{block_namespace}')"),
                )
                .with_context("markers"),
            );
        }

        let heading_prefix = require_non_empty(
            self.heading_prefix,
            DEFAULT_HEADING_PREFIX,
            "styles.heading_prefix",
            &mut errors,
        );
        let number_run_style = require_non_empty(
            self.number_run_style,
            DEFAULT_NUMBER_RUN_STYLE,
            "styles.number_run_style",
            &mut errors,
        );

        let caption_styles = match self.caption_styles {
            Some(located) => {
                if located.value.iter().all(|style| style.trim().is_empty()) {
                    errors.push(
                        ConfigValidationError::new(
                            Some(located.source.clone()),
                            "at least one caption style is required".into(),
                        )
                        .with_context("styles.caption_styles"),
                    );
                }
                located
                    .value
                    .into_iter()
                    .filter(|style| !style.trim().is_empty())
                    .collect()
            }
            None => vec!["Caption".to_string()],
        };

        let format = match self.format {
            Some(located) => match located.value.parse::<ReportFormat>() {
                Ok(format) => format,
                Err(()) => {
                    errors.push(
                        ConfigValidationError::new(
                            Some(located.source.clone()),
                            format!(
                                "unknown report format '{}' (expected plain or json)",
                                located.value
                            ),
                        )
                        .with_context("output.format"),
                    );
                    ReportFormat::Plain
                }
            },
            None => ReportFormat::Plain,
        };

        if !errors.is_empty() {
            return Err(ConfigValidationErrors(errors));
        }

        Ok(ResolvedConfig {
            markers: MarkerSettings {
                block_namespace,
                figure_namespace,
            },
            styles: StyleSettings {
                heading_prefix,
                number_run_style,
                caption_styles,
            },
            numbering: NumberingSettings {
                heading_labels: self.heading_labels.map(|l| l.value).unwrap_or(true),
                restart_numbered_lists: self
                    .restart_numbered_lists
                    .map(|l| l.value)
                    .unwrap_or(true),
            },
            figures: FigureSettings {
                caption_prefix: self
                    .caption_prefix
                    .map(|l| l.value)
                    .unwrap_or_else(|| DEFAULT_CAPTION_PREFIX.to_string()),
            },
            output: OutputSettings {
                backup: self.backup.map(|l| l.value).unwrap_or(true),
                format,
            },
        })
    }
}

fn require_non_empty(
    located: Option<Located<String>>,
    fallback: &str,
    context: &str,
    errors: &mut Vec<ConfigValidationError>,
) -> String {
    match located {
        Some(located) if located.value.trim().is_empty() => {
            errors.push(
                ConfigValidationError::new(Some(located.source), "value cannot be empty".into())
                    .with_context(context),
            );
            fallback.to_string()
        }
        Some(located) => located.value.trim().to_string(),
        None => fallback.to_string(),
    }
}

fn require_namespace(
    located: Option<Located<String>>,
    fallback: &str,
    context: &str,
    errors: &mut Vec<ConfigValidationError>,
) -> String {
    let source = located.as_ref().map(|l| l.source.clone());
    let value = require_non_empty(located, fallback, context, errors);
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        errors.push(
            ConfigValidationError::new(
                source,
                format!("namespace '{value}' may only contain ASCII letters, digits, '_' or '-'"),
            )
            .with_context(context),
        );
    }
    value
}

#[derive(Clone, Debug)]
struct ResolvedConfig {
    markers: MarkerSettings,
    styles: StyleSettings,
    numbering: NumberingSettings,
    figures: FigureSettings,
    output: OutputSettings,
}

/// Container for validation failures, formatted as a bullet list.
#[derive(Debug)]
pub struct ConfigValidationErrors(pub Vec<ConfigValidationError>);

impl fmt::Display for ConfigValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "- {err}")?;
        }
        Ok(())
    }
}

impl ConfigValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigValidationError> {
        self.0.iter()
    }
}

/// Validation failure with optional provenance.
#[derive(Clone, Debug)]
pub struct ConfigValidationError {
    pub source: Option<ConfigSource>,
    pub message: String,
    pub context: Option<String>,
}

impl ConfigValidationError {
    fn new(source: Option<ConfigSource>, message: String) -> Self {
        ConfigValidationError {
            source,
            message,
            context: None,
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: {}", context, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source.describe())?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    markers: Option<RawMarkers>,
    #[serde(default)]
    styles: Option<RawStyles>,
    #[serde(default)]
    numbering: Option<RawNumbering>,
    #[serde(default)]
    figures: Option<RawFigures>,
    #[serde(default)]
    output: Option<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawMarkers {
    block_namespace: Option<String>,
    figure_namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStyles {
    heading_prefix: Option<String>,
    number_run_style: Option<String>,
    caption_styles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawNumbering {
    heading_labels: Option<bool>,
    restart_numbered_lists: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawFigures {
    caption_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    backup: Option<bool>,
    format: Option<String>,
}

impl RawConfig {
    fn into_partial(self, source: ConfigSource) -> PartialConfig {
        let at = |value| Located::new(value, source.clone());
        let mut partial = PartialConfig::default();

        if let Some(markers) = self.markers {
            partial.block_namespace = markers.block_namespace.map(at);
            partial.figure_namespace = markers.figure_namespace.map(at);
        }
        if let Some(styles) = self.styles {
            partial.heading_prefix = styles.heading_prefix.map(at);
            partial.number_run_style = styles.number_run_style.map(at);
            partial.caption_styles = styles
                .caption_styles
                .map(|value| Located::new(value, source.clone()));
        }
        if let Some(numbering) = self.numbering {
            partial.heading_labels = numbering
                .heading_labels
                .map(|value| Located::new(value, source.clone()));
            partial.restart_numbered_lists = numbering
                .restart_numbered_lists
                .map(|value| Located::new(value, source.clone()));
        }
        if let Some(figures) = self.figures {
            partial.caption_prefix = figures.caption_prefix.map(at);
        }
        if let Some(output) = self.output {
            partial.backup = output
                .backup
                .map(|value| Located::new(value, source.clone()));
            partial.format = output.format.map(at);
        }
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_level_parses_style_ids() {
        let styles = Config::builtin().styles;
        assert_eq!(styles.heading_level("Heading1"), Some(1));
        assert_eq!(styles.heading_level("Heading 3"), Some(3));
        assert_eq!(styles.heading_level("Heading0"), None);
        assert_eq!(styles.heading_level("Title"), None);
        assert_eq!(styles.heading_style(2), "Heading2");
    }

    #[test]
    fn caption_style_match_is_case_insensitive() {
        let styles = Config::builtin().styles;
        assert!(styles.is_caption_style("caption"));
        assert!(styles.is_caption_style("ImageCaption"));
        assert!(!styles.is_caption_style("Normal"));
    }

    #[test]
    fn marker_tokens_use_namespaces() {
        let markers = Config::builtin().markers;
        assert_eq!(markers.block_token("scope"), "MANUAL_BLOCK:scope");
        assert_eq!(markers.figure_token("fig-1"), "IMG:fig-1");
    }
}
