use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use manual_sync_config::{Config, ConfigError, ConfigSourceKind, LoadOptions, ReportFormat};
use tempfile::TempDir;

fn write_file(path: impl AsRef<Path>, contents: &str) {
    let mut file = fs::File::create(path).expect("create config");
    file.write_all(contents.as_bytes()).expect("write config");
}

fn canonical(path: impl AsRef<Path>) -> PathBuf {
    fs::canonicalize(path).expect("canonicalize path")
}

fn validation_message(err: ConfigError) -> String {
    match err {
        ConfigError::Validation(errors) => errors.to_string(),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn loads_defaults_when_no_files_present() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    let config = Config::load(LoadOptions::default().with_working_dir(working_dir.clone()))
        .expect("load defaults");

    assert_eq!(config.sources.working_directory, working_dir);
    assert_eq!(config.markers.block_namespace, "MANUAL_BLOCK");
    assert_eq!(config.markers.figure_namespace, "IMG");
    assert_eq!(config.styles.heading_prefix, "Heading");
    assert_eq!(config.styles.number_run_style, "SectionNumber");
    assert_eq!(
        config.styles.caption_styles,
        vec!["ImageCaption".to_string(), "Caption".to_string()]
    );
    assert!(config.numbering.heading_labels);
    assert!(config.numbering.restart_numbered_lists);
    assert_eq!(config.figures.caption_prefix, "Figure");
    assert!(config.output.backup);
    assert_eq!(config.output.format, ReportFormat::Plain);

    assert_eq!(config.sources.layers.len(), 1);
    assert_eq!(config.sources.layers[0].kind, ConfigSourceKind::Default);
}

#[test]
fn applies_precedence_and_merges_fields() {
    let temp = TempDir::new().expect("tempdir");
    let git_root = canonical(temp.path());
    fs::create_dir(git_root.join(".git")).expect("create .git");

    write_file(
        git_root.join(".manual-sync.toml"),
        r#"
        [markers]
        block_namespace = "DOC_BLOCK"

        [styles]
        heading_prefix = "Titre"
        caption_styles = ["Legend"]

        [output]
        backup = false
        "#,
    );

    let workspace = git_root.join("manual");
    fs::create_dir(&workspace).expect("create workspace");

    write_file(
        workspace.join(".manual-sync.toml"),
        r#"
        [styles]
        heading_prefix = "Heading"

        [numbering]
        restart_numbered_lists = false

        [figures]
        caption_prefix = "Fig."
        "#,
    );

    let override_path = workspace.join("override.toml");
    write_file(
        &override_path,
        r#"
        [output]
        format = "json"
        "#,
    );

    let config = Config::load(
        LoadOptions::default()
            .with_working_dir(&workspace)
            .with_override_path(&override_path),
    )
    .expect("load config with precedence");

    assert_eq!(config.markers.block_namespace, "DOC_BLOCK");
    assert_eq!(config.markers.figure_namespace, "IMG");
    assert_eq!(config.styles.heading_prefix, "Heading");
    assert_eq!(config.styles.caption_styles, vec!["Legend".to_string()]);
    assert!(!config.numbering.restart_numbered_lists);
    assert!(config.numbering.heading_labels);
    assert_eq!(config.figures.caption_prefix, "Fig.");
    assert!(!config.output.backup);
    assert_eq!(config.output.format, ReportFormat::Json);

    let kinds: Vec<_> = config
        .sources
        .layers
        .iter()
        .map(|layer| layer.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ConfigSourceKind::Default,
            ConfigSourceKind::GitRoot,
            ConfigSourceKind::Local,
            ConfigSourceKind::Override
        ]
    );
}

#[test]
fn missing_override_is_reported() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());

    let err = Config::load(
        LoadOptions::default()
            .with_working_dir(&working_dir)
            .with_override_path("absent.toml"),
    )
    .expect_err("expected missing override");

    match err {
        ConfigError::OverrideNotFound { path } => {
            assert_eq!(path, working_dir.join("absent.toml"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_report_format_surfaces_validation_error() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());
    write_file(
        working_dir.join(".manual-sync.toml"),
        r#"
        [output]
        format = "yaml"
        "#,
    );

    let err = Config::load(LoadOptions::default().with_working_dir(&working_dir))
        .expect_err("expected validation failure");
    let joined = validation_message(err);
    assert!(
        joined.contains("unknown report format 'yaml'"),
        "unexpected error output: {joined}"
    );
    assert!(joined.contains("output.format"), "missing context: {joined}");
}

#[test]
fn all_validation_errors_are_collected() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());
    write_file(
        working_dir.join(".manual-sync.toml"),
        r#"
        [markers]
        block_namespace = "bad namespace"
        figure_namespace = ""

        [styles]
        caption_styles = []
        "#,
    );

    let err = Config::load(LoadOptions::default().with_working_dir(&working_dir))
        .expect_err("expected validation failure");
    let joined = validation_message(err);
    assert!(joined.contains("markers.block_namespace"), "{joined}");
    assert!(joined.contains("markers.figure_namespace"), "{joined}");
    assert!(joined.contains("at least one caption style"), "{joined}");
    assert!(joined.contains("local config at"), "{joined}");
}

#[test]
fn unknown_sections_fail_to_parse() {
    let temp = TempDir::new().expect("tempdir");
    let working_dir = canonical(temp.path());
    write_file(
        working_dir.join(".manual-sync.toml"),
        r#"
        [lint]
        rules = ["broken-links"]
        "#,
    );

    let err = Config::load(LoadOptions::default().with_working_dir(&working_dir))
        .expect_err("expected parse failure");
    assert!(matches!(err, ConfigError::Parse { .. }), "unexpected: {err}");
}
