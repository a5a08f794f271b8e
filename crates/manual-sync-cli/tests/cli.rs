use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use manual_sync_test_support::{document_xml_at, DocxFixture};
use predicates::prelude::*;
use tempfile::TempDir;

const MANUAL: &str = r"\section{Overview}
The catalogue lists every video.

\section{Search}
% MANUAL_BLOCK:search-tips
\begin{itemize}
  \item Use quotes for exact titles.
  \item Filter by channel.
\end{itemize}
";

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let source = temp.path().join("manual.tex");
    fs::write(&source, MANUAL).expect("write source");
    let target = DocxFixture::new()
        .heading(1, Some("1"), "Overview")
        .paragraph("Old overview.")
        .heading(1, Some("2"), "Search")
        .marker("[[MANUAL_BLOCK:search-tips]]")
        .bullet("Type something.")
        .write(temp.path(), "manual.docx");
    (temp, source, target)
}

fn cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("manual-sync").expect("binary");
    cmd.current_dir(dir);
    cmd
}

#[test]
fn sync_prints_report_and_writes_target() {
    let (temp, source, target) = setup();

    cmd(temp.path())
        .arg("sync")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("committed"))
        .stdout(predicate::str::contains("changed search-tips"));

    let xml = document_xml_at(&target);
    assert!(xml.contains("The catalogue lists every video."));
    assert!(xml.contains("Filter by channel."));
    assert!(temp.path().join("manual.docx.bak").exists());
}

#[test]
fn dry_run_with_diff_keeps_target() {
    let (temp, source, target) = setup();
    let before = fs::read(&target).expect("read target");

    cmd(temp.path())
        .args(["sync", "--dry-run", "--diff", "--no-backup"])
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("(dry run)"))
        .stdout(predicate::str::contains("+  - Filter by channel."));

    assert_eq!(fs::read(&target).expect("read target"), before);
}

#[test]
fn json_report_lists_skipped_blocks() {
    let (temp, _, target) = setup();
    let source = temp.path().join("other.tex");
    fs::write(
        &source,
        "\\section{Search}\n% MANUAL_BLOCK:missing-block\nNot in the target.\n",
    )
    .expect("write source");

    let output = cmd(temp.path())
        .args(["sync", "--format", "json", "--dry-run"])
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).expect("json report");
    assert_eq!(report["state"], "validated");
    assert_eq!(report["skipped"][0]["id"], "missing-block");
    assert_eq!(report["skipped"][0]["reason"], "anchor_not_found");
}

#[test]
fn quiet_sync_prints_nothing() {
    let (temp, source, target) = setup();

    cmd(temp.path())
        .args(["sync", "-q", "--no-backup"])
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn blocks_prints_extracted_json() {
    let (temp, source, _) = setup();

    cmd(temp.path())
        .arg("blocks")
        .arg("--source")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"search-tips\""))
        .stdout(predicate::str::contains("bullet_list"));
}

#[test]
fn outline_lists_headings_and_markers() {
    let (temp, _, target) = setup();

    cmd(temp.path())
        .arg("outline")
        .arg("--target")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("H1 2 Search"))
        .stdout(predicate::str::contains("marker MANUAL_BLOCK:search-tips"));
}

#[test]
fn missing_source_is_an_argument_error() {
    let (temp, _, target) = setup();

    cmd(temp.path())
        .args(["sync", "--source", "nope.tex"])
        .arg("--target")
        .arg(&target)
        .assert()
        .code(6)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn unreadable_target_exits_with_target_code() {
    let (temp, source, _) = setup();
    let broken = temp.path().join("broken.docx");
    fs::write(&broken, b"not a zip").expect("write broken target");

    cmd(temp.path())
        .arg("sync")
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&broken)
        .assert()
        .code(3);
}

#[test]
fn malformed_config_exits_with_config_code() {
    let (temp, source, target) = setup();
    fs::write(temp.path().join("bad.toml"), "[numbering\n").expect("write config");

    cmd(temp.path())
        .args(["sync", "--config", "bad.toml"])
        .arg("--source")
        .arg(&source)
        .arg("--target")
        .arg(&target)
        .assert()
        .code(5);
}

#[test]
fn unknown_flag_is_an_argument_error() {
    let (temp, _, _) = setup();

    cmd(temp.path()).args(["sync", "--bogus"]).assert().code(6);
}
