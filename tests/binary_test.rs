//! Binary execution tests for the quill-migrate command line
//!
//! Every run gets an explicit --home so nothing touches the real user home.

mod common;

use assert_cmd::Command;
use common::{legacy_workspace, snapshot};
use std::fs;
use std::path::Path;

fn quill(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("quill-migrate").unwrap();
    cmd.env_remove("QUILL_HOME")
        .env("RUST_LOG", "off")
        .arg("--home")
        .arg(home)
        .timeout(std::time::Duration::from_secs(60));
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::cargo_bin("quill-migrate")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["migrate", "migration", "serve"] {
        assert!(text.contains(command), "--help is missing {command}");
    }
}

#[test]
fn test_print_home_honours_the_flag() {
    let fixture = legacy_workspace();
    let output = quill(&fixture.home).arg("--print-home").output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), fixture.home.display().to_string());
}

#[test]
fn test_dry_run_migration_exits_zero_and_writes_nothing() {
    let fixture = legacy_workspace();
    let before = snapshot(&fixture.source);

    let output = quill(&fixture.home)
        .args(["migrate", "--dry-run"])
        .arg(&fixture.source)
        .arg("novel")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stdout(&output));
    let text = stdout(&output);
    assert!(text.contains("Migration succeeded"));
    assert!(text.contains("[dry run]"));

    assert_eq!(snapshot(&fixture.source), before);
    assert!(!fixture.target("novel").exists());
}

#[test]
fn test_missing_source_exits_one() {
    let fixture = legacy_workspace();
    let output = quill(&fixture.home)
        .arg("migrate")
        .arg(fixture.root.path().join("nowhere"))
        .arg("ghost")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Migration failed"));
}

#[test]
fn test_migrate_writes_a_markdown_report() {
    let fixture = legacy_workspace();
    let report = fixture.root.path().join("report.md");

    quill(&fixture.home)
        .args(["migrate", "--type", "config", "--output-report"])
        .arg(&report)
        .arg(&fixture.source)
        .arg("novel")
        .assert()
        .success();

    let text = fs::read_to_string(&report).unwrap();
    assert!(text.starts_with("# Migration report: novel"));
    assert!(fixture.target("novel").join("config.yaml").is_file());
}

#[test]
fn test_rollback_previews_without_force() {
    let fixture = legacy_workspace();
    quill(&fixture.home)
        .arg("migrate")
        .arg(&fixture.source)
        .arg("novel")
        .assert()
        .success();

    let backup = fs::read_dir(fixture.home.join("backups"))
        .unwrap()
        .filter_map(Result::ok)
        .find(|entry| entry.path().is_dir())
        .expect("a backup directory")
        .path();
    fs::write(fixture.source.join("articles/chapter-1.md"), "overwritten").unwrap();

    let preview = quill(&fixture.home)
        .args(["migration", "rollback"])
        .arg(&backup)
        .arg("novel")
        .output()
        .unwrap();
    assert_eq!(preview.status.code(), Some(1));
    assert!(stdout(&preview).contains("Re-run with --force"));
    assert_eq!(
        fs::read_to_string(fixture.source.join("articles/chapter-1.md")).unwrap(),
        "overwritten"
    );

    quill(&fixture.home)
        .args(["migration", "rollback", "--force"])
        .arg(&backup)
        .arg("novel")
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(fixture.source.join("articles/chapter-1.md")).unwrap(),
        "# Chapter 1\n\nIt was raining.\n"
    );
}

#[test]
fn test_rollback_of_a_foreign_workspace_fails() {
    let fixture = legacy_workspace();
    quill(&fixture.home)
        .args(["migrate", "--type", "config"])
        .arg(&fixture.source)
        .arg("novel")
        .assert()
        .success();
    let backup = fs::read_dir(fixture.home.join("backups"))
        .unwrap()
        .filter_map(Result::ok)
        .find(|entry| entry.path().is_dir())
        .expect("a backup directory")
        .path();

    quill(&fixture.home)
        .args(["migration", "rollback", "--force"])
        .arg(&backup)
        .arg("poetry")
        .assert()
        .failure();
}

#[test]
fn test_list_backups_and_cleanup() {
    let fixture = legacy_workspace();
    let empty = quill(&fixture.home)
        .args(["migration", "list-backups"])
        .output()
        .unwrap();
    assert!(empty.status.success());
    assert!(stdout(&empty).contains("No backups"));

    quill(&fixture.home)
        .args(["migrate", "--type", "config"])
        .arg(&fixture.source)
        .arg("novel")
        .assert()
        .success();

    let listed = quill(&fixture.home)
        .args(["migration", "list-backups", "--workspace", "novel"])
        .output()
        .unwrap();
    assert!(stdout(&listed).contains("config"));

    let cleaned = quill(&fixture.home)
        .args(["migration", "cleanup", "--days", "0"])
        .output()
        .unwrap();
    assert!(cleaned.status.success());
    assert!(stdout(&cleaned).contains("Removed 1 backups"));
}

#[test]
fn test_status_of_a_migrated_workspace() {
    let fixture = legacy_workspace();
    quill(&fixture.home)
        .arg("migrate")
        .arg(&fixture.source)
        .arg("novel")
        .assert()
        .success();

    let output = quill(&fixture.home)
        .args(["migration", "status", "novel"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stdout(&output));
    let text = stdout(&output);
    assert!(text.contains("Migrated:  yes"));
    assert!(text.contains("Layout:    valid"));
}
