//! End-to-end CLI tests for the linkdrop binary.

#![allow(deprecated)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Writes a config with one download root and, optionally, a job database.
fn write_config(dir: &Path, with_database: bool) -> PathBuf {
    let root = dir.join("downloads");
    std::fs::create_dir_all(&root).unwrap();

    let mut raw = format!(
        "[sources]\nallowed_schemes = [\"https\"]\nallowed_hosts = [\"1fichier.com\"]\n\n\
         [folders]\nroots = [{root:?}]\n"
    );
    if with_database {
        raw.push_str(&format!(
            "\n[storage]\ndatabase_path = {:?}\n",
            dir.join("jobs.db")
        ));
    }
    let path = dir.join("linkdrop.toml");
    std::fs::write(&path, raw).unwrap();
    path
}

fn linkdrop() -> Command {
    Command::cargo_bin("linkdrop").unwrap()
}

/// Test that --help lists the subcommands.
#[test]
fn test_binary_help_lists_commands() {
    linkdrop()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("clean"));
}

/// Test that --version displays the binary name.
#[test]
fn test_binary_version_displays_version() {
    linkdrop()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("linkdrop"));
}

/// Test that a subcommand is required.
#[test]
fn test_binary_without_command_fails() {
    linkdrop()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

/// Test that a missing config file is reported with its path.
#[test]
fn test_missing_config_fails_with_context() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    linkdrop()
        .arg("--config")
        .arg(&missing)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

/// Test that unknown config keys are rejected.
#[test]
fn test_unknown_config_key_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("linkdrop.toml");
    std::fs::write(&path, "[engine]\nworkers = 4\n").unwrap();
    linkdrop()
        .arg("-c")
        .arg(&path)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}

/// Test that list without a database explains itself.
#[test]
fn test_list_without_database_reports_nothing_to_list() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), false);
    linkdrop()
        .arg("-c")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No job database configured"));
}

/// Test that list on a fresh database prints an empty listing.
#[test]
fn test_list_with_empty_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), true);
    linkdrop()
        .arg("-c")
        .arg(&config)
        .arg("-q")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs."));
    assert!(dir.path().join("jobs.db").exists());
}

/// Test that clean on a fresh database removes nothing.
#[test]
fn test_clean_with_empty_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), true);
    linkdrop()
        .arg("-c")
        .arg(&config)
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 finished job(s)."));
}

/// Test that a link from a host outside the allow-list is rejected.
#[test]
fn test_fetch_rejects_foreign_host() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), false);
    linkdrop()
        .arg("-c")
        .arg(&config)
        .arg("-q")
        .args(["fetch", "https://example.com/file.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("rejected https://example.com/file.bin"))
        .stderr(predicate::str::contains("host 'example.com' is not allowed"));
}

/// Test that a destination outside the roots is rejected.
#[test]
fn test_fetch_rejects_destination_outside_roots() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), false);
    let outside = TempDir::new().unwrap();
    linkdrop()
        .arg("-c")
        .arg(&config)
        .arg("-q")
        .args(["fetch", "https://1fichier.com/?abc123"])
        .arg("--dest")
        .arg(outside.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("outside the allowed folders"));
}

/// Test that resuming an unknown job fails.
#[test]
fn test_resume_unknown_job_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), true);
    linkdrop()
        .arg("-c")
        .arg(&config)
        .arg("-q")
        .args(["resume", "00000000-0000-4000-8000-000000000000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}
