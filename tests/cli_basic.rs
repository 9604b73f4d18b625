//! Integration tests for basic CLI behavior.
//!
//! Every test points `--config` at a temporary file, so the user's real
//! configuration is never read or written and no network access happens.

#![allow(deprecated)] // cargo_bin deprecation; replacement not yet stable

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper: get a Command for the `reelscout` binary using `config` as its
/// configuration file.
fn reelscout(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reelscout").expect("binary 'reelscout' should be built");
    cmd.arg("--config").arg(config).env("TMDB_API_KEY", "");
    cmd
}

fn config_in(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("streaming.json")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: reelscout"))
        .stdout(predicate::str::contains("resolve"))
        .stdout(predicate::str::contains("providers"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn version_flag_shows_semver() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^reelscout \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_subcommand_is_an_error() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn resolve_help_lists_arguments() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .args(["resolve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--tmdb-id"))
        .stdout(predicate::str::contains("--title"))
        .stdout(predicate::str::contains("--season"))
        .stdout(predicate::str::contains("--json"));
}

// ─── resolve ─────────────────────────────────────────────────────────────────

#[test]
fn resolve_requires_tmdb_id() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .args(["resolve", "--title", "Inception"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tmdb-id"));
}

#[test]
fn resolve_season_requires_episode() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .args(["resolve", "--tmdb-id", "1399", "--title", "Game of Thrones", "--season", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--episode"));
}

#[test]
fn resolve_rejects_zero_id() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .args(["resolve", "--tmdb-id", "0", "--title", "Inception"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid content descriptor"));
}

#[test]
fn resolve_with_everything_disabled_fails() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    for name in ["yesmovies", "vidlink"] {
        reelscout(&config).args(["config", "disable", name]).assert().success();
    }

    reelscout(&config)
        .args(["resolve", "--tmdb-id", "27205", "--title", "Inception", "--year", "2010"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active providers"));
}

// ─── providers / config ──────────────────────────────────────────────────────

#[test]
fn providers_lists_builtins() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("yesmovies"))
        .stdout(predicate::str::contains("vidlink"))
        .stdout(predicate::str::contains("2 configured, 2 active"));
}

#[test]
fn providers_json_is_parseable() {
    let dir = TempDir::new().unwrap();
    let output = reelscout(&config_in(&dir))
        .args(["providers", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<_> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["yesmovies", "vidlink"]);
}

#[test]
fn config_show_writes_default_file() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    reelscout(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"maxRetries\": 3"))
        .stdout(predicate::str::contains("\"groupSize\": 3"));
    assert!(config.exists());
}

#[test]
fn disable_then_enable_round_trips() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    reelscout(&config)
        .args(["config", "disable", "vidlink"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Disabled vidlink"));
    reelscout(&config)
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"))
        .stdout(predicate::str::contains("1 active, 1 disabled"));

    reelscout(&config).args(["config", "enable", "vidlink"]).assert().success();
    reelscout(&config)
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 active"));
}

#[test]
fn unknown_provider_is_reported() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .args(["config", "enable", "netflix"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No provider named 'netflix'"));
}

#[test]
fn add_validates_domain() {
    let dir = TempDir::new().unwrap();
    reelscout(&config_in(&dir))
        .args(["config", "add", "vidlink", "--domain", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid domain"));
}

#[test]
fn add_remove_and_reset() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    reelscout(&config)
        .args(["config", "add", "vidlink", "--domain", "https://mirror.example", "--priority", "1"])
        .assert()
        .success();
    reelscout(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://mirror.example"));

    reelscout(&config).args(["config", "remove", "yesmovies"]).assert().success();
    reelscout(&config)
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("not configured"));

    reelscout(&config).args(["config", "reset"]).assert().success();
    reelscout(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://vidlink.pro"));
}
