//! CLI integration tests for the Clever command-line interface.
//!
//! Each test points the binary at a fresh config directory and database so
//! nothing from the host environment leaks in.

use std::path::PathBuf;
use std::sync::Arc;

use assert_cmd::Command;
use clever_session::{JsonCodec, Session, SessionStore, StoreConfig};
use clever_session_sqlite::SqliteRepository;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the clever binary, isolated under `dir`.
fn clever(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("clever").unwrap();
    cmd.current_dir(dir.path())
        .env("CLEVER_CONFIG_DIR", dir.path().join("config"))
        .env_remove("CLEVER_CONFIG")
        .env_remove("CLEVER_DB")
        .arg("--db")
        .arg(db_path(dir));
    cmd
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("sessions.db")
}

async fn seed(dir: &TempDir, sessions: &[Session]) {
    let repo = Arc::new(SqliteRepository::open(db_path(dir)).unwrap());
    let store = SessionStore::new(repo, Arc::new(JsonCodec::new()), StoreConfig::default());
    for session in sessions {
        store.create(session).await.unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("session store"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clever"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("config"));

    clever(&dir)
        .args(["sessions", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("online"))
        .stdout(predicate::str::contains("count"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("purge"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_purge_requires_age() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .args(["sessions", "purge"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--older-than-secs"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_count_on_empty_database() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .args(["sessions", "count", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"online\": 0"))
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn test_show_missing_session_fails() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .args(["sessions", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[tokio::test]
async fn test_seeded_sessions_are_listed_and_counted() {
    let dir = TempDir::new().unwrap();
    seed(
        &dir,
        &[
            Session::new("abc123")
                .with_attribute("authenticated", "true")
                .with_attribute("login_name", "alice"),
            Session::new("def456").with_attribute("authenticated", false),
        ],
    )
    .await;

    clever(&dir)
        .args(["sessions", "count", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"online\": 1"))
        .stdout(predicate::str::contains("\"offline\": 1"));

    clever(&dir)
        .args(["sessions", "online", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123"))
        .stdout(predicate::str::contains("alice"))
        .stdout(predicate::str::contains("def456").not());

    clever(&dir)
        .args(["sessions", "show", "abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login_name"))
        .stdout(predicate::str::contains("online"));
}

#[tokio::test]
async fn test_delete_removes_session() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &[Session::new("abc123").with_attribute("authenticated", "true")]).await;

    clever(&dir)
        .args(["sessions", "delete", "abc123", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deleted\": true"));

    clever(&dir)
        .args(["sessions", "delete", "abc123", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deleted\": false"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_reflects_project_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("clever.toml"),
        "[session]\nmax_sessions = 42\nauthenticated_key = \"signed_in\"\n",
    )
    .unwrap();

    clever(&dir)
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_sessions\": 42"))
        .stdout(predicate::str::contains("signed_in"));
}

#[test]
fn test_config_layers_merge_per_key() {
    let dir = TempDir::new().unwrap();
    let user_dir = dir.path().join("config");
    std::fs::create_dir_all(&user_dir).unwrap();
    std::fs::write(user_dir.join("config.toml"), "[session]\nmax_sessions = 50\n").unwrap();
    std::fs::write(
        dir.path().join("clever.toml"),
        "[session]\nrepository_timeout_ms = 100\n",
    )
    .unwrap();

    clever(&dir)
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"max_sessions\": 50"))
        .stdout(predicate::str::contains("\"repository_timeout_ms\": 100"));
}

#[test]
fn test_config_which_lists_sources() {
    let dir = TempDir::new().unwrap();
    clever(&dir)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clever.toml"))
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_broken_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("clever.toml"), "[session\n").unwrap();

    clever(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}
