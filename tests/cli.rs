//! End-to-end tests of the `devsync` binary.
//!
//! stdout is piped under the test harness, so every command answers in JSON.

use assert_cmd::Command;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const AGENT: &str = r#"{"kind":"agent","id":"a1","name":"Bot","role":"Helper",
"instructions":"Be helpful.\n","created_at":"2024-01-01T00:00:00Z",
"updated_at":"2024-01-01T00:00:00Z"}"#;

fn devsync(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("devsync").unwrap();
    cmd.arg("--db").arg(db).env("RUST_LOG", "off");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn stderr_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stderr).unwrap()
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("devsync.db");
    let output = devsync(&db).arg("version").output().unwrap();
    assert!(output.status.success());
    let version = stdout_json(&output);
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(version["database"], db.display().to_string());
    assert!(!db.exists());
}

#[test]
fn test_status_without_session() {
    let home = TempDir::new().unwrap();
    let output = devsync(&home.path().join("devsync.db"))
        .arg("status")
        .output()
        .unwrap();
    assert!(output.status.success());
    let status = stdout_json(&output);
    assert!(status["config"].is_null());
    assert_eq!(status["cached_files"], 0);
}

#[test]
fn test_export_requires_session() {
    let home = TempDir::new().unwrap();
    let output = devsync(&home.path().join("devsync.db"))
        .arg("export")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stderr_json(&output)["error"]["code"], "SYNC_INACTIVE");
}

#[test]
fn test_init_missing_directory_fails() {
    let home = TempDir::new().unwrap();
    let output = devsync(&home.path().join("devsync.db"))
        .arg("init")
        .arg(home.path().join("nowhere"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stderr_json(&output)["error"]["code"], "FILE_NOT_FOUND");
}

#[test]
fn test_unknown_category_is_rejected() {
    let home = TempDir::new().unwrap();
    let output = devsync(&home.path().join("devsync.db"))
        .args(["toggle", "widgets", "on"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert_eq!(stderr_json(&output)["error"]["code"], "INVALID_ARGUMENT");
}

#[test]
fn test_sync_round_trip() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let db = home.path().join("devsync.db");

    let output = devsync(&db)
        .args(["entity", "put"])
        .write_stdin(AGENT)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["saved"][0], "agent:a1");

    // Initial export
    let output = devsync(&db)
        .arg("init")
        .arg(root.path())
        .args(["--only", "agents"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let init = stdout_json(&output);
    assert_eq!(init["files_written"], 1);
    assert_eq!(init["config"]["is_active"], true);
    let written = std::fs::read_to_string(root.path().join("agents/a1.md")).unwrap();
    assert!(written.contains("name: Bot"));
    assert!(written.contains("Be helpful."));

    // Nothing changed, nothing written
    let output = devsync(&db).arg("export").output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["stats"]["categories"]["agent"]["written"], 0);

    // A file created outside the app is imported
    std::fs::write(
        root.path().join("agents/a9.md"),
        "---\nid: a9\nname: Hand Written\ncreated_at: 2024-02-01T00:00:00Z\n\
         updated_at: 2024-02-01T00:00:00Z\n---\nWritten by hand.\n",
    )
    .unwrap();
    let output = devsync(&db).arg("import").output().unwrap();
    assert!(output.status.success());
    let import = stdout_json(&output);
    assert_eq!(import["stats"]["categories"]["agent"]["created"], 1);
    assert_eq!(import["stats"]["categories"]["agent"]["skipped"], 1);

    let output = devsync(&db).args(["entity", "list", "agent"]).output().unwrap();
    let ids: Vec<String> = stdout_json(&output)
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["a1".to_string(), "a9".to_string()]);

    // Removing the record removes its file
    let output = devsync(&db)
        .args(["entity", "remove", "agent", "a1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["files_removed"], 1);
    assert!(!root.path().join("agents/a1.md").exists());

    // Stop leaves files in place and deactivates
    let output = devsync(&db).arg("stop").output().unwrap();
    assert_eq!(stdout_json(&output)["stopped"], true);
    assert!(root.path().join("agents/a9.md").exists());

    let output = devsync(&db).arg("status").output().unwrap();
    assert_eq!(stdout_json(&output)["config"]["is_active"], false);
}

#[test]
fn test_remove_missing_entity() {
    let home = TempDir::new().unwrap();
    let output = devsync(&home.path().join("devsync.db"))
        .args(["entity", "remove", "task", "t404"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["code"], "ENTITY_NOT_FOUND");
    assert!(err["error"]["hint"].as_str().unwrap().contains("entity list task"));
}
