//! Basic CLI E2E tests.
//!
//! Tests invoke read-only CLI commands via cargo run against the dev data
//! directory and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "starpath-cli", "--"])
        .args(args)
        .env("STARPATH_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_routine_list() {
    let (stdout, _stderr, code) = run_cli(&["routine", "list"]);
    assert_eq!(code, 0, "routine list failed");
    assert!(stdout.contains("morning"));
    assert!(stdout.contains("Marriage Routine"));
}

#[test]
fn test_routine_list_json() {
    let (stdout, _stderr, code) = run_cli(&["routine", "list", "--json"]);
    assert_eq!(code, 0, "routine list --json failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("invalid JSON");
    let entries = parsed.as_array().expect("expected a JSON array");
    assert_eq!(entries.len(), 10);
    // The morning routine is unlocked from the start.
    let morning = entries
        .iter()
        .find(|e| e["key"] == "morning")
        .expect("morning missing");
    assert_eq!(morning["unlocked"], true);
}

#[test]
fn test_routine_show_falls_back_on_unknown_key() {
    let (stdout, _stderr, code) = run_cli(&["routine", "show", "no-such-routine"]);
    assert_eq!(code, 0, "routine show failed");
    assert!(stdout.contains("Morning Routine"));
}

#[test]
fn test_session_status_reports_json() {
    let (stdout, _stderr, code) = run_cli(&["session", "status"]);
    assert_eq!(code, 0, "session status failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("invalid JSON");
    assert!(parsed.get("locked").is_some());
    assert!(parsed.get("session_remaining_ms").is_some());
}

#[test]
fn test_config_path() {
    let (stdout, _stderr, code) = run_cli(&["config", "path"]);
    assert_eq!(code, 0, "config path failed");
    assert!(stdout.contains("config.toml"));
}
