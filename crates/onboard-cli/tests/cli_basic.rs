//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with a private data directory and check the
//! JSON it prints.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_onboard-cli"))
        .args(args)
        .env("ONBOARD_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_ok(data_dir: &Path, args: &[&str]) -> String {
    let (code, stdout, stderr) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn events(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("event line is JSON"))
        .collect()
}

fn status(data_dir: &Path) -> serde_json::Value {
    serde_json::from_str(&run_ok(data_dir, &["status"])).unwrap()
}

#[test]
fn test_status_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let status = status(dir.path());
    assert_eq!(status["state"]["state"], "not_started");
    assert_eq!(status["last_step"], 5);
    assert!(status["timer"].is_null());
}

#[test]
fn test_launch_presents_first_step() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_cli(dir.path(), &["launch"]);
    assert_eq!(code, 0);

    let events = events(&stdout);
    assert_eq!(events[0]["type"], "Installed");
    let presented = events
        .iter()
        .find(|e| e["type"] == "SnippetPresented")
        .expect("snippet presented");
    assert_eq!(presented["snippet"]["step"], 0);
    assert_eq!(presented["snippet"]["topic"], "sync");
    assert!(stderr.contains("[tour] 1/6: sync"));

    let status = status(dir.path());
    assert_eq!(status["state"]["state"], "step_active");
    assert_eq!(status["state"]["presenting"], true);
    assert_eq!(status["timer"]["kind"], "duration");
}

#[test]
fn test_cta_moves_to_interval() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["launch"]);
    let events = events(&run_ok(dir.path(), &["cta"]));
    assert!(events
        .iter()
        .any(|e| e["type"] == "StepFinished" && e["resolution"] == "completed"));

    let status = status(dir.path());
    assert_eq!(status["step"], 1);
    assert_eq!(status["timer"]["kind"], "interval");
    assert_eq!(status["missed"], serde_json::json!([]));
}

#[test]
fn test_dismiss_without_snippet_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["dismiss"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_relaunch_counts_sessions() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["launch"]);
    run_ok(dir.path(), &["launch"]);
    let status = status(dir.path());
    assert_eq!(status["state"]["session_counter"], 2);
    assert_eq!(status["state"]["impression_count"], 2);
}

#[test]
fn test_reset() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["launch"]);
    let events = events(&run_ok(dir.path(), &["reset"]));
    assert!(events.iter().any(|e| e["type"] == "TourReset"));
    assert_eq!(status(dir.path())["state"]["state"], "not_started");
}

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_ok(dir.path(), &["config", "get", "timers.duration_ms"]).trim(), "86400000");
    run_ok(dir.path(), &["config", "set", "timers.duration_ms", "5000"]);
    assert_eq!(run_ok(dir.path(), &["config", "get", "timers.duration_ms"]).trim(), "5000");

    run_ok(dir.path(), &["config", "set", "tour.variation", "b"]);
    run_ok(dir.path(), &["launch"]);
    let status = status(dir.path());
    assert_eq!(status["timer"]["kind"], "duration");
}

#[test]
fn test_config_rejects_bad_values() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["config", "get", "timers.nope"]);
    assert_eq!(code, 1);
    let (code, _, stderr) = run_cli(dir.path(), &["config", "set", "tour.session_cap", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("session_cap"));
}

#[test]
fn test_config_list_and_unknown_key_hint() {
    let dir = tempfile::tempdir().unwrap();
    let list = run_ok(dir.path(), &["config", "list"]);
    assert!(list.lines().any(|l| l == "timers.duration_ms = 86400000"));
    assert!(list.lines().any(|l| l == "tour.session_cap = 3"));

    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "tour.cap"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key: tour.cap"));
    assert!(stderr.contains("tour.session_cap"));

    let out = run_ok(dir.path(), &["config", "set", "timers.interval_ms", "5000"]);
    assert_eq!(out.trim(), "timers.interval_ms = 5000");
}

#[test]
fn test_run_loop_fires_interval() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["config", "set", "timers.interval_ms", "200"]);

    let mut child = Command::new(env!("CARGO_BIN_EXE_onboard-cli"))
        .arg("run")
        .env("ONBOARD_DATA_DIR", dir.path())
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn run loop");

    let mut stdin = child.stdin.take().unwrap();
    writeln!(stdin, "cta").unwrap();
    std::thread::sleep(Duration::from_millis(1_500));
    writeln!(stdin, "quit").unwrap();
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let events = events(&String::from_utf8_lossy(&output.stdout));
    let steps: Vec<u64> = events
        .iter()
        .filter(|e| e["type"] == "SnippetPresented")
        .map(|e| e["snippet"]["step"].as_u64().unwrap())
        .collect();
    assert_eq!(steps, vec![0, 1]);
}
