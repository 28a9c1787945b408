//! CLI integration tests for the `seqrelay` binary.
//!
//! These tests run the compiled binary via `std::process::Command`. Each
//! test points `SEQRELAY_CONFIG` at a file it controls so a real user config
//! is never picked up.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir(prefix: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "seqrelay_cli_{prefix}_{}_{id}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/seqrelay.json")
}

fn seqrelay_bin(config: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_seqrelay"));
    cmd.env("SEQRELAY_CONFIG", config);
    cmd.env_remove("SEQRELAY_MAX_WINDOW");
    cmd.env_remove("SEQRELAY_DEADLINE_MS");
    cmd.env_remove("SEQRELAY_WORKERS");
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn version_output() {
    let output = seqrelay_bin(&fixture()).arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("seqrelay") && stdout.contains("0.1.0"), "got: {stdout}");
}

#[test]
fn config_show_prints_fixture() {
    let output = seqrelay_bin(&fixture()).args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["sequencer"]["max_window"], 16);
    assert_eq!(value["stages"]["event_to_text"]["workers"], 3);
}

#[test]
fn config_validate_accepts_fixture() {
    let output = seqrelay_bin(&fixture())
        .args(["config", "validate"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("config ok"));
}

#[test]
fn config_validate_rejects_zero_window() {
    let dir = temp_dir("invalid");
    let path = dir.join("seqrelay.json");
    std::fs::write(&path, r#"{"sequencer": {"maxWindow": 0}}"#).unwrap();

    let output = seqrelay_bin(&path).args(["config", "validate"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_window"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_explicit_config_fails() {
    let output = seqrelay_bin(&fixture())
        .args(["config", "show", "--config", "/nowhere/seqrelay.json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config file not found"));
}

#[test]
fn run_plays_requested_events_and_writes_log() {
    let dir = temp_dir("run");
    let path = dir.join("seqrelay.json");
    let config = serde_json::json!({
        "sequencer": {"maxWindow": 8, "perItemDeadlineMs": 5000},
        "stages": {
            "eventToText": {"workers": 2, "minDelayMs": 10, "maxDelayMs": 80},
            "textToSpeech": {"workers": 2, "minDelayMs": 10, "maxDelayMs": 40}
        },
        "playback": {"delayMs": 10},
        "source": {"burstSize": 2, "spacingMs": 10, "pauseMs": 50},
        "logging": {"directory": dir.join("logs"), "component": "cli-test"}
    });
    std::fs::write(&path, config.to_string()).unwrap();

    let output = seqrelay_bin(&path)
        .args(["run", "--events", "4", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["source"]["submitted"], 4);
    assert_eq!(report["playback"]["played"], 4);
    assert_eq!(report["relay"]["sequencer"]["released"], 4);

    let log = std::fs::read_to_string(dir.join("logs/cli-test.log")).unwrap();
    assert!(log.contains("clip played"));
    let _ = std::fs::remove_dir_all(&dir);
}
