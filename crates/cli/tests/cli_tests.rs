//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

fn sentinel(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sentinel"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn rows_file(values: &[f64]) -> tempfile::NamedTempFile {
    let rows: Vec<serde_json::Value> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::json!({ "timestamp": 1_700_000_000 + i as i64, "values": { "load": v } })
        })
        .collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", serde_json::Value::Array(rows)).unwrap();
    file
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sentinel(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Load Sentinel"), "Should show app name");
    for command in ["entities", "status", "discords", "push", "analyze"] {
        assert!(stdout.contains(command), "Should show {command} command");
    }
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sentinel(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sentinel"), "Should show binary name");
}

/// Test analyze command help
#[test]
fn test_analyze_help() {
    let output = sentinel(&["analyze", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Analyze help should succeed");
    assert!(stdout.contains("--file"), "Should show file option");
    assert!(stdout.contains("--window"), "Should show window option");
    assert!(stdout.contains("-k"), "Should show k option");
}

/// Test push command requires a file
#[test]
fn test_push_requires_file() {
    let output = sentinel(&["push", "db-1"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Push without file should fail");
    assert!(stderr.contains("--file"), "Should mention missing file option");
}

/// Test offline analysis finds an injected spike
#[test]
fn test_analyze_json_output() {
    let mut values: Vec<f64> = (0..200)
        .map(|i| 50.0 + 10.0 * (i as f64 * std::f64::consts::TAU / 25.0).sin())
        .collect();
    values[120] += 35.0;
    let file = rows_file(&values);

    let output = sentinel(&[
        "--format",
        "json",
        "analyze",
        "--file",
        file.path().to_str().unwrap(),
        "--window",
        "10",
        "-k",
        "2",
    ]);
    assert!(
        output.status.success(),
        "Analyze should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["samples"], 200);
    assert_eq!(report["profile_len"], 191);
    let discords = report["discords"].as_array().unwrap();
    assert_eq!(discords.len(), 2);
    let top = discords[0]["index"].as_u64().unwrap();
    assert!((111..=120).contains(&top), "top discord at {top}");
    assert_eq!(discords[0]["channel"], "load");
}

/// Test offline analysis rejects a series shorter than two windows
#[test]
fn test_analyze_short_series_fails() {
    let file = rows_file(&[1.0, 2.0, 3.0, 4.0, 5.0]);

    let output = sentinel(&["analyze", "--file", file.path().to_str().unwrap(), "--window", "4"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("insufficient history"), "{stderr}");
}

/// Test a missing rows file is reported
#[test]
fn test_analyze_missing_file() {
    let output = sentinel(&["analyze", "--file", "/nonexistent/rows.json"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to read"), "{stderr}");
}
