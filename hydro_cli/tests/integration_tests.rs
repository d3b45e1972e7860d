//! Integration tests for the hydro binary.
//!
//! These tests verify end-to-end behavior including:
//! - Goal, progress and decode one-shots
//! - Live sessions driven by mock intake and stdin commands
//! - Source exclusivity and unsupported-host reporting
//! - Exports and config overrides

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a scratch directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("hydro"))
}

/// Config file with defaults only, so tests never read the user's config
fn default_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, "").unwrap();
    path
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Smart bottle hydration tracker"));
}

#[test]
fn test_goal_for_weight() {
    cli()
        .args(["goal", "--weight", "70"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daily goal: 2450 ml"));
}

#[test]
fn test_goal_without_weight_prompts() {
    cli()
        .args(["goal", "--weight", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enter your weight to set a goal."));
}

#[test]
fn test_non_finite_weight_is_rejected() {
    for weight in ["inf", "NaN", "-inf"] {
        cli()
            .args(["watch", "--weight", weight])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Weight must be a finite number"));
    }

    cli()
        .args(["goal", "--weight", "inf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Weight must be a finite number"));
}

#[test]
fn test_non_finite_weight_command_keeps_goal() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["watch", "--weight", "70"])
        .write_stdin("weight inf
status
quit
")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Intake:   0 ml / 2450 ml (0%)"))
        .stderr(predicate::str::contains("Weight must be a finite number: inf"));
}

#[test]
fn test_progress_ahead_of_goal() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["progress", "--intake", "3000", "--weight", "70"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Progress:  100%"))
        .stdout(predicate::str::contains("Remaining: 0 ml"))
        .stdout(predicate::str::contains("You are ahead by 550 ml."));
}

#[test]
fn test_progress_uses_config_weight() {
    let temp_dir = setup_test_dir();
    let config = temp_dir.path().join("config.toml");
    fs::write(&config, "[profile]\nweight_kg = 80.0\n").unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .args(["progress", "--intake", "1400"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Goal:      2800 ml"))
        .stdout(predicate::str::contains("Progress:  50%"))
        .stdout(predicate::str::contains("You are behind by 1400 ml."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = setup_test_dir();
    let config = temp_dir.path().join("config.toml");
    fs::write(&config, "[mock]\nperiod_secs = 0\n").unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .args(["goal", "--weight", "70"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("period_secs"));
}

#[test]
fn test_decode_payload() {
    cli()
        .args(["decode", "2c010000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("300 ml"));
}

#[test]
fn test_decode_rejects_short_payload() {
    cli()
        .args(["decode", "2c0100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MalformedPayload"));
}

#[test]
fn test_decode_rejects_bad_hex() {
    cli()
        .args(["decode", "zz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid hex payload"));
}

#[test]
fn test_mock_session_stops_after_max_readings() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["watch", "--mock", "--max-readings", "2", "--mock-period-ms", "20"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: Mocking intake..."))
        .stdout(predicate::str::contains("Session ended: 2 reading(s)"));
}

#[test]
fn test_mock_session_json_output() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args([
            "watch",
            "--mock",
            "--json",
            "--max-readings",
            "1",
            "--mock-period-ms",
            "20",
            "--mock-seed",
            "7",
        ])
        .timeout(std::time::Duration::from_secs(10))
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let readings: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| l.contains(r#""type":"reading""#))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let first = readings.first().expect("reading line");
    assert!((15..=59).contains(&first["intake_ml"].as_u64().unwrap()));

    // Final snapshot is the pretty-printed tail and counts every printed reading
    let snapshot_start = stdout.find("{\n").expect("snapshot");
    let snapshot: serde_json::Value = serde_json::from_str(&stdout[snapshot_start..]).unwrap();
    assert_eq!(snapshot["readings"], readings.len());
    assert_eq!(snapshot["intake_ml"], readings[readings.len() - 1]["intake_ml"]);
    assert_eq!(snapshot["history"]["total_records"], readings.len());
    assert_eq!(snapshot["mock_active"], false);
}

#[test]
fn test_connect_on_unsupported_host() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    cli()
        .arg("--config")
        .arg(&config)
        .arg("watch")
        .write_stdin("connect\nquit\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: Requesting device...").not())
        .stdout(predicate::str::contains("Bluetooth LE not supported"));
}

#[test]
fn test_connect_refused_while_mocking() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    cli()
        .arg("--config")
        .arg(&config)
        .arg("watch")
        .write_stdin("mock on\nconnect\nmock off\nquit\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: Mocking intake..."))
        .stdout(predicate::str::contains("Status: Disconnected"))
        .stderr(predicate::str::contains("Mock mode is on"));
}

#[test]
fn test_stdin_commands() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);

    cli()
        .arg("--config")
        .arg(&config)
        .arg("watch")
        .write_stdin("help\nweight 0\nactivity extreme\nstatus\nfrobnicate\nquit\n")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("mock on|off"))
        .stdout(predicate::str::contains("Enter your weight to set a goal."))
        .stdout(predicate::str::contains("Synced:   never"))
        .stdout(predicate::str::contains("Goal:     In Progress"))
        .stdout(predicate::str::contains("Records:  0"))
        .stdout(predicate::str::contains("Average:  0 ml"))
        .stdout(predicate::str::contains("Highest:  0 ml"))
        .stderr(predicate::str::contains("Unknown activity level"))
        .stderr(predicate::str::contains("Unknown command: frobnicate"));
}

#[test]
fn test_export_readings_on_exit() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);
    let export_path = temp_dir.path().join("out").join("readings.csv");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["watch", "--mock", "--max-readings", "3", "--mock-period-ms", "10"])
        .arg("--export")
        .arg(&export_path)
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported readings"));

    let contents = fs::read_to_string(&export_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "timestamp,intake_ml");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_export_command_daily_totals() {
    let temp_dir = setup_test_dir();
    let config = default_config(&temp_dir);
    let export_path = temp_dir.path().join("daily.csv");

    cli()
        .arg("--config")
        .arg(&config)
        .arg("watch")
        .write_stdin(format!("export {}\nquit\n", export_path.display()))
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported daily totals"));

    assert_eq!(fs::read_to_string(&export_path).unwrap(), "day,ml\n");
}
