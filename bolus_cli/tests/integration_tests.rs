//! Integration tests for the autobolus binary.
//!
//! These tests verify end-to-end behavior including:
//! - Dose decisions from input files
//! - IOB history accounting on confirmed and failed submission
//! - Separation of liver inputs from dosing inputs
//! - Liver infusion and projection commands

mod common;

use common::*;
use fs2::FileExt;
use predicates::prelude::*;
use serde_json::json;
use std::fs;

#[test]
fn test_cli_help() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Closed-loop insulin micro-dosing decision engine",
        ));
}

#[test]
fn test_dry_run_high_glucose_would_bolus() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would bolus 0.30U"))
        .stdout(predicate::str::contains("Dry run"));

    assert!(!data_dir.join("iobHistory.json").exists());
}

#[test]
fn test_dry_run_capped_by_iob() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);
    write_iob(data_dir, &[(20, 1.4), (120, 2.0)]);

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would bolus 0.10U"));
}

#[test]
fn test_falling_trend_means_no_bolus() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "DoubleDown");
    write_profile(data_dir);

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("No bolus"))
        .stdout(predicate::str::contains("falling"));
}

#[test]
fn test_iob_cap_means_no_bolus_and_history_untouched() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 200.0, "Flat");
    write_profile(data_dir);
    write_iob(data_dir, &[(30, 0.3), (20, 0.6), (10, 0.6)]);
    let before = fs::read_to_string(data_dir.join("iobHistory.json")).unwrap();

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .env("AUTOBOLUS_API_URL", UNREACHABLE_URL)
        .env("AUTOBOLUS_API_KEY", "test-secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("IOB cap hit"));

    let after = fs::read_to_string(data_dir.join("iobHistory.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_confirmed_dose_is_recorded_and_trimmed() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);
    // A full history, all older than the IOB window
    let old: Vec<(i64, f64)> = (0..50).map(|i| (250 - i, 0.05)).collect();
    write_iob(data_dir, &old);
    let before: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(data_dir.join("iobHistory.json")).unwrap())
            .unwrap();

    let (url, server) = accept_one_treatment();
    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .env("AUTOBOLUS_API_URL", url)
        .env("AUTOBOLUS_API_KEY", "test-secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("AutoBolus 0.30U sent"));

    let body = server.join().unwrap();
    assert_eq!(body["insulin"], 0.3);
    assert_eq!(body["eventType"], "Auto Correction");
    assert_eq!(body["secret"], "test-secret");
    assert!(body["dateString"].as_str().unwrap().ends_with('Z'));

    let after: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(data_dir.join("iobHistory.json")).unwrap())
            .unwrap();
    assert_eq!(after.len(), 50);
    assert_eq!(after[0]["time"], before[1]["time"]);
    assert_eq!(after[49]["insulin"], 0.3);
    assert_eq!(after[49]["time"], body["time"]);

    let lock = fs::File::open(data_dir.join("iobHistory.json.lock")).unwrap();
    assert!(lock.try_lock_exclusive().is_ok());
    lock.unlock().unwrap();
}

#[test]
fn test_liver_variables_do_not_change_dose() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--dry-run")
        .env("AUTOBOLUS_LIVER_ISF", "50")
        .env("AUTOBOLUS_LIVER_CR", "10")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would bolus 0.30U"))
        .stdout(predicate::str::contains("ISF 2.00"));
}

#[test]
fn test_dosing_sensitivity_override() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--dry-run")
        .env("AUTOBOLUS_DOSING_ISF", "4")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would bolus 0.25U"));
}

#[test]
fn test_failed_submission_is_reported_not_recorded() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);
    write_iob(data_dir, &[(30, 0.2)]);
    let before = fs::read_to_string(data_dir.join("iobHistory.json")).unwrap();

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .env("AUTOBOLUS_API_URL", UNREACHABLE_URL)
        .env("AUTOBOLUS_API_KEY", "test-secret")
        .assert()
        .success()
        .stderr(predicate::str::contains("not confirmed"));

    let after = fs::read_to_string(data_dir.join("iobHistory.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_no_profile_halts_cycle() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .env("AUTOBOLUS_API_URL", UNREACHABLE_URL)
        .env("AUTOBOLUS_API_KEY", "test-secret")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No active profile"));
}

#[test]
fn test_missing_submission_url_is_config_error() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_sgv(data_dir, 180.0, "Flat");
    write_profile(data_dir);

    cli(&temp_dir)
        .arg("dose")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_liver_with_flat_curve() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_flat_curve(data_dir);
    let output = data_dir.join("latest_liver.json");

    cli(&temp_dir)
        .arg("liver")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--hour")
        .arg("3")
        .arg("--output")
        .arg(&output)
        .env("AUTOBOLUS_LIVER_ISF", "50")
        .env("AUTOBOLUS_LIVER_CR", "10")
        .assert()
        .success()
        .stdout(predicate::str::contains("Base liver glucose infusion: 4.1667"))
        .stdout(predicate::str::contains("at hour 3: 4.1667"));

    let written: f64 = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert!((written - 50.0 / 10.0 * 10.0 / 12.0).abs() < 1e-9);
}

#[test]
fn test_liver_requires_isf_and_cr() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_flat_curve(data_dir);

    cli(&temp_dir)
        .arg("liver")
        .arg("--data-dir")
        .arg(data_dir)
        .env("AUTOBOLUS_LIVER_ISF", "50")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AUTOBOLUS_LIVER_CR"));
}

#[test]
fn test_project_writes_twelve_values() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_json(data_dir, "sgv_start.json", json!({ "start": 100 }));
    let output = data_dir.join("simulated_bg_curve.json");

    cli(&temp_dir)
        .arg("project")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("BG start: 100 mg/dL"))
        .stdout(predicate::str::contains("Simulated BG (1 hour)"));

    let curve: Vec<i64> = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(curve.len(), 12);
    assert!(curve.windows(2).all(|w| w[0] <= w[1]));
    assert!(curve[0] > 100);
}

#[test]
fn test_project_with_recent_steps() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    write_json(data_dir, "sgv_start.json", json!({ "start": 100 }));
    write_json(
        data_dir,
        "steps.json",
        json!([{ "time": minutes_ago(15), "steps": 1200 }]),
    );

    cli(&temp_dir)
        .arg("project")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Mode: Steps"))
        // 100 + 50 * 1.3 over the hour
        .stdout(predicate::str::contains("165]"));
}

#[test]
fn test_carbs_curve() {
    let temp_dir = setup_test_dir();
    cli(&temp_dir)
        .arg("carbs")
        .arg("50")
        .assert()
        .success()
        .stdout(predicate::str::contains("Absorption curve for 50g carbs"))
        .stdout(predicate::str::contains("Minute 60:"))
        .stdout(predicate::str::contains("Minute 180:"));
}
