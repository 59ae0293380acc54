// Regression tests for the demo harness binary.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use std::fs;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn demo() -> Command {
    let mut cmd = Command::cargo_bin("suitecraft-demo").unwrap();
    cmd.env_remove("SUITECRAFT_DEMO_BROKEN")
        .env_remove("RUST_LOG")
        .arg("--color")
        .arg("never");
    cmd
}

#[test]
fn demo_suites_pass() {
    demo().assert().success().stdout(
        contains("PASS: Math > 1+2=3")
            .and(contains("PASS: Math > 2+2=4"))
            .and(contains("PASS: Inventory > north stocks bolt"))
            .and(contains("PASS: Inventory > north stocks nut"))
            .and(contains("SKIP: Inventory > audit of north (audits only run in the south)"))
            .and(contains("PASS: Transfers > moves 250 EUR"))
            .and(contains("Test summary: total 6, 5 passed, 0 failed, 1 skipped")),
    );
}

#[test]
fn list_prints_titles_without_running() {
    demo().arg("--list").assert().success().stdout(
        contains("Math > 1+2=3")
            .and(contains("Transfers > moves 250 EUR"))
            .and(contains("6 tests"))
            .and(contains("PASS").not()),
    );
}

#[test]
fn filter_selects_tests_by_full_title() {
    demo()
        .arg("^Inventory > north")
        .assert()
        .success()
        .stdout(
            contains("north stocks bolt")
                .and(contains("Math").not())
                .and(contains("Test summary: total 2, 2 passed")),
        );
}

#[test]
fn verbose_output_shows_steps() {
    demo()
        .args(["Inventory", "-v"])
        .assert()
        .success()
        .stdout(contains("  step: checking north for bolt").and(contains("  step: moved to south")));
}

#[test]
fn json_report_is_machine_readable() {
    let output = demo().args(["--format", "json"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["passed"], 5);
    assert_eq!(report["skipped"], 1);
    let transfer = report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["suite"] == "Transfers")
        .unwrap();
    assert_eq!(transfer["title"], "moves 250 EUR");
    assert_eq!(transfer["annotations"][0]["kind"], "issue");
}

#[test]
fn config_file_is_applied_and_flags_win() {
    let path = std::env::temp_dir().join(format!("suitecraft-cli-{}.yaml", std::process::id()));
    fs::write(&path, "filter: \"^Math\"\nformat: json\n").unwrap();

    let output = demo().arg("--config").arg(&path).output().unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["passed"], 2);

    demo()
        .arg("--config")
        .arg(&path)
        .args(["--format", "human"])
        .assert()
        .success()
        .stdout(contains("Test summary: total 2, 2 passed"));

    let _ = fs::remove_file(&path);
}

#[test]
fn invalid_filter_is_reported_with_a_diagnostic() {
    demo()
        .arg("(unclosed")
        .assert()
        .code(2)
        .stderr(contains("suitecraft::config::filter").or(contains("invalid test filter")));
}

#[test]
fn broken_suites_fail_the_run_with_diagnostics() {
    demo()
        .env("SUITECRAFT_DEMO_BROKEN", "1")
        .assert()
        .failure()
        .stdout(
            contains("FAIL: Broken > always fails")
                .and(contains("ERROR: [OutOfRange]"))
                .and(contains("PASS: Math > 1+2=3")),
        )
        .stderr(contains("suitecraft::assembly::template").or(contains("needs $3")));
}
