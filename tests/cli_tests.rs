//! CLI integration tests for waveplan
//!
//! Runs the built binary against throwaway session directories.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Temp working dir with the cache switched off
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("waveplan.toml"),
        "[cache]\nenabled = false\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();
    dir
}

fn waveplan(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("waveplan").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("WAVEPLAN_SESSION")
        .env_remove("WAVEPLAN_CONFIG")
        .env_remove("RUST_LOG")
        .args(["--no-color", "--session", "run"]);
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

// =============================================================================
// Help
// =============================================================================

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("waveplan")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("skip-wave2"))
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("sources"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = workspace();
    waveplan(&dir)
        .args(["--config", "nope.toml", "status"])
        .assert()
        .failure();
}

// =============================================================================
// Phase gate
// =============================================================================

#[test]
fn test_verify_blocked_then_open() {
    let dir = workspace();

    waveplan(&dir)
        .args(["verify", "pivot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("wave-1-validated.json"));

    waveplan(&dir).args(["mark", "wave1"]).assert().success();
    waveplan(&dir).args(["mark", "wave1-validated"]).assert().success();
    waveplan(&dir)
        .args(["verify", "pivot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pivot may proceed"));
}

#[test]
fn test_mark_out_of_order_writes_nothing() {
    let dir = workspace();
    waveplan(&dir).args(["mark", "synthesis"]).assert().failure();
    assert!(!dir.path().join("run/analysis/synthesis-complete.json").exists());
}

#[test]
fn test_mark_wave1_records_output_count() {
    let dir = workspace();
    let wave = dir.path().join("run/wave-1");
    fs::create_dir_all(&wave).unwrap();
    fs::write(wave.join("security-analyst-1.md"), "a").unwrap();
    fs::write(wave.join("web-researcher-1.md"), "b").unwrap();
    fs::write(wave.join("notes.txt"), "ignored").unwrap();

    waveplan(&dir).args(["mark", "wave1"]).assert().success();

    let marker: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("run/analysis/wave-1-complete.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(marker["metrics"]["outputs"], 2);

    waveplan(&dir)
        .arg("count")
        .assert()
        .success()
        .stdout(predicate::str::contains("wave-1"))
        .stdout(predicate::str::contains("2"));
}

#[test]
fn test_skip_wave2_opens_citations() {
    let dir = workspace();
    for stage in ["wave1", "wave1-validated", "pivot"] {
        waveplan(&dir).args(["mark", stage]).assert().success();
    }
    waveplan(&dir).args(["verify", "citations"]).assert().failure();

    waveplan(&dir)
        .args(["skip-wave2", "no triggers fired"])
        .assert()
        .success();
    waveplan(&dir).args(["verify", "citations"]).assert().success();

    let status = stdout_json(waveplan(&dir).args(["status", "--json"]));
    assert_eq!(status["next"], "citations");
    let wave2 = &status["stages"][3];
    assert_eq!(wave2["skipped"], true);
    assert_eq!(wave2["marker"], "wave-2-skipped.json");
}

// =============================================================================
// Classification and sources
// =============================================================================

#[test]
fn test_classify_keyword_only_json() {
    let dir = workspace();
    let report = stdout_json(waveplan(&dir).args([
        "classify",
        "--keyword-only",
        "--json",
        "Research OSINT tools for threat intelligence",
    ]));

    assert_eq!(report["result"]["primary_domain"], "security");
    assert_eq!(report["result"]["complexity"], "COMPLEX");
    assert_eq!(report["result"]["worker_count"], 6);
    assert_eq!(report["cached"], false);
}

#[test]
fn test_sources_fails_on_vendor_heavy_list() {
    let dir = workspace();
    waveplan(&dir)
        .args([
            "sources",
            "https://www.crowdstrike.com/a",
            "https://www.fortinet.com/b",
            "https://www.paloaltonetworks.com/c",
            "https://www.reuters.com/d",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vendor_heavy"));
}

#[test]
fn test_sources_passes_balanced_list() {
    let dir = workspace();
    waveplan(&dir)
        .args([
            "sources",
            "https://arxiv.org/abs/2401.00001",
            "https://www.nist.gov/report",
            "https://www.reuters.com/story",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("quality gate passed"));
}
