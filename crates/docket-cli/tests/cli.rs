//! End-to-end CLI tests for the `dk` binary.
//!
//! Only offline surfaces are exercised here; anything needing a live
//! backend is covered by the simulation harness instead.

use assert_cmd::Command;
use predicates::prelude::*;

fn dk() -> Command {
    Command::cargo_bin("dk").expect("binary builds")
}

#[test]
fn help_lists_every_subcommand() {
    dk().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("monitor"))
        .stdout(predicate::str::contains("queue"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn queue_without_a_backend_fails_with_guidance() {
    dk().arg("queue")
        .env_remove("DOCKET_URL")
        .env("XDG_CONFIG_HOME", "/nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--base-url"));
}

#[test]
fn malformed_config_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let docket_dir = dir.path().join("docket");
    std::fs::create_dir_all(&docket_dir).expect("config dir");
    std::fs::write(docket_dir.join("config.toml"), "base_url = [not toml").expect("write config");

    dk().arg("queue")
        .env_remove("DOCKET_URL")
        .env("XDG_CONFIG_HOME", dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}

#[test]
fn simulate_small_campaign_passes_and_emits_json() {
    dk().args(["simulate", "--seeds", "3", "--duration-secs", "20", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"all_passed\": true"));
}

#[test]
fn simulate_replays_a_single_seed() {
    dk().args(["simulate", "--seed", "7", "--duration-secs", "15", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"seed\": 7"))
        .stdout(predicate::str::contains("\"oracle_passed\": true"));
}

#[test]
fn simulate_rejects_out_of_range_faults() {
    dk().args(["simulate", "--faults", "1.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 0.0 and 1.0"));
}

#[test]
fn completions_emit_a_bash_script() {
    dk().args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_dk"));
}
