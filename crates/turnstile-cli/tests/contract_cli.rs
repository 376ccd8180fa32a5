use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn turnstile() -> Command {
    let mut cmd = Command::cargo_bin("turnstile").unwrap();
    for var in [
        "TURNSTILE_CONFIG",
        "TURNSTILE_MAX_PER_WINDOW",
        "TURNSTILE_WINDOW",
        "TURNSTILE_MAX_VIOLATIONS",
        "TURNSTILE_BLOCK_DURATION",
        "TURNSTILE_MAX_CAPACITY",
        "TURNSTILE_SWEEP_INTERVAL",
        "TURNSTILE_STALE_THRESHOLD",
        "TURNSTILE_ENFORCE",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn config_prints_effective_defaults() {
    turnstile()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_per_window: 6"))
        .stdout(predicate::str::contains("block_duration: 5m"))
        .stdout(predicate::str::contains("stale_threshold: 10m"))
        .stdout(predicate::str::contains("enforce: true"));
}

#[test]
fn config_loads_file_and_env_overrides_it() {
    turnstile()
        .args(["config", "--config"])
        .arg(fixture("tight_policy.yaml"))
        .env("TURNSTILE_MAX_CAPACITY", "9")
        .assert()
        .success()
        .stdout(predicate::str::contains("window: 10s"))
        .stdout(predicate::str::contains("max_per_window: 2"))
        .stdout(predicate::str::contains("max_capacity: 9"));
}

#[test]
fn config_invalid_policy_exits_with_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "max_per_window: 0\n").unwrap();

    turnstile()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("max_per_window"));
}

#[test]
fn replay_json_reports_escalation_and_expiry() {
    let out = turnstile()
        .args(["replay", "--format", "json", "--scenario"])
        .arg(fixture("burst.yaml"))
        .output()
        .unwrap();
    assert!(out.status.success());

    let lines: Vec<Value> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is JSON"))
        .collect();
    assert_eq!(lines.len(), 12);

    let code = |i: usize| lines[i]["verdict"]["reason_code"].clone();
    for line in &lines[..6] {
        assert_eq!(line["verdict"]["allowed"], true);
    }
    assert_eq!(lines[5]["verdict"]["remaining"], 0);
    assert_eq!(code(6), "RATE_LIMITED");
    assert_eq!(code(7), "RATE_LIMITED");
    assert_eq!(code(8), "BLOCK_IMPOSED");
    assert_eq!(lines[8]["verdict"]["retry_after_ms"], 300_000);
    assert_eq!(code(9), "TEMPORARILY_BLOCKED");
    assert_eq!(lines[10]["op"], "status");
    assert_eq!(lines[10]["verdict"]["remaining"], 6);
    assert_eq!(lines[11]["verdict"]["allowed"], true);
    assert_eq!(lines[11]["verdict"]["remaining"], 5);
}

#[test]
fn replay_text_summary_uses_policy_file() {
    turnstile()
        .args(["replay", "--scenario"])
        .arg(fixture("burst.yaml"))
        .arg("--config")
        .arg(fixture("tight_policy.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("too many violations, blocked for 1m"))
        .stdout(predicate::str::contains("12 steps: 5 allowed, 7 denied"));
}

#[test]
fn replay_fail_on_deny_sets_exit_code() {
    turnstile()
        .args(["replay", "--fail-on-deny", "--scenario"])
        .arg(fixture("burst.yaml"))
        .assert()
        .code(1);
}

#[test]
fn replay_missing_scenario_is_config_error() {
    turnstile()
        .args(["replay", "--scenario", "does/not/exist.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("scenario file not found"));
}

#[test]
fn replay_embedded_config_applies_without_flag() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("room.yaml");
    fs::write(
        &path,
        r#"
config:
  max_capacity: 2
steps:
  - { at: 0s, op: join, session: room, actor: a }
  - { at: 0s, op: join, session: room, actor: b }
  - { at: 0s, op: join, session: room, actor: c }
  - { at: 1s, op: clear, session: room }
  - { at: 1s, op: join, session: room, actor: c }
"#,
    )
    .unwrap();

    turnstile()
        .args(["replay", "--scenario"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("session has reached maximum capacity"))
        .stdout(predicate::str::contains("5 steps: 3 allowed, 1 denied"));
}
