use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("fastrollout_cli_{}", rand::random::<u32>()))
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("fastrollout").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("batched rollout generation"));
}

#[test]
fn test_cli_synth_then_inspect() {
    let dir = scratch_dir();

    let mut cmd = Command::cargo_bin("fastrollout").unwrap();
    cmd.arg("synth")
        .arg(&dir)
        .args(["--scenes", "3", "--episodes", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 3 scenes"));

    let mut cmd = Command::cargo_bin("fastrollout").unwrap();
    cmd.arg("inspect")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("scenes:   3"))
        .stdout(predicate::str::contains("episodes: 15"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_cli_bench_short_run() {
    let dir = scratch_dir();

    Command::cargo_bin("fastrollout")
        .unwrap()
        .arg("synth")
        .arg(&dir)
        .args(["--scenes", "2", "--episodes", "4"])
        .assert()
        .success();

    Command::cargo_bin("fastrollout")
        .unwrap()
        .arg("bench")
        .arg(&dir)
        .args([
            "--envs",
            "4",
            "--active-scenes",
            "2",
            "--workers",
            "2",
            "--steps",
            "50",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("steps/sec"));

    std::fs::remove_dir_all(&dir).unwrap();
}
