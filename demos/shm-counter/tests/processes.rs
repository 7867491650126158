use std::process::{Command, Stdio};

use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use shm_value::ShmValue;

const COUNTER: &str = env!("CARGO_BIN_EXE_shm-counter");

fn counter() -> AssertCommand {
    AssertCommand::new(COUNTER)
}

#[test]
fn increments_from_many_processes() {
    const PROCESSES: u64 = 4;
    const ROUNDS: u64 = 5_000;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter");

    let children: Vec<_> = (0..PROCESSES)
        .map(|_| {
            Command::new(COUNTER)
                .arg("incr")
                .arg(&path)
                .arg("--count")
                .arg(ROUNDS.to_string())
                .stdout(Stdio::null())
                .spawn()
                .expect("to spawn the counter")
        })
        .collect();

    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    counter()
        .arg("get")
        .arg(&path)
        .assert()
        .success()
        .stdout(format!("{}\n", PROCESSES * ROUNDS));

    let value = ShmValue::<u64>::open(&path, 8, || 0).unwrap();
    assert_eq!(value.get().unwrap(), PROCESSES * ROUNDS);
}

#[test]
fn default_is_stored_by_the_first_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter");

    counter()
        .args(["--init", "5", "get"])
        .arg(&path)
        .assert()
        .success()
        .stdout("5\n");

    counter()
        .args(["--init", "9", "get"])
        .arg(&path)
        .assert()
        .success()
        .stdout("5\n");
}

#[test]
fn set_survives_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter");

    counter().arg("set").arg(&path).arg("17").assert().success();
    counter()
        .args(["incr", "-c", "3"])
        .arg(&path)
        .assert()
        .success()
        .stdout("20\n");
    counter().arg("get").arg(&path).assert().success().stdout("20\n");
}

#[test]
fn mismatched_size_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter");

    counter().arg("get").arg(&path).assert().success();
    counter()
        .args(["--max-size", "16", "get"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("LayoutMismatch"));
}

#[test]
fn relaxed_single_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter");

    counter()
        .args(["--relaxed", "--spin", "incr", "--count", "1000"])
        .arg(&path)
        .assert()
        .success()
        .stdout("1000\n");
}
