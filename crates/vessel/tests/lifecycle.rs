//! End-to-end lifecycle scenarios driven through the built binary.
//!
//! Each test gets its own root directory and bundle, so tests are free to
//! run in parallel. The workloads are plain host binaries (`sleep`, `sh`);
//! the sandbox model is what is under test, not syscall isolation.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use libvessel::sandbox::Sandbox;
use oci_spec::runtime::{ProcessBuilder, SpecBuilder};
use serde_json::Value;
use tempfile::TempDir;

fn vessel(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vessel"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("failed to invoke vessel binary")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed with {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write_bundle(args: &[&str]) -> TempDir {
    let bundle = tempfile::tempdir().expect("failed to create bundle dir");
    let spec = SpecBuilder::default()
        .process(
            ProcessBuilder::default()
                .args(args.iter().map(|a| a.to_string()).collect::<Vec<_>>())
                .cwd("/")
                .build()
                .expect("failed to build process"),
        )
        .build()
        .expect("failed to build spec");
    spec.save(bundle.path().join("config.json"))
        .expect("failed to write config.json");
    bundle
}

fn state_doc(root: &Path, id: &str) -> Option<Value> {
    let output = vessel(root, &["state", id]);
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn status_of(root: &Path, id: &str) -> Option<String> {
    state_doc(root, id)?
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn wait_for_status(root: &Path, id: &str, want: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if status_of(root, id).as_deref() == Some(want) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn delete(root: &Path, id: &str) {
    assert_success(&vessel(root, &["delete", id]));
}

#[test]
fn test_create_lists_and_reports_created() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c1"],
    ));

    let output = vessel(root.path(), &["list", "--quiet"]);
    assert_success(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "c1");

    let state = state_doc(root.path(), "c1").expect("state should succeed");
    assert_eq!(state["status"], "created");
    assert_eq!(state["id"], "c1");
    assert!(state["pid"].as_i64().unwrap() > 0);

    delete(root.path(), "c1");
    let output = vessel(root.path(), &["list", "--quiet"]);
    assert_success(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "");
}

#[test]
fn test_start_reports_running_with_pid() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c2"],
    ));
    assert_success(&vessel(root.path(), &["start", "c2"]));

    let state = state_doc(root.path(), "c2").expect("state should succeed");
    assert_eq!(state["status"], "running");
    assert!(state["pid"].as_i64().unwrap() > 0);

    delete(root.path(), "c2");
}

#[test]
fn test_run_propagates_exit_code() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sh", "-c", "exit 7"]);

    let output = vessel(
        root.path(),
        &["run", "--bundle", bundle.path().to_str().unwrap(), "c7"],
    );
    assert_eq!(
        output.status.code(),
        Some(7),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_invalid_id_is_rejected_without_state() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/true"]);

    let output = vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "bad id!"],
    );
    assert_eq!(output.status.code(), Some(128));

    let output = vessel(root.path(), &["list", "--quiet"]);
    assert_success(&output);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "");
}

#[test]
fn test_delete_removes_the_record() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c3"],
    ));
    delete(root.path(), "c3");

    let output = vessel(root.path(), &["state", "c3"]);
    assert_eq!(output.status.code(), Some(128));
}

#[test]
fn test_dead_sandbox_reconciles_to_stopped() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c4"],
    ));
    assert_success(&vessel(root.path(), &["start", "c4"]));

    let state = state_doc(root.path(), "c4").expect("state should succeed");
    assert_eq!(state["status"], "running");
    let pid = state["pid"].as_i64().unwrap() as i32;

    // kill the sandbox out from under the runtime
    let sandbox = Sandbox {
        id: "c4".to_string(),
        pid,
        control_socket: PathBuf::new(),
    };
    sandbox.destroy().expect("failed to kill sandbox");

    assert!(wait_for_status(root.path(), "c4", "stopped"));
    let state = state_doc(root.path(), "c4").expect("state should succeed");
    assert_eq!(state["pid"].as_i64().unwrap(), -1);

    delete(root.path(), "c4");
}

#[test]
fn test_kill_forwards_signal_to_workload() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c5"],
    ));
    assert_success(&vessel(root.path(), &["start", "c5"]));
    assert_success(&vessel(root.path(), &["kill", "c5", "TERM"]));

    // workload death takes the sandbox with it, which reads as stopped
    assert!(wait_for_status(root.path(), "c5", "stopped"));

    delete(root.path(), "c5");
}

#[test]
fn test_kill_on_stopped_container_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sh", "-c", "exit 0"]);

    let output = vessel(
        root.path(),
        &["run", "--bundle", bundle.path().to_str().unwrap(), "c6"],
    );
    assert_eq!(output.status.code(), Some(0));

    assert!(wait_for_status(root.path(), "c6", "stopped"));
    assert_success(&vessel(root.path(), &["kill", "c6", "KILL"]));
}

#[test]
fn test_pid_file_matches_sandbox_pid() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);
    let pid_file = root.path().join("c8.pid");

    assert_success(&vessel(
        root.path(),
        &[
            "create",
            "--bundle",
            bundle.path().to_str().unwrap(),
            "--pid-file",
            pid_file.to_str().unwrap(),
            "c8",
        ],
    ));

    let written = std::fs::read_to_string(&pid_file).expect("pid file should exist");
    let state = state_doc(root.path(), "c8").expect("state should succeed");
    assert_eq!(
        written.trim().parse::<i64>().unwrap(),
        state["pid"].as_i64().unwrap()
    );

    delete(root.path(), "c8");
}

#[test]
fn test_exec_runs_inside_running_container() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c9"],
    ));
    assert_success(&vessel(root.path(), &["start", "c9"]));

    let output = vessel(
        root.path(),
        &["exec", "c9", "--", "/bin/sh", "-c", "exit 3"],
    );
    assert_eq!(
        output.status.code(),
        Some(3),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    delete(root.path(), "c9");
}

#[test]
fn test_events_stats_snapshot() {
    let root = tempfile::tempdir().unwrap();
    let bundle = write_bundle(&["/bin/sleep", "30"]);

    assert_success(&vessel(
        root.path(),
        &["create", "--bundle", bundle.path().to_str().unwrap(), "c10"],
    ));
    assert_success(&vessel(root.path(), &["start", "c10"]));

    let output = vessel(root.path(), &["events", "--stats", "c10"]);
    assert_success(&output);
    let event: Value = serde_json::from_slice(&output.stdout).expect("events emits json");
    assert_eq!(event["type"], "stats");
    assert_eq!(event["id"], "c10");
    assert!(event["data"]["pids"].as_u64().unwrap() >= 1);

    delete(root.path(), "c10");
}
