use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn warden(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_warden"))
        .current_dir(root)
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("failed to execute warden")
}

fn warden_json(root: &Path, args: &[&str]) -> Value {
    let mut full = vec!["--format", "json"];
    full.extend_from_slice(args);
    let output = warden(root, &full);
    assert!(
        output.status.success(),
        "warden {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn init_writes_config_and_store() {
    let tmp = tempdir().unwrap();
    let out = warden_json(tmp.path(), &["init"]);
    assert_eq!(out["cmd"], "init");
    assert_eq!(out["status"], "ok");
    assert_eq!(out["config_written"], true);
    assert!(tmp.path().join(".warden/warden.toml").is_file());
    assert!(tmp.path().join(".warden/data/records.db").is_file());

    let again = warden_json(tmp.path(), &["init"]);
    assert_eq!(again["config_written"], false);
}

#[test]
fn record_lifecycle_over_the_cli() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    warden_json(root, &["init"]);

    let created = warden_json(
        root,
        &[
            "--user",
            "7",
            "record",
            "create",
            r#"{"id": "CLI-Rec", "metadata": {"title": "T"}}"#,
            "--project",
            "alpha",
        ],
    );
    assert_eq!(created["cmd"], "record.create");
    let record = &created["record"];
    assert_eq!(record["pid"], "cli-rec");
    assert_eq!(record["access"]["owned_by"][0]["project"], "alpha");
    assert_eq!(record["links"]["self"], format!("/api/records/{}", record["id"].as_str().unwrap()));

    let read = warden_json(root, &["--user", "7", "record", "read", "cli-rec"]);
    assert_eq!(read["record"]["id"], record["id"]);

    let added = warden_json(
        root,
        &[
            "--user", "1", "--as-role", "admin", "access", "add", "cli-rec", "user:5", "--role",
            "contributor",
        ],
    );
    assert_eq!(added["record"]["access"]["contributed_by"][1]["user"], 5);

    let found = warden_json(
        root,
        &["--user", "5", "record", "search", "--role", "contributor"],
    );
    assert_eq!(found["hits"]["total"], 1);

    let finished = warden_json(root, &["--user", "7", "record", "finish", "cli-rec"]);
    assert_eq!(finished["record"]["is_finished"], true);

    warden_json(root, &["--user", "7", "record", "delete", "cli-rec"]);
    let after = warden(root, &["--user", "7", "record", "read", "cli-rec"]);
    assert!(!after.status.success());

    let audit = warden_json(root, &["audit", "--tail", "3"]);
    assert_eq!(audit["events"].as_array().unwrap().len(), 3);
}

#[test]
fn failures_exit_nonzero_with_a_reason() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    warden_json(root, &["init"]);

    let denied = warden(root, &["record", "create", r#"{"metadata": {}}"#]);
    assert!(!denied.status.success());
    assert!(String::from_utf8_lossy(&denied.stderr).contains("Permission denied"));

    let invalid = warden(root, &["--user", "1", "record", "create", r#"{"id": "x"}"#]);
    assert!(!invalid.status.success());
    assert!(String::from_utf8_lossy(&invalid.stderr).contains("metadata"));

    let bad_page = warden(root, &["--user", "1", "record", "search", "--page", "0"]);
    assert!(!bad_page.status.success());
    assert!(String::from_utf8_lossy(&bad_page.stderr).contains("Invalid querystring"));
}

#[test]
fn commands_outside_a_project_ask_for_init() {
    let tmp = tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_warden"))
        .current_dir(tmp.path())
        .args(["--user", "1", "record", "search"])
        .output()
        .expect("failed to execute warden");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("warden init"));
}

#[test]
fn components_and_plugins_listing() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    warden_json(root, &["init"]);

    let components = warden_json(root, &["components"]);
    assert_eq!(components["components"][0], "metadata");
    assert_eq!(components["components"].as_array().unwrap().len(), 7);

    let plugins = warden_json(root, &["plugins", "list"]);
    assert_eq!(plugins["plugins"], serde_json::json!([]));
}
