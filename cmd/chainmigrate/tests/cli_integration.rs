use std::process::{Command, Output};

use chainmigrate_migration::StateStore;

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chainmigrate"))
        .args(args)
        .env_remove("CHAINMIGRATE_SIGNER_SEED")
        .env_remove("CHAINMIGRATE_WS_ENDPOINT")
        .output()
        .expect("failed to execute chainmigrate binary")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8(output.stdout.clone())
        .expect("stdout should be utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each stdout line should be JSON"))
        .collect()
}

#[test]
fn help_lists_the_subcommands() {
    let output = run(&["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    for subcommand in ["export", "import", "burn", "status"] {
        assert!(stdout.contains(subcommand), "missing {subcommand} in help");
    }
    assert!(stdout.contains("--log.level"));
}

#[test]
fn import_requires_a_signer() {
    let output = run(&["import", "1"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf-8");
    assert!(stderr.contains("--signer-seed"));
}

#[test]
fn rejects_out_of_range_batch_sizes() {
    let output = run(&["import", "1", "--signer-seed", "//Alice", "--batch-size", "0"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf-8");
    assert!(stderr.contains("--batch-size"));
}

#[test]
fn status_reports_without_a_node() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let mut store = StateStore::load(dir.path(), 5).expect("load state");
    store
        .update(
            |state| {
                state.collection_id = Some(9);
                state.created = true;
                state.created_tokens = vec![1, 2, 3];
            },
            true,
        )
        .expect("persist state");

    let output = run(&[
        "status",
        "5",
        "6",
        "--output-dir",
        dir.path().to_str().expect("utf-8 path"),
        "--json",
    ]);
    assert!(output.status.success());

    let reports = json_lines(&output);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["schema_version"], 1);
    assert_eq!(reports[0]["collection_id"], 5);
    assert_eq!(reports[0]["status"], "in_progress");
    assert_eq!(reports[0]["summary"]["collection_id"], 9);
    assert_eq!(reports[0]["summary"]["created_tokens"], serde_json::json!([1, 2, 3]));
    assert_eq!(reports[1]["status"], "not_started");
}

#[test]
fn import_skips_collections_without_export_files() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = dir.path().to_str().expect("utf-8 path");

    let output = run(&[
        "import",
        "3",
        "--signer-seed",
        "//Alice",
        "--ws-endpoint",
        "ws://127.0.0.1:9",
        "--input-dir",
        path,
        "--output-dir",
        path,
        "--silent",
        "--json",
    ]);
    assert!(output.status.success());

    let reports = json_lines(&output);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["command"], "import");
    assert_eq!(reports[0]["status"], "skipped");
}

#[test]
fn unreachable_node_fails_the_run() {
    let dir = tempfile::tempdir().expect("tmpdir");

    let output = run(&[
        "export",
        "1",
        "--ws-endpoint",
        "ws://127.0.0.1:9",
        "--output-dir",
        dir.path().to_str().expect("utf-8 path"),
        "--json",
    ]);
    assert!(!output.status.success());

    let reports = json_lines(&output);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["status"], "failed");
    assert!(reports[0]["error"].as_str().is_some());
}
