//! CLI tests for `testtree merge` and `testtree summary`.
//!
//! Spawns the testtree binary and verifies exit codes for passing, failing
//! and invalid stores.

use std::fs;
use std::process::Command;

use testtree::exit_codes;
use testtree::io::config::{TreeConfig, write_config};
use testtree::test_support::TestStore;

fn testtree(store: &TestStore, args: &[&str]) -> Option<i32> {
    Command::new(env!("CARGO_BIN_EXE_testtree"))
        .current_dir(store.root())
        .args(args)
        .status()
        .expect("run testtree")
        .code()
}

fn keep_statuses(store: &TestStore) {
    write_config(
        &store.paths().config_path,
        &TreeConfig {
            persist_statuses: true,
            ..TreeConfig::default()
        },
    )
    .expect("write config");
}

#[test]
fn summary_of_fresh_store_is_ok() {
    let store = TestStore::new("jest");
    assert_eq!(testtree(&store, &["summary"]), Some(exit_codes::OK));
}

#[test]
fn summary_after_failing_merge_exits_with_failed_code() {
    let store = TestStore::new("jest");
    keep_statuses(&store);
    fs::write(
        store.root().join("result.json"),
        r#"{"id":"math.test.js","tests":[{"id":"adds","status":"passed"},{"id":"divides","status":"failed"}]}"#,
    )
    .expect("write result");

    assert_eq!(
        testtree(&store, &["merge", "math.test.js", "result.json", "--cleanup"]),
        Some(exit_codes::OK)
    );
    assert_eq!(testtree(&store, &["validate"]), Some(exit_codes::OK));
    assert_eq!(testtree(&store, &["summary"]), Some(exit_codes::FAILED));
}

#[test]
fn summary_after_passing_merge_is_ok() {
    let store = TestStore::new("jest");
    keep_statuses(&store);
    fs::write(
        store.root().join("result.json"),
        r#"{"id":"math.test.js","tests":[{"id":"adds","status":"passed"}]}"#,
    )
    .expect("write result");

    testtree(&store, &["merge", "math.test.js", "result.json", "--cleanup"]);
    assert_eq!(testtree(&store, &["summary"]), Some(exit_codes::OK));
}

#[test]
fn corrupt_snapshot_is_invalid() {
    let store = TestStore::new("jest");
    fs::write(&store.paths().snapshot_path, "{not json").expect("corrupt");
    assert_eq!(testtree(&store, &["validate"]), Some(exit_codes::INVALID));
    assert_eq!(testtree(&store, &["summary"]), Some(exit_codes::INVALID));
}
