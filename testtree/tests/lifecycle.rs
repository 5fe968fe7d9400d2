//! Multi-run lifecycle tests for a single framework.
//!
//! Drives a framework through full and selective runs, a runner fault and a
//! save/lazy-reopen cycle, checking statuses, partial flags and the ledger.

use chrono::{DateTime, Utc};
use testtree::core::status::{Precedence, Status};
use testtree::core::types::ResultFragment;
use testtree::framework::Framework;
use testtree::store::{open_framework, save_framework};
use testtree::test_support::{RecordingObserver, TestStore, at, test_fragment};

const SUITE: &str = "math.test.js";

fn result(tests: Vec<ResultFragment>) -> ResultFragment {
    ResultFragment::named(SUITE, SUITE).with_tests(tests)
}

fn full_run(framework: &mut Framework, tests: Vec<ResultFragment>, start: DateTime<Utc>) {
    let plan = framework.start_run(false, start);
    assert_eq!(plan.suites, vec![SUITE.to_string()]);
    framework.suite_started(SUITE).expect("suite started");
    framework
        .debrief_at(SUITE, result(tests), start)
        .expect("debrief");
    framework.finish_run(start).expect("run record");
}

/// Lifecycle across runs:
///
/// 1. full run: `adds` passes, `divides` fails
/// 2. selective run of `adds` only: `divides` keeps its failure, suite partial
/// 3. full run without `divides`: it is removed, partial clears
/// 4. runner crash mid-run: in-flight nodes become `error`
#[test]
fn framework_lifecycle_across_runs() {
    let mut framework = Framework::new("jest", "Jest", Precedence::default(), 10);
    framework.add_suite(SUITE).expect("add suite");
    let observer = RecordingObserver::default();
    framework.tree_mut().subscribe(observer.clone());

    full_run(
        &mut framework,
        vec![
            test_fragment("adds", Status::Passed),
            test_fragment("divides", Status::Failed),
        ],
        at(0),
    );
    assert_eq!(framework.status(), Status::Failed);

    framework
        .tree_mut()
        .toggle_selected("adds", Some(true), false)
        .expect("select");
    let plan = framework.start_run(true, at(10));
    assert_eq!(plan.tests, vec!["adds".to_string()]);
    assert_eq!(
        framework.tree().get("divides").unwrap().status,
        Status::Failed
    );
    framework
        .debrief_at(SUITE, result(vec![test_fragment("adds", Status::Passed)]), at(11))
        .expect("selective debrief");
    framework.finish_run(at(12));
    assert!(framework.tree().get(SUITE).unwrap().partial);
    assert_eq!(framework.status(), Status::Failed);

    full_run(
        &mut framework,
        vec![test_fragment("adds", Status::Passed)],
        at(20),
    );
    assert!(!framework.tree().contains("divides"));
    assert!(observer.removed().contains(&"divides".to_string()));
    assert!(!framework.tree().get(SUITE).unwrap().partial);
    assert_eq!(framework.status(), Status::Passed);

    framework.start_run(false, at(30));
    framework.suite_started(SUITE).expect("suite started");
    let record = framework.stop(true, at(31)).expect("record");
    assert_eq!(record.status, Status::Error);
    assert_eq!(framework.tree().get("adds").unwrap().status, Status::Error);

    let statuses = framework
        .ledger()
        .records()
        .map(|record| record.status)
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![Status::Failed, Status::Failed, Status::Passed, Status::Error]
    );
}

/// A saved framework reopens lazily; expanding a suite loads its children.
#[test]
fn lazy_reopen_loads_children_on_expand() {
    let store = TestStore::new("jest");
    let mut framework = open_framework(store.paths(), false).expect("open");
    framework.add_suite(SUITE).expect("add suite");
    full_run(
        &mut framework,
        vec![
            test_fragment("adds", Status::Passed),
            test_fragment("divides", Status::Failed),
        ],
        at(0),
    );
    save_framework(store.paths(), &framework).expect("save");

    let mut reopened = open_framework(store.paths(), true).expect("reopen");
    let (tx, rx) = std::sync::mpsc::channel();
    reopened.tree_mut().set_loader(tx);
    assert!(!reopened.tree().contains("adds"));
    assert!(reopened.tree().has_children(SUITE).unwrap());

    reopened
        .tree_mut()
        .toggle_expanded(SUITE, Some(true), false)
        .expect("expand");
    let requested = rx.try_recv().expect("load request");
    assert_eq!(requested, SUITE);

    let snapshot = testtree::io::snapshot_store::load_snapshot(
        &store.paths().schema_path,
        &store.paths().snapshot_path,
    )
    .expect("snapshot");
    let children = snapshot
        .find(&requested)
        .and_then(|suite| suite.tests.clone())
        .expect("children");
    reopened
        .tree_mut()
        .resolve_children(&requested, children)
        .expect("resolve");

    assert_eq!(reopened.tree().count_children(SUITE).unwrap(), 2);
    assert!(!reopened.tree().is_loading(SUITE));
    assert_eq!(reopened.ledger().len(), 1);
}
