//! Test-only helpers for building trees, fragments and on-disk stores.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::events::{TreeEvent, TreeObserver};
use crate::core::nugget::Nugget;
use crate::core::status::Status;
use crate::core::tree::Tree;
use crate::core::types::{NodeId, ResultFragment};
use crate::io::layout::{InitOptions, StorePaths, init_store};

/// Observer that keeps every event it sees; clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<TreeEvent>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<TreeEvent> {
        self.events.lock().expect("observer lock").clone()
    }

    /// Ids of `Removed` events, in emission order.
    pub fn removed(&self) -> Vec<NodeId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TreeEvent::Removed { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().expect("observer lock").clear();
    }
}

impl TreeObserver for RecordingObserver {
    fn notify(&self, event: &TreeEvent) {
        self.events.lock().expect("observer lock").push(event.clone());
    }
}

/// Deterministic clock: `minutes` after a fixed base instant.
pub fn at(minutes: i64) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2026, 1, 1, 9, 0, 0)
        .single()
        .expect("valid base instant");
    base + Duration::minutes(minutes)
}

/// Tree holding a single, never-run suite.
pub fn suite_tree(id: &str) -> Tree {
    let mut tree = Tree::default();
    tree.insert_suite(Nugget::suite(id, "fw", format!("{id}.test.js").into()))
        .expect("insert suite");
    tree
}

/// Suite `id` after one full run reporting `tests`.
pub fn suite_with_tests(id: &str, tests: Vec<ResultFragment>) -> Tree {
    let mut tree = suite_tree(id);
    tree.build_at(id, &ResultFragment::named(id, id).with_tests(tests), true, at(0))
        .expect("build suite");
    tree
}

/// Leaf result whose id and name are both `id`.
pub fn test_fragment(id: &str, status: Status) -> ResultFragment {
    ResultFragment::named(id, id).with_status(status)
}

/// Temporary project directory with an initialized `.testtree/` store.
pub struct TestStore {
    dir: TempDir,
    paths: StorePaths,
}

impl TestStore {
    pub fn new(framework: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = init_store(
            dir.path(),
            &InitOptions {
                force: false,
                framework: framework.to_string(),
            },
        )
        .expect("init store");
        Self { dir, paths }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }
}
