//! Loading and saving a [`Framework`] through the `.testtree/` store.

use anyhow::{Context, Result};
use tracing::debug;

use crate::framework::Framework;
use crate::io::config::load_config;
use crate::io::layout::StorePaths;
use crate::io::snapshot_store::{load_snapshot, write_snapshot};

/// Build the framework described by the store: config first, then the snapshot.
pub fn open_framework(paths: &StorePaths, lazy: bool) -> Result<Framework> {
    let cfg = load_config(&paths.config_path).context("load testtree.toml")?;
    let snapshot =
        load_snapshot(&paths.schema_path, &paths.snapshot_path).context("load snapshot.json")?;
    let name = snapshot
        .name
        .clone()
        .unwrap_or_else(|| snapshot.framework.clone());
    let mut framework = Framework::from_config(snapshot.framework.clone(), name, &cfg)?;
    framework
        .restore(&snapshot, lazy)
        .with_context(|| format!("restore framework '{}'", snapshot.framework))?;
    debug!(framework = %framework.id(), lazy, "framework opened");
    Ok(framework)
}

/// Persist the framework back to `snapshot.json`.
pub fn save_framework(paths: &StorePaths, framework: &Framework) -> Result<()> {
    let snapshot = framework
        .snapshot()
        .with_context(|| format!("snapshot framework '{}'", framework.id()))?;
    write_snapshot(&paths.snapshot_path, &snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;
    use crate::core::types::ResultFragment;
    use crate::io::config::{TreeConfig, write_config};
    use crate::test_support::{TestStore, test_fragment};

    #[test]
    fn open_empty_store() {
        let store = TestStore::new("jest");
        let framework = open_framework(store.paths(), false).expect("open");
        assert_eq!(framework.id(), "jest");
        assert_eq!(framework.name(), "jest");
        assert!(framework.tree().is_empty());
    }

    /// Statuses survive a save only when the config asks for it.
    #[test]
    fn save_then_open_honors_persist_statuses() {
        let store = TestStore::new("jest");
        write_config(
            &store.paths().config_path,
            &TreeConfig {
                persist_statuses: true,
                ..TreeConfig::default()
            },
        )
        .expect("config");

        let mut framework = open_framework(store.paths(), false).expect("open");
        let id = framework.add_suite("math.test.js").expect("add");
        framework
            .debrief(
                &id,
                ResultFragment::named(id.clone(), "math.test.js")
                    .with_tests(vec![test_fragment("a", Status::Failed)]),
            )
            .expect("debrief");
        save_framework(store.paths(), &framework).expect("save");

        let reopened = open_framework(store.paths(), false).expect("reopen");
        assert_eq!(reopened.tree().get("a").unwrap().status, Status::Failed);
        assert_eq!(reopened.status(), Status::Failed);
    }
}
