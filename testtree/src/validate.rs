//! Validation of the `.testtree/` layout, config and snapshot.

use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::io::config::load_config;
use crate::io::layout::StorePaths;
use crate::io::snapshot_store::{FrameworkSnapshot, load_snapshot};

/// Validate the store under `root`; returns the loaded snapshot.
pub fn validate_store(root: &Path) -> Result<FrameworkSnapshot> {
    let paths = StorePaths::new(root);

    ensure_dir(&paths.store_dir)?;
    ensure_file(&paths.schema_path)?;
    ensure_file(&paths.snapshot_path)?;

    load_config(&paths.config_path).context("load testtree.toml")?;
    load_snapshot(&paths.schema_path, &paths.snapshot_path).context("load snapshot.json")
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(anyhow!("missing directory {}", path.display()))
    }
}

fn ensure_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(anyhow!("missing file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::TestStore;

    #[test]
    fn fresh_store_is_valid() {
        let store = TestStore::new("jest");
        let snapshot = validate_store(store.root()).expect("valid");
        assert_eq!(snapshot.framework, "jest");
    }

    #[test]
    fn missing_store_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = validate_store(temp.path()).expect_err("missing");
        assert!(err.to_string().contains("missing directory"));
    }

    /// A persisted mid-run status fails the invariant check.
    #[test]
    fn in_flight_status_is_invalid() {
        let store = TestStore::new("jest");
        fs::write(
            &store.paths().snapshot_path,
            r#"{"framework":"jest","suites":[{"file":"a.test.js","result":{"id":"a.test.js","status":"running"}}]}"#,
        )
        .expect("write");
        let err = validate_store(store.root()).expect_err("invalid");
        assert!(format!("{err:#}").contains("must not be running"));
    }
}
