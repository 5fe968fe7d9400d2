//! Canonical `.testtree/` layout and its scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{TreeConfig, write_config};
use super::snapshot_store::{FrameworkSnapshot, write_snapshot};

pub(crate) const SNAPSHOT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/snapshot/v1.schema.json"
));

/// All canonical paths within `.testtree/` for a project root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub store_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub schema_path: PathBuf,
    pub config_path: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let store_dir = root.join(".testtree");
        Self {
            root,
            snapshot_path: store_dir.join("snapshot.json"),
            schema_path: store_dir.join("schema.json"),
            config_path: store_dir.join("testtree.toml"),
            store_dir,
        }
    }
}

/// Options for `init_store`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing files.
    pub force: bool,
    /// Framework id recorded in the empty snapshot.
    pub framework: String,
}

/// Create `.testtree/` scaffolding in `root`.
///
/// Fails if `.testtree/` already exists unless `options.force` is set.
pub fn init_store(root: &Path, options: &InitOptions) -> Result<StorePaths> {
    let paths = StorePaths::new(root);
    if paths.store_dir.exists() && !options.force {
        return Err(anyhow!(
            "testtree init: .testtree already exists (use --force to overwrite)"
        ));
    }
    if paths.store_dir.exists() && !paths.store_dir.is_dir() {
        return Err(anyhow!("testtree init: .testtree exists but is not a directory"));
    }

    fs::create_dir_all(&paths.store_dir)
        .with_context(|| format!("create directory {}", paths.store_dir.display()))?;
    fs::write(&paths.schema_path, SNAPSHOT_SCHEMA)
        .with_context(|| format!("write {}", paths.schema_path.display()))?;
    write_config(&paths.config_path, &TreeConfig::default())?;
    write_snapshot(&paths.snapshot_path, &FrameworkSnapshot::empty(&options.framework))?;

    Ok(paths)
}
