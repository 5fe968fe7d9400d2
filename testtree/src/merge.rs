//! `testtree merge`: debrief a result file offline and rewrite the snapshot.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::core::debrief::DebriefSummary;
use crate::io::layout::StorePaths;
use crate::store::{open_framework, save_framework};

/// Merge the fragment stored at `fragment_path` into the suite for `suite_file`.
///
/// The suite is registered first when the snapshot does not know it yet.
pub fn merge_fragment(
    root: &Path,
    suite_file: &Path,
    fragment_path: &Path,
    cleanup: bool,
) -> Result<DebriefSummary> {
    let paths = StorePaths::new(root);
    let mut framework = open_framework(&paths, false)?;

    let contents = fs::read_to_string(fragment_path)
        .with_context(|| format!("read {}", fragment_path.display()))?;
    let payload: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", fragment_path.display()))?;

    let suite_id = suite_file.to_string_lossy().into_owned();
    if !framework.tree().contains(&suite_id) {
        framework.add_suite(suite_file)?;
    }
    let summary = framework
        .tree_mut()
        .debrief_json(&suite_id, payload, cleanup)?;
    save_framework(&paths, &framework)?;
    info!(suite = %suite_id, status = %summary.status, "merged");
    Ok(summary)
}
