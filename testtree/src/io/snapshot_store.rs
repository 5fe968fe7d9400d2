//! Snapshot load/save with schema + invariant validation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::core::types::ResultFragment;
use crate::framework::RunRecord;

/// Persisted state of one framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkSnapshot {
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub suites: Vec<SuiteSnapshot>,
    #[serde(default)]
    pub ledger: Vec<RunRecord>,
}

/// One suite: the file it stands for and its merged results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSnapshot {
    pub file: PathBuf,
    pub result: ResultFragment,
}

impl FrameworkSnapshot {
    pub fn empty(framework: &str) -> Self {
        Self {
            framework: framework.to_string(),
            name: None,
            suites: Vec::new(),
            ledger: Vec::new(),
        }
    }

    /// Persisted result with id `id`, searched depth-first across suites.
    pub fn find(&self, id: &str) -> Option<&ResultFragment> {
        self.suites
            .iter()
            .find_map(|suite| find_result(&suite.result, id))
    }
}

fn find_result<'a>(result: &'a ResultFragment, id: &str) -> Option<&'a ResultFragment> {
    if result.id.as_deref() == Some(id) {
        return Some(result);
    }
    result
        .tests
        .iter()
        .flatten()
        .find_map(|child| find_result(child, id))
}

/// Load and validate a snapshot from disk (schema + invariants).
pub fn load_snapshot(schema_path: &Path, snapshot_path: &Path) -> Result<FrameworkSnapshot> {
    debug!(path = %snapshot_path.display(), "loading snapshot");
    let contents = fs::read_to_string(snapshot_path)
        .with_context(|| format!("read snapshot {}", snapshot_path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse snapshot {}", snapshot_path.display()))?;
    validate_schema(schema_path, &value)?;
    let snapshot: FrameworkSnapshot = serde_json::from_value(value)
        .with_context(|| format!("deserialize snapshot {}", snapshot_path.display()))?;
    validate_snapshot_invariants(&snapshot)?;
    debug!(suites = snapshot.suites.len(), "snapshot loaded");
    Ok(snapshot)
}

/// Atomically write a snapshot as pretty JSON.
pub fn write_snapshot(snapshot_path: &Path, snapshot: &FrameworkSnapshot) -> Result<()> {
    debug!(path = %snapshot_path.display(), suites = snapshot.suites.len(), "writing snapshot");
    let mut buf = serde_json::to_string_pretty(snapshot)?;
    buf.push('\n');
    super::write_atomic(snapshot_path, &buf)
}

fn validate_schema(schema_path: &Path, snapshot: &Value) -> Result<()> {
    let schema_contents = fs::read_to_string(schema_path)
        .with_context(|| format!("read schema {}", schema_path.display()))?;
    let schema_value: Value = serde_json::from_str(&schema_contents)
        .with_context(|| format!("parse schema {}", schema_path.display()))?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(snapshot) {
        let messages = compiled
            .iter_errors(snapshot)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "snapshot schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_snapshot_invariants(snapshot: &FrameworkSnapshot) -> Result<()> {
    let results = snapshot
        .suites
        .iter()
        .map(|suite| suite.result.clone())
        .collect::<Vec<_>>();
    let errors = validate_invariants(&results);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("snapshot invariants failed: {}", errors.join("; ")))
}
