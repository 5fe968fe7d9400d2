//! Tree configuration stored in `.testtree/testtree.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::status::{Precedence, Status};

/// Tree configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TreeConfig {
    /// Status precedence for aggregation, highest first. Empty keeps the built-in order.
    pub precedence: Vec<Status>,

    /// Keep last statuses in persisted snapshots instead of forcing `idle`.
    pub persist_statuses: bool,

    /// Number of runs kept in each framework's ledger.
    pub ledger_limit: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            precedence: Vec::new(),
            persist_statuses: false,
            ledger_limit: 50,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ledger_limit == 0 {
            return Err(anyhow!("ledger_limit must be > 0"));
        }
        self.precedence()?;
        Ok(())
    }

    pub fn precedence(&self) -> Result<Precedence> {
        if self.precedence.is_empty() {
            return Ok(Precedence::default());
        }
        Precedence::new(self.precedence.clone()).context("precedence")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TreeConfig::default()`.
pub fn load_config(path: &Path) -> Result<TreeConfig> {
    if !path.exists() {
        let cfg = TreeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TreeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TreeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
