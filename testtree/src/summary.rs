//! `testtree summary`: status overview of the stored framework.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::core::status::Status;
use crate::core::types::NodeId;
use crate::io::layout::StorePaths;
use crate::store::open_framework;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteLine {
    pub id: NodeId,
    pub status: Status,
    pub tests: usize,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub framework: String,
    pub status: Status,
    pub suites: Vec<SuiteLine>,
    /// Test count per status, suites excluded.
    pub counts: BTreeMap<Status, usize>,
    pub new_tests: Vec<NodeId>,
    pub runs: usize,
}

impl Summary {
    pub fn is_failing(&self) -> bool {
        self.status.is_failing()
    }
}

/// Summarize the snapshot under `root`, fully materialized.
pub fn summarize(root: &Path) -> Result<Summary> {
    let paths = StorePaths::new(root);
    let framework = open_framework(&paths, false)?;
    let tree = framework.tree();

    let mut suites = Vec::new();
    let mut counts = BTreeMap::new();
    for suite_id in tree.roots() {
        let suite = tree.get(suite_id)?;
        let subtree = tree.subtree(suite_id);
        for id in subtree.iter().skip(1) {
            *counts.entry(tree.get(id)?.status).or_insert(0) += 1;
        }
        suites.push(SuiteLine {
            id: suite.id.clone(),
            status: suite.status,
            tests: subtree.len() - 1,
            partial: suite.partial,
        });
    }

    Ok(Summary {
        framework: framework.id().to_string(),
        status: framework.status(),
        suites,
        counts,
        new_tests: framework.new_tests(),
        runs: framework.ledger().len(),
    })
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} ({} runs)", self.framework, self.status, self.runs)?;
        for suite in &self.suites {
            let partial = if suite.partial { " partial" } else { "" };
            writeln!(
                f,
                "  {} {} [{} tests]{}",
                suite.status, suite.id, suite.tests, partial
            )?;
        }
        if !self.counts.is_empty() {
            let counts = self
                .counts
                .iter()
                .map(|(status, count)| format!("{status}={count}"))
                .collect::<Vec<_>>();
            writeln!(f, "tests: {}", counts.join(" "))?;
        }
        if !self.new_tests.is_empty() {
            writeln!(f, "new: {}", self.new_tests.join(", "))?;
        }
        Ok(())
    }
}
