//! Wire types exchanged with the runner and UI collaborators.
//!
//! Every optional field distinguishes "absent" from "present but empty":
//! `tests: None` means the runner did not report children at all, while
//! `tests: Some(vec![])` reports that there are none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::status::Status;

/// Node ids are assigned by the runner/discovery side and stable across runs.
pub type NodeId = String;

/// Timing data carried by a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// When the node was first seen. Set once, never moved afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<DateTime<Utc>>,
    /// When the node last received a result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One (possibly partial) result reported by the runner for a suite or test.
///
/// `tests` nests recursively, mirroring the suite/test tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Failure message or diff, opaque to the tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<ResultFragment>>,
}

impl ResultFragment {
    /// A fragment with just an id and a name.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_tests(mut self, tests: Vec<ResultFragment>) -> Self {
        self.tests = Some(tests);
        self
    }

    /// Stamp `stats.last` on this fragment and every nested one.
    pub fn stamp_last_run(&mut self, now: DateTime<Utc>) {
        self.stats.get_or_insert_with(Stats::default).last = Some(now);
        if let Some(tests) = self.tests.as_mut() {
            for test in tests {
                test.stamp_last_run(now);
            }
        }
    }
}

/// Bounded per-node payload forwarded to the UI.
///
/// Never carries descendants; children are fetched separately on expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPayload {
    pub id: NodeId,
    pub name: String,
    pub display_name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    pub has_children: bool,
    pub selected: bool,
    pub expanded: bool,
    pub partial: bool,
}

/// Derived selection state; only the boolean is stored on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    None,
    Partial,
    Full,
}
