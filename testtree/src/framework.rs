//! Per-framework coordination context.
//!
//! A [`Framework`] owns its suites (through a [`Tree`]), the ledger of past
//! runs and the filters the UI applies. Every mutation of one framework goes
//! through its single owner; different frameworks share nothing.

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::debrief::DebriefSummary;
use crate::core::error::TreeError;
use crate::core::nugget::{Nugget, NuggetKind};
use crate::core::status::{Precedence, Status};
use crate::core::tree::Tree;
use crate::core::types::{NodeId, RenderPayload, ResultFragment};
use crate::io::config::TreeConfig;
use crate::io::snapshot_store::{FrameworkSnapshot, SuiteSnapshot};

/// One finished (or stopped) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Status,
    pub selective: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Bounded history of runs, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLedger {
    limit: usize,
    records: VecDeque<RunRecord>,
}

impl RunLedger {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            records: VecDeque::new(),
        }
    }

    pub fn push(&mut self, record: RunRecord) {
        self.records.push_back(record);
        while self.records.len() > self.limit {
            self.records.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&RunRecord> {
        self.records.back()
    }

    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Display filters; an empty set shows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub statuses: BTreeSet<Status>,
    #[serde(default)]
    pub query: Option<String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty() && self.query.as_deref().is_none_or(str::is_empty)
    }

    pub fn matches(&self, node: &Nugget) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&node.status);
        let query_ok = match self.query.as_deref() {
            None | Some("") => true,
            Some(query) => node.label().to_lowercase().contains(&query.to_lowercase()),
        };
        status_ok && query_ok
    }
}

/// What a run about to start should execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    pub selective: bool,
    pub suites: Vec<NodeId>,
    /// Leaf tests for a selective run; empty for a full run.
    pub tests: Vec<NodeId>,
    /// Nodes that went `queued`.
    pub queued: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct ActiveRun {
    started_at: DateTime<Utc>,
    selective: bool,
    /// Nodes queued at start; closing the run settles exactly these.
    scope: Vec<NodeId>,
}

/// Nodes a run transition moved, and the ledger entry when a run closed.
#[derive(Debug, Clone, Default)]
pub struct RunClose {
    pub changed: Vec<NodeId>,
    pub record: Option<RunRecord>,
}

pub struct Framework {
    id: String,
    name: String,
    tree: Tree,
    ledger: RunLedger,
    filters: FilterSet,
    active: Option<ActiveRun>,
    persist_statuses: bool,
}

impl Framework {
    pub fn new(id: impl Into<String>, name: impl Into<String>, precedence: Precedence, ledger_limit: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tree: Tree::new(precedence),
            ledger: RunLedger::new(ledger_limit),
            filters: FilterSet::default(),
            active: None,
            persist_statuses: false,
        }
    }

    pub fn from_config(id: impl Into<String>, name: impl Into<String>, cfg: &TreeConfig) -> Result<Self> {
        cfg.validate()?;
        let mut framework = Self::new(id, name, cfg.precedence()?, cfg.ledger_limit);
        framework.persist_statuses = cfg.persist_statuses;
        Ok(framework)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: FilterSet) {
        self.filters = filters;
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Register a test file; the suite id is the file path.
    pub fn add_suite(&mut self, file: impl Into<PathBuf>) -> Result<NodeId, TreeError> {
        let file = file.into();
        let id = file.to_string_lossy().into_owned();
        self.tree
            .insert_suite(Nugget::suite(id.clone(), self.id.clone(), file))?;
        Ok(id)
    }

    pub fn remove_suite(&mut self, id: &str) -> Result<(), TreeError> {
        if !self.tree.get(id)?.is_suite() {
            return Err(TreeError::NotASuite(id.to_string()));
        }
        self.tree.remove(id)
    }

    /// Framework status, computed from the current suite statuses on read.
    pub fn status(&self) -> Status {
        let suites = self
            .tree
            .roots()
            .iter()
            .filter_map(|id| self.tree.get(id).ok())
            .map(|suite| suite.status);
        self.tree.precedence().resolve(Status::Idle, suites, true)
    }

    /// Queue the run scope and remember the run until it finishes or stops.
    pub fn start_run(&mut self, selective: bool, now: DateTime<Utc>) -> RunPlan {
        let mut plan = RunPlan {
            selective,
            suites: if selective {
                self.tree.selected_suites()
            } else {
                self.tree.roots().to_vec()
            },
            tests: if selective {
                self.tree.selected_tests()
            } else {
                Vec::new()
            },
            queued: Vec::new(),
        };
        let scope = self.tree.run_scope(selective);
        plan.queued = self.tree.queue(selective);
        self.active = Some(ActiveRun {
            started_at: now,
            selective,
            scope,
        });
        info!(framework = %self.id, selective, suites = plan.suites.len(), "run started");
        plan
    }

    /// The runner began executing a suite file.
    pub fn suite_started(&mut self, suite_id: &str) -> Result<(), TreeError> {
        self.tree.running(suite_id).map(|_| ())
    }

    /// Merge a suite result. Only full runs clean up stale children.
    pub fn debrief(
        &mut self,
        suite_id: &str,
        fragment: ResultFragment,
    ) -> Result<DebriefSummary, TreeError> {
        self.debrief_at(suite_id, fragment, Utc::now())
    }

    pub fn debrief_at(
        &mut self,
        suite_id: &str,
        fragment: ResultFragment,
        now: DateTime<Utc>,
    ) -> Result<DebriefSummary, TreeError> {
        let cleanup = self.cleanup_default();
        self.tree.debrief_at(suite_id, fragment, cleanup, now)
    }

    /// Whether a debrief arriving now may drop children it does not report.
    pub fn cleanup_default(&self) -> bool {
        self.active.as_ref().is_none_or(|run| !run.selective)
    }

    /// Close the active run: nodes that never reported go back to `idle`.
    pub fn finish_run(&mut self, now: DateTime<Utc>) -> Option<RunRecord> {
        let run = self.active.take()?;
        self.tree.settle(&run.scope, Status::Idle);
        Some(self.record(run, now))
    }

    /// The runner exited: nodes it left `queued` or `running` become `idle`,
    /// or `error` when `fault` is set.
    ///
    /// The active run's own scope is settled and recorded. Without an active
    /// run only `queued` nodes in the `selective` scope are reverted.
    pub fn close_run(&mut self, fault: bool, selective: bool, now: DateTime<Utc>) -> RunClose {
        let to = if fault { Status::Error } else { Status::Idle };
        let Some(run) = self.active.take() else {
            let changed = if fault {
                self.tree.error_queued(selective)
            } else {
                self.tree.idle_queued(selective)
            };
            return RunClose {
                changed,
                record: None,
            };
        };
        let changed = self.tree.settle(&run.scope, to);
        RunClose {
            changed,
            record: Some(self.record(run, now)),
        }
    }

    /// Stop the active run without waiting for the runner to exit.
    ///
    /// In-flight nodes become `idle`, or `error` when the runner faulted.
    pub fn stop(&mut self, fault: bool, now: DateTime<Utc>) -> Option<RunRecord> {
        if !self.is_running() {
            return None;
        }
        self.abort(fault, now).record
    }

    /// Abort every in-flight node, recording the active run if there is one.
    pub fn abort(&mut self, fault: bool, now: DateTime<Utc>) -> RunClose {
        let changed = self.tree.abort(fault);
        let record = self.active.take().map(|run| self.record(run, now));
        RunClose { changed, record }
    }

    fn record(&mut self, run: ActiveRun, now: DateTime<Utc>) -> RunRecord {
        let duration = now.signed_duration_since(run.started_at);
        let record = RunRecord {
            started_at: run.started_at,
            finished_at: Some(now),
            status: self.status(),
            selective: run.selective,
            duration_ms: u64::try_from(duration.num_milliseconds()).ok(),
        };
        info!(framework = %self.id, status = %record.status, duration_ms = ?record.duration_ms, "run recorded");
        self.ledger.push(record.clone());
        record
    }

    /// Tests first seen during or after the latest recorded run.
    pub fn new_tests(&self) -> Vec<NodeId> {
        let Some(latest) = self.ledger.latest() else {
            return Vec::new();
        };
        self.tree
            .all_ids()
            .into_iter()
            .filter(|id| {
                self.tree.get(id).is_ok_and(|node| {
                    !node.is_suite() && node.stats.first.is_some_and(|first| first >= latest.started_at)
                })
            })
            .collect()
    }

    /// Suites to show under the active filters.
    ///
    /// A suite is shown when it or any materialized descendant matches.
    pub fn visible_suites(&self) -> Vec<RenderPayload> {
        self.tree
            .roots()
            .iter()
            .filter(|id| {
                self.filters.is_empty()
                    || self
                        .tree
                        .subtree(id)
                        .iter()
                        .any(|node_id| self.tree.get(node_id).is_ok_and(|node| self.filters.matches(node)))
            })
            .filter_map(|id| self.tree.render(id).ok())
            .collect()
    }

    pub fn snapshot(&self) -> Result<FrameworkSnapshot, TreeError> {
        let mut suites = Vec::new();
        for id in self.tree.roots() {
            let suite = self.tree.get(id)?;
            let NuggetKind::Suite { file, .. } = &suite.kind else {
                continue;
            };
            suites.push(SuiteSnapshot {
                file: file.clone(),
                result: self.tree.persist(id, self.persist_statuses)?,
            });
        }
        Ok(FrameworkSnapshot {
            framework: self.id.clone(),
            name: Some(self.name.clone()),
            suites,
            ledger: self.ledger.records().cloned().collect(),
        })
    }

    /// Rebuild suites and ledger from a snapshot.
    ///
    /// With `lazy`, suite children stay unmaterialized until expanded.
    pub fn restore(&mut self, snapshot: &FrameworkSnapshot, lazy: bool) -> Result<(), TreeError> {
        for suite in &snapshot.suites {
            let id = match self.add_suite(suite.file.clone()) {
                Ok(id) => id,
                Err(TreeError::DuplicateId(id)) => id,
                Err(err) => return Err(err),
            };
            if lazy {
                self.tree.build_shallow(&id, &suite.result)?;
            } else {
                self.tree.build(&id, &suite.result, true)?;
            }
        }
        for record in &snapshot.ledger {
            self.ledger.push(record.clone());
        }
        info!(framework = %self.id, suites = snapshot.suites.len(), lazy, "restored");
        Ok(())
    }
}
