//! Merging runner results into the live tree.
//!
//! A fragment is matched against existing nodes by id. Unknown children are
//! created, and with `cleanup` children missing from the fragment are removed.
//! Without `cleanup` they keep their previous state, which is what makes a
//! selective re-run non-destructive.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::error::TreeError;
use crate::core::events::TreeEvent;
use crate::core::nugget::Nugget;
use crate::core::status::Status;
use crate::core::tree::Tree;
use crate::core::types::{NodeId, ResultFragment, Stats};

/// Outcome of merging one fragment.
///
/// `added` and `removed` are sorted by id so the summary is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebriefSummary {
    pub id: NodeId,
    pub status: Status,
    pub partial: bool,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Bookkeeping collected while a merge walks the tree.
#[derive(Debug, Default)]
pub(crate) struct MergeLog {
    pub(crate) touched: HashSet<NodeId>,
    pub(crate) added: Vec<NodeId>,
    pub(crate) removed: Vec<NodeId>,
}

impl Tree {
    /// Merge `fragment` into the node `id`.
    pub fn build(
        &mut self,
        id: &str,
        fragment: &ResultFragment,
        cleanup: bool,
    ) -> Result<DebriefSummary, TreeError> {
        self.build_at(id, fragment, cleanup, Utc::now())
    }

    /// [`build`](Self::build) with an explicit clock, for first-seen stamping.
    pub fn build_at(
        &mut self,
        id: &str,
        fragment: &ResultFragment,
        cleanup: bool,
        now: DateTime<Utc>,
    ) -> Result<DebriefSummary, TreeError> {
        self.get(id)?;
        let mut log = MergeLog::default();
        self.build_node(id, fragment, cleanup, now, &mut log);
        let subtree = self.subtree(id);
        self.refresh_all(&subtree, &log.touched);

        let node = self.get(id)?;
        let mut summary = DebriefSummary {
            id: node.id.clone(),
            status: node.status,
            partial: node.partial,
            added: log.added,
            removed: log.removed,
        };
        summary.added.sort();
        summary.removed.sort();
        Ok(summary)
    }

    /// Entry point for runner results: stamp the run, merge, announce.
    ///
    /// Only an unknown `id` is an error. Bad payload contents end up as
    /// `error` nodes so they stay visible.
    pub fn debrief(
        &mut self,
        id: &str,
        fragment: ResultFragment,
        cleanup: bool,
    ) -> Result<DebriefSummary, TreeError> {
        self.debrief_at(id, fragment, cleanup, Utc::now())
    }

    pub fn debrief_at(
        &mut self,
        id: &str,
        mut fragment: ResultFragment,
        cleanup: bool,
        now: DateTime<Utc>,
    ) -> Result<DebriefSummary, TreeError> {
        self.get(id)?;
        fragment.stamp_last_run(now);
        let summary = self.build_at(id, &fragment, cleanup, now)?;
        info!(
            id,
            status = %summary.status,
            partial = summary.partial,
            added = summary.added.len(),
            removed = summary.removed.len(),
            "debriefed"
        );
        self.emit(&TreeEvent::Debriefed { id: id.to_string() });
        Ok(summary)
    }

    /// Debrief a raw JSON payload.
    ///
    /// A payload that does not decode marks the node `error`, with the decode
    /// error as feedback, and leaves its children untouched.
    pub fn debrief_json(
        &mut self,
        id: &str,
        payload: Value,
        cleanup: bool,
    ) -> Result<DebriefSummary, TreeError> {
        match serde_json::from_value::<ResultFragment>(payload) {
            Ok(fragment) => self.debrief(id, fragment, cleanup),
            Err(err) => {
                warn!(id, error = %err, "undecodable result payload");
                let fragment = ResultFragment {
                    status: Some(Status::Error),
                    feedback: Some(json!({ "message": format!("malformed result: {err}") })),
                    ..ResultFragment::default()
                };
                self.debrief(id, fragment, false)
            }
        }
    }

    /// Copy of `fragment` (without its children) with stats merged into the
    /// node's history: an existing first-seen stamp always wins.
    pub fn merge_results(
        &self,
        id: &str,
        fragment: &ResultFragment,
        now: DateTime<Utc>,
    ) -> ResultFragment {
        let existing = self.get(id).map(|node| node.stats).unwrap_or_default();
        let incoming = fragment.stats.unwrap_or_default();
        let stats = Stats {
            first: existing.first.or(incoming.first).or(Some(now)),
            last: incoming.last.or(existing.last),
            duration_ms: incoming.duration_ms,
        };
        ResultFragment {
            id: fragment.id.clone(),
            name: fragment.name.clone(),
            display_name: fragment.display_name.clone(),
            status: fragment.status,
            feedback: fragment.feedback.clone(),
            console: fragment.console.clone(),
            stats: Some(stats),
            tests: None,
        }
    }

    /// Id a child fragment maps to under `parent`.
    ///
    /// Fragments without an id fall back to their name, then to their position.
    /// An id already used elsewhere in the tree is scoped under the parent.
    pub(crate) fn child_id(&self, parent: &str, index: usize, fragment: &ResultFragment) -> NodeId {
        let raw = match (&fragment.id, &fragment.name) {
            (Some(id), _) => id.clone(),
            (None, Some(name)) => format!("{parent}::{name}"),
            (None, None) => format!("{parent}#{index}"),
        };
        match self.get(&raw) {
            Ok(existing) if existing.parent.as_deref() != Some(parent) => {
                format!("{parent}::{raw}")
            }
            _ => raw,
        }
    }

    /// Merge one child fragment under `parent`, creating the child if needed.
    pub(crate) fn merge_child(
        &mut self,
        parent: &str,
        index: usize,
        fragment: &ResultFragment,
        cleanup: bool,
        now: DateTime<Utc>,
        log: &mut MergeLog,
    ) -> NodeId {
        let child_id = self.child_id(parent, index, fragment);
        let synthesized;
        let fragment = if fragment.id.is_none() && fragment.name.is_none() {
            warn!(parent, index, "result without id or name");
            synthesized = unidentified_result(index);
            &synthesized
        } else {
            fragment
        };
        if !self.contains(&child_id) {
            let name = fragment.name.clone().unwrap_or_else(|| child_id.clone());
            self.insert_child(parent, Nugget::test(child_id.clone(), parent, name));
            log.added.push(child_id.clone());
        }
        self.build_node(&child_id, fragment, cleanup, now, log);
        child_id
    }

    pub(crate) fn build_node(
        &mut self,
        id: &str,
        fragment: &ResultFragment,
        cleanup: bool,
        now: DateTime<Utc>,
        log: &mut MergeLog,
    ) {
        let merged = self.merge_results(id, fragment, now);
        let Ok(node) = self.get_mut(id) else {
            return;
        };
        let pending = if node.loaded {
            None
        } else {
            node.result.as_mut().and_then(|result| result.tests.take())
        };
        if let Some(name) = &merged.name {
            node.name = name.clone();
        }
        if merged.display_name.is_some() {
            node.display_name = merged.display_name.clone();
        }
        node.own_status = merged.status.unwrap_or(Status::Idle);
        node.feedback = merged.feedback.clone();
        node.console = merged.console.clone().unwrap_or_default();
        node.stats = merged.stats.unwrap_or_default();
        node.result = Some(merged);
        log.touched.insert(id.to_string());

        let Some(tests) = &fragment.tests else {
            if let (Some(pending), Ok(node)) = (pending, self.get_mut(id)) {
                if let Some(result) = node.result.as_mut() {
                    result.tests = Some(pending);
                }
            }
            return;
        };

        // Persisted children are the merge base so they keep their first-seen
        // time. Cleanup below drops the ones this fragment does not report.
        let restored = log.added.len();
        for (index, child) in pending.iter().flatten().enumerate() {
            if !self.contains(&self.child_id(id, index, child)) {
                self.merge_child(id, index, child, false, now, log);
            }
        }
        log.added.truncate(restored);
        if cleanup {
            // A child load still in flight answers from older data.
            self.cancel_load(id);
        }

        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for (index, child) in tests.iter().enumerate() {
            let child_id = self.merge_child(id, index, child, cleanup, now, log);
            if seen.insert(child_id.clone()) {
                order.push(child_id);
            }
        }

        let existing = self
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        if cleanup {
            for stale in existing.iter().filter(|child| !seen.contains(*child)) {
                self.detach(stale);
                log.removed.push(stale.clone());
            }
            if let Ok(node) = self.get_mut(id) {
                node.children = order;
            }
        }

        let untouched = !cleanup && existing.iter().any(|child| !seen.contains(child));
        let child_partial = seen
            .iter()
            .any(|child| self.get(child).is_ok_and(|child| child.partial));
        if let Ok(node) = self.get_mut(id) {
            node.partial = untouched || child_partial;
            node.loaded = true;
            node.has_pending_children = false;
        }
    }
}

fn unidentified_result(index: usize) -> ResultFragment {
    ResultFragment {
        name: Some(format!("result #{index}")),
        status: Some(Status::Error),
        feedback: Some(json!({ "message": "result is missing an id and a name" })),
        ..ResultFragment::default()
    }
}
