//! Arena holding every suite and test of one framework.
//!
//! Nodes are keyed by id; parent links are ids, so ownership stays acyclic
//! while upward status propagation is a walk over `parent` links.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::core::debrief::MergeLog;
use crate::core::error::TreeError;
use crate::core::events::{ChildLoader, TreeEvent, TreeObserver};
use crate::core::nugget::Nugget;
use crate::core::status::{Precedence, Status};
use crate::core::types::{NodeId, RenderPayload, ResultFragment};

/// Mutable result tree, owned by a single coordination context.
pub struct Tree {
    nodes: HashMap<NodeId, Nugget>,
    roots: Vec<NodeId>,
    precedence: Precedence,
    observers: Vec<Box<dyn TreeObserver>>,
    loader: Option<Box<dyn ChildLoader>>,
    pending_loads: HashSet<NodeId>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(Precedence::default())
    }
}

impl Tree {
    pub fn new(precedence: Precedence) -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            precedence,
            observers: Vec::new(),
            loader: None,
            pending_loads: HashSet::new(),
        }
    }

    pub fn precedence(&self) -> &Precedence {
        &self.precedence
    }

    pub fn subscribe(&mut self, observer: impl TreeObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn set_loader(&mut self, loader: impl ChildLoader + 'static) {
        self.loader = Some(Box::new(loader));
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Suite ids, in insertion order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Result<&Nugget, TreeError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Nugget, TreeError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))
    }

    pub fn children(&self, id: &str) -> Result<Vec<&Nugget>, TreeError> {
        let node = self.get(id)?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .collect())
    }

    pub fn count_children(&self, id: &str) -> Result<usize, TreeError> {
        Ok(self.get(id)?.count_children())
    }

    pub fn has_children(&self, id: &str) -> Result<bool, TreeError> {
        Ok(self.get(id)?.has_children())
    }

    /// `id` followed by all of its descendants, depth-first pre-order.
    pub fn subtree(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.subtree_inner(id, &mut out);
        out
    }

    fn subtree_inner(&self, id: &str, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        out.push(node.id.clone());
        for child in &node.children {
            self.subtree_inner(child, out);
        }
    }

    /// Every node of the tree, suites first in insertion order, pre-order within.
    pub fn all_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for root in &self.roots {
            self.subtree_inner(root, &mut out);
        }
        out
    }

    /// Add a suite as a new root.
    pub fn insert_suite(&mut self, suite: Nugget) -> Result<(), TreeError> {
        if !suite.is_suite() {
            return Err(TreeError::NotASuite(suite.id));
        }
        if self.nodes.contains_key(&suite.id) {
            return Err(TreeError::DuplicateId(suite.id));
        }
        debug!(id = %suite.id, "suite added");
        let id = suite.id.clone();
        self.roots.push(id.clone());
        self.nodes.insert(id.clone(), suite);
        self.notify_changed(&id);
        Ok(())
    }

    pub(crate) fn insert_child(&mut self, parent: &str, child: Nugget) {
        let id = child.id.clone();
        self.nodes.insert(id.clone(), child);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(id);
        }
    }

    /// Remove a node with its whole subtree.
    pub fn remove(&mut self, id: &str) -> Result<(), TreeError> {
        self.get(id)?;
        if let Some(parent_id) = self.detach(id) {
            self.refresh(&parent_id);
            self.notify_changed(&parent_id);
            self.propagate(&parent_id);
        }
        Ok(())
    }

    /// Drop `id` and its descendants without re-aggregating; returns the parent.
    pub(crate) fn detach(&mut self, id: &str) -> Option<NodeId> {
        let parent = self.nodes.get(id)?.parent.clone();
        for removed in self.subtree(id) {
            self.nodes.remove(&removed);
            self.pending_loads.remove(&removed);
        }
        match parent.as_deref() {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(parent_id) {
                    parent.children.retain(|child| child != id);
                }
            }
            None => self.roots.retain(|root| root != id),
        }
        debug!(id, "node removed");
        self.emit(&TreeEvent::Removed { id: id.to_string() });
        parent
    }

    /// Recompute one node's status from its own state and its children.
    ///
    /// Returns whether the status changed; emits nothing.
    pub(crate) fn refresh(&mut self, id: &str) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let children = node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .map(|child| child.status);
        let status = self
            .precedence
            .resolve(node.own_status, children, node.is_suite() && node.loaded);
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let changed = node.status != status;
        node.status = status;
        changed
    }

    /// Refresh every id in `preorder` bottom-up, then walk above the first one.
    ///
    /// `preorder` must list parents before their children.
    pub(crate) fn refresh_all(&mut self, preorder: &[NodeId], touched: &HashSet<NodeId>) {
        for id in preorder.iter().rev() {
            let changed = self.refresh(id);
            if changed || touched.contains(id) {
                self.notify_changed(id);
            }
        }
        if let Some(first) = preorder.first() {
            self.propagate(first);
        }
    }

    /// Re-aggregate the ancestors of `id`, stopping at the first unchanged one.
    pub(crate) fn propagate(&mut self, id: &str) {
        let mut current = self.nodes.get(id).and_then(|node| node.parent.clone());
        while let Some(parent) = current {
            if !self.refresh(&parent) {
                break;
            }
            self.notify_changed(&parent);
            current = self.nodes.get(&parent).and_then(|node| node.parent.clone());
        }
    }

    pub(crate) fn notify_changed(&self, id: &str) {
        if let Some(node) = self.nodes.get(id) {
            self.emit(&TreeEvent::Changed {
                node: node.render(),
            });
        }
    }

    pub(crate) fn emit(&self, event: &TreeEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }

    pub fn render(&self, id: &str) -> Result<RenderPayload, TreeError> {
        Ok(self.get(id)?.render())
    }

    pub fn render_children(&self, id: &str) -> Result<Vec<RenderPayload>, TreeError> {
        Ok(self
            .children(id)?
            .into_iter()
            .map(Nugget::render)
            .collect())
    }

    /// Set `expanded`, flipping it when `toggle` is `None`.
    ///
    /// Expanding a node whose children are not materialized asks the loader for
    /// them; the node stays expanded-but-empty until they are resolved.
    pub fn toggle_expanded(
        &mut self,
        id: &str,
        toggle: Option<bool>,
        cascade: bool,
    ) -> Result<(), TreeError> {
        let node = self.get(id)?;
        let target = toggle.unwrap_or(!node.expanded);
        if node.expanded == target && !cascade {
            return Ok(());
        }
        let ids = if cascade {
            self.subtree(id)
        } else {
            vec![id.to_string()]
        };
        for node_id in ids {
            self.set_expanded(&node_id, target);
        }
        Ok(())
    }

    fn set_expanded(&mut self, id: &str, expanded: bool) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let needs_load = expanded && !node.loaded;
        if node.expanded != expanded {
            node.expanded = expanded;
            self.notify_changed(id);
        }
        if needs_load {
            self.request_children(id);
        }
    }

    fn request_children(&mut self, id: &str) {
        if !self.pending_loads.insert(id.to_string()) {
            return;
        }
        debug!(id, "children requested");
        self.emit(&TreeEvent::ChildrenRequested { id: id.to_string() });
        if let Some(loader) = &self.loader {
            loader.request(id);
        }
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.pending_loads.contains(id)
    }

    /// Forget an in-flight child load; its answer will be dropped.
    pub(crate) fn cancel_load(&mut self, id: &str) {
        if self.pending_loads.remove(id) {
            debug!(id, "child load superseded");
        }
    }

    /// Materialize the children delivered by the loader for `id`.
    ///
    /// Children that already exist (e.g. because a debrief created them while
    /// the load was in flight) keep their live state. An answer for a node
    /// that is no longer loading is dropped: a cleanup debrief replaced the
    /// children it would restore.
    pub fn resolve_children(
        &mut self,
        id: &str,
        children: Vec<ResultFragment>,
    ) -> Result<(), TreeError> {
        self.get(id)?;
        if !self.pending_loads.remove(id) {
            debug!(id, "dropping stale child load");
            return Ok(());
        }
        let now = chrono::Utc::now();
        let mut log = MergeLog::default();
        for (index, fragment) in children.iter().enumerate() {
            if self.nodes.contains_key(&self.child_id(id, index, fragment)) {
                continue;
            }
            self.merge_child(id, index, fragment, false, now, &mut log);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.loaded = true;
            node.has_pending_children = false;
            if let Some(result) = node.result.as_mut() {
                result.tests = None;
            }
        }
        debug!(id, count = children.len(), "children loaded");
        log.touched.insert(id.to_string());
        let subtree = self.subtree(id);
        self.refresh_all(&subtree, &log.touched);
        self.emit(&TreeEvent::ChildrenLoaded { id: id.to_string() });
        Ok(())
    }

    /// Merge only the node's own fields from `fragment`.
    ///
    /// Reported children are kept aside in `result` and materialized on the
    /// first expansion or the next debrief that reports children.
    pub fn build_shallow(&mut self, id: &str, fragment: &ResultFragment) -> Result<(), TreeError> {
        let mut shallow = fragment.clone();
        let tests = shallow.tests.take();
        let now = chrono::Utc::now();
        let mut log = MergeLog::default();
        self.get(id)?;
        self.build_node(id, &shallow, false, now, &mut log);
        let node = self.get_mut(id)?;
        node.has_pending_children = tests.as_ref().is_some_and(|tests| !tests.is_empty());
        if let Some(result) = node.result.as_mut() {
            result.tests = tests;
        }
        let subtree = self.subtree(id);
        self.refresh_all(&subtree, &log.touched);
        Ok(())
    }

    /// Snapshot of the merged results under `id`.
    ///
    /// Statuses are forced to `idle` unless `keep_status` is set; in-flight
    /// statuses are never persisted.
    pub fn persist(&self, id: &str, keep_status: bool) -> Result<ResultFragment, TreeError> {
        let node = self.get(id)?;
        let mut fragment = node.result.clone().unwrap_or_default();
        fragment.id = Some(node.id.clone());
        fragment.name = Some(node.name.clone());
        fragment.display_name = node.display_name.clone();
        fragment.status = Some(persisted_status(node.own_status, keep_status));
        fragment.feedback = node.feedback.clone();
        fragment.console = (!node.console.is_empty()).then(|| node.console.clone());
        fragment.stats = Some(node.stats);
        if node.loaded {
            let tests = node
                .children
                .iter()
                .map(|child| self.persist(child, keep_status))
                .collect::<Result<Vec<_>, _>>()?;
            fragment.tests = Some(tests);
        } else if let Some(tests) = fragment.tests.as_mut() {
            for test in tests {
                force_status(test, keep_status);
            }
        }
        Ok(fragment)
    }

    /// Clear results under `id`, keeping identity and first-seen stats.
    pub fn reset_result(&mut self, id: &str) -> Result<(), TreeError> {
        self.get(id)?;
        let subtree = self.subtree(id);
        let mut touched = HashSet::new();
        for node_id in &subtree {
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.own_status = Status::Idle;
                node.feedback = None;
                node.console.clear();
                node.partial = false;
                node.stats.last = None;
                node.stats.duration_ms = None;
                if let Some(result) = node.result.as_mut() {
                    result.status = None;
                    result.feedback = None;
                    result.console = None;
                }
                touched.insert(node_id.clone());
            }
        }
        self.refresh_all(&subtree, &touched);
        Ok(())
    }
}

fn persisted_status(status: Status, keep_status: bool) -> Status {
    if keep_status && !status.is_in_flight() {
        status
    } else {
        Status::Idle
    }
}

fn force_status(fragment: &mut ResultFragment, keep_status: bool) {
    let status = fragment.status.unwrap_or(Status::Idle);
    fragment.status = Some(persisted_status(status, keep_status));
    if let Some(tests) = fragment.tests.as_mut() {
        for test in tests {
            force_status(test, keep_status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingObserver, at, suite_with_tests, test_fragment};

    #[test]
    fn insert_suite_rejects_duplicates_and_tests() {
        let mut tree = Tree::default();
        tree.insert_suite(Nugget::suite("s", "fw", "s.js".into()))
            .expect("insert");
        let err = tree
            .insert_suite(Nugget::suite("s", "fw", "s.js".into()))
            .expect_err("duplicate");
        assert_eq!(err, TreeError::DuplicateId("s".to_string()));

        let err = tree
            .insert_suite(Nugget::test("t", "s", "t"))
            .expect_err("not a suite");
        assert_eq!(err, TreeError::NotASuite("t".to_string()));
    }

    /// Stale ids surface as not-found rather than panicking.
    #[test]
    fn unknown_ids_are_not_found() {
        let mut tree = Tree::default();
        assert_eq!(
            tree.render("gone").expect_err("missing"),
            TreeError::NotFound("gone".to_string())
        );
        assert!(tree.toggle_expanded("gone", None, false).is_err());
        assert!(tree.remove("gone").is_err());
    }

    #[test]
    fn remove_drops_subtree_and_reaggregates_parent() {
        let mut tree = suite_with_tests(
            "s",
            vec![
                test_fragment("a", Status::Passed),
                test_fragment("b", Status::Failed),
            ],
        );
        assert_eq!(tree.get("s").unwrap().status, Status::Failed);

        tree.remove("b").expect("remove");
        assert!(!tree.contains("b"));
        assert_eq!(tree.count_children("s").unwrap(), 1);
        assert_eq!(tree.get("s").unwrap().status, Status::Passed);
    }

    /// Expanding an unloaded node requests its children exactly once.
    #[test]
    fn toggle_expanded_requests_children_once() {
        let (tx, rx) = std::sync::mpsc::channel::<NodeId>();
        let mut tree = Tree::default();
        tree.set_loader(tx);
        tree.insert_suite(Nugget::suite("s", "fw", "s.js".into()))
            .expect("insert");

        tree.toggle_expanded("s", Some(true), false).expect("expand");
        tree.toggle_expanded("s", Some(false), false).expect("collapse");
        tree.toggle_expanded("s", Some(true), false).expect("expand again");

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["s".to_string()]);
        assert!(tree.is_loading("s"));
        assert!(tree.get("s").unwrap().expanded);
        assert_eq!(tree.count_children("s").unwrap(), 0);
    }

    #[test]
    fn toggle_expanded_is_a_noop_when_already_in_state() {
        let observer = RecordingObserver::default();
        let mut tree = suite_with_tests("s", vec![test_fragment("a", Status::Passed)]);
        tree.subscribe(observer.clone());

        tree.toggle_expanded("s", Some(false), false).expect("collapse");
        assert!(observer.events().is_empty());
    }

    #[test]
    fn toggle_expanded_cascades_to_descendants() {
        let mut tree = suite_with_tests(
            "s",
            vec![test_fragment("a", Status::Passed).with_tests(vec![test_fragment("a1", Status::Passed)])],
        );
        tree.toggle_expanded("s", None, true).expect("expand");
        assert!(tree.get("a").unwrap().expanded);
        assert!(tree.get("a1").unwrap().expanded);
    }

    /// Loaded children merge in, but do not clobber nodes a debrief already created.
    #[test]
    fn resolve_children_keeps_live_children() {
        let mut tree = Tree::default();
        tree.insert_suite(Nugget::suite("s", "fw", "s.js".into()))
            .expect("insert");
        tree.toggle_expanded("s", Some(true), false).expect("expand");
        tree.debrief(
            "s",
            ResultFragment::named("s", "s").with_tests(vec![test_fragment("a", Status::Failed)]),
            false,
        )
        .expect("debrief");

        tree.resolve_children(
            "s",
            vec![test_fragment("a", Status::Idle), test_fragment("b", Status::Passed)],
        )
        .expect("resolve");

        assert!(!tree.is_loading("s"));
        assert_eq!(tree.get("a").unwrap().status, Status::Failed);
        assert_eq!(tree.get("b").unwrap().status, Status::Passed);
        assert_eq!(tree.get("s").unwrap().status, Status::Failed);
    }

    /// A cleanup debrief during the load wins over the loader's older answer.
    #[test]
    fn resolve_children_after_cleanup_debrief_is_dropped() {
        let mut tree = Tree::default();
        tree.insert_suite(Nugget::suite("s", "fw", "s.js".into()))
            .expect("insert");
        tree.build_shallow(
            "s",
            &ResultFragment::named("s", "s").with_tests(vec![
                test_fragment("a", Status::Passed),
                test_fragment("b", Status::Passed),
            ]),
        )
        .expect("shallow");
        tree.toggle_expanded("s", Some(true), false).expect("expand");
        assert!(tree.is_loading("s"));

        tree.debrief_at(
            "s",
            ResultFragment::named("s", "s").with_tests(vec![test_fragment("a", Status::Failed)]),
            true,
            at(5),
        )
        .expect("debrief");
        assert!(!tree.contains("b"));
        assert!(!tree.is_loading("s"));

        tree.resolve_children(
            "s",
            vec![test_fragment("a", Status::Passed), test_fragment("b", Status::Passed)],
        )
        .expect("resolve");

        assert!(!tree.contains("b"));
        assert_eq!(tree.get("s").unwrap().children, vec!["a".to_string()]);
        assert_eq!(tree.get("a").unwrap().status, Status::Failed);
        assert_eq!(tree.get("s").unwrap().status, Status::Failed);
    }

    #[test]
    fn persist_forces_idle_unless_asked() {
        let tree = suite_with_tests(
            "s",
            vec![
                test_fragment("a", Status::Failed),
                test_fragment("b", Status::Queued),
            ],
        );

        let idle = tree.persist("s", false).expect("persist");
        let tests = idle.tests.expect("tests");
        assert!(tests.iter().all(|t| t.status == Some(Status::Idle)));

        let kept = tree.persist("s", true).expect("persist");
        let tests = kept.tests.expect("tests");
        assert_eq!(tests[0].status, Some(Status::Failed));
        assert_eq!(tests[1].status, Some(Status::Idle));
    }

    #[test]
    fn reset_result_clears_outcome_but_keeps_first_seen() {
        let mut tree = suite_with_tests(
            "s",
            vec![ResultFragment {
                feedback: Some(serde_json::json!("expected 1, got 2")),
                console: Some(vec!["log line".to_string()]),
                ..test_fragment("a", Status::Failed)
            }],
        );
        let first = tree.get("a").unwrap().stats.first;

        tree.reset_result("s").expect("reset");

        let a = tree.get("a").unwrap();
        assert_eq!(a.status, Status::Idle);
        assert_eq!(a.feedback, None);
        assert!(a.console.is_empty());
        assert_eq!(a.stats.first, first);
        assert_eq!(tree.get("s").unwrap().status, Status::Idle);
    }
}
