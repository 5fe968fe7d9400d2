//! Selection cascades and run-scope status transitions.
//!
//! The run scope of a selective run is the selected closure: a selected node
//! whose children are all unselected implicitly brings its whole subtree,
//! otherwise only the selected children are followed. Every ancestor of a
//! scoped node is itself in scope, so re-aggregation stays inside the scope.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::core::error::TreeError;
use crate::core::status::Status;
use crate::core::tree::Tree;
use crate::core::types::{NodeId, SelectionState};

impl Tree {
    /// Set `selected`, flipping it when `toggle` is `None`.
    ///
    /// With `cascade` the same value is applied to every descendant. Ancestors
    /// are then kept selected exactly while at least one child is.
    pub fn toggle_selected(
        &mut self,
        id: &str,
        toggle: Option<bool>,
        cascade: bool,
    ) -> Result<(), TreeError> {
        let node = self.get(id)?;
        let target = toggle.unwrap_or(!node.selected);
        if node.selected == target && !cascade {
            return Ok(());
        }
        let ids = if cascade {
            self.subtree(id)
        } else {
            vec![id.to_string()]
        };
        for node_id in &ids {
            self.set_selected(node_id, target);
        }
        self.sync_ancestor_selection(id);
        Ok(())
    }

    fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        let Ok(node) = self.get_mut(id) else {
            return false;
        };
        if node.selected == selected {
            return false;
        }
        node.selected = selected;
        self.notify_changed(id);
        true
    }

    fn sync_ancestor_selection(&mut self, id: &str) {
        let mut current = self.get(id).ok().and_then(|node| node.parent.clone());
        while let Some(parent) = current {
            let any_selected = self
                .children(&parent)
                .map(|children| children.iter().any(|child| child.selected))
                .unwrap_or(false);
            if !self.set_selected(&parent, any_selected) {
                break;
            }
            current = self.get(&parent).ok().and_then(|node| node.parent.clone());
        }
    }

    /// Derived selection: full only when every descendant is selected too.
    pub fn selection(&self, id: &str) -> Result<SelectionState, TreeError> {
        let node = self.get(id)?;
        if !node.selected {
            return Ok(SelectionState::None);
        }
        for child in &node.children {
            if self.selection(child)? != SelectionState::Full {
                return Ok(SelectionState::Partial);
            }
        }
        Ok(SelectionState::Full)
    }

    /// Nodes taking part in a run, parents before children.
    pub fn run_scope(&self, selective: bool) -> Vec<NodeId> {
        if !selective {
            return self.all_ids();
        }
        let mut out = Vec::new();
        for root in self.roots() {
            self.selected_closure(root, &mut out);
        }
        out
    }

    fn selected_closure(&self, id: &str, out: &mut Vec<NodeId>) {
        let Ok(node) = self.get(id) else {
            return;
        };
        if !node.selected {
            return;
        }
        out.push(node.id.clone());
        let narrowed = node
            .children
            .iter()
            .any(|child| self.get(child).is_ok_and(|child| child.selected));
        for child in &node.children {
            if narrowed {
                self.selected_closure(child, out);
            } else {
                out.extend(self.subtree(child));
            }
        }
    }

    /// Leaf nodes a selective run should execute.
    ///
    /// A selected node without materialized children (e.g. a suite that was
    /// never expanded) counts as a leaf: the runner executes it whole.
    pub fn selected_tests(&self) -> Vec<NodeId> {
        self.run_scope(true)
            .into_iter()
            .filter(|id| self.get(id).is_ok_and(|node| node.children.is_empty()))
            .collect()
    }

    /// Suites with at least one node in the selective scope.
    pub fn selected_suites(&self) -> Vec<NodeId> {
        self.roots()
            .iter()
            .filter(|id| self.get(id).is_ok_and(|node| node.selected))
            .cloned()
            .collect()
    }

    /// Mark the scope `queued` ahead of a run.
    pub fn queue(&mut self, selective: bool) -> Vec<NodeId> {
        let scope = self.run_scope(selective);
        let changed = self.transition(&scope, |_| true, Status::Queued);
        info!(selective, count = changed.len(), "queued");
        changed
    }

    /// Reset the scope to `idle`.
    pub fn idle(&mut self, selective: bool) -> Vec<NodeId> {
        let scope = self.run_scope(selective);
        self.transition(&scope, |_| true, Status::Idle)
    }

    /// Mark the whole scope `error`.
    pub fn error(&mut self, selective: bool) -> Vec<NodeId> {
        let scope = self.run_scope(selective);
        self.transition(&scope, |_| true, Status::Error)
    }

    /// Revert scoped nodes still `queued` (no result arrived) to `idle`.
    pub fn idle_queued(&mut self, selective: bool) -> Vec<NodeId> {
        let scope = self.run_scope(selective);
        self.transition(&scope, |status| status == Status::Queued, Status::Idle)
    }

    /// Mark scoped nodes still `queued` as `error`, leaving arrived results alone.
    pub fn error_queued(&mut self, selective: bool) -> Vec<NodeId> {
        let scope = self.run_scope(selective);
        self.transition(&scope, |status| status == Status::Queued, Status::Error)
    }

    /// Close a run over `scope`: nodes still `queued` or `running` become `to`.
    pub fn settle(&mut self, scope: &[NodeId], to: Status) -> Vec<NodeId> {
        let changed = self.transition(scope, Status::is_in_flight, to);
        info!(status = %to, count = changed.len(), "run settled");
        changed
    }

    /// The runner started executing `suite_id`.
    pub fn running(&mut self, suite_id: &str) -> Result<Vec<NodeId>, TreeError> {
        let suite = self.get(suite_id)?;
        if !suite.is_suite() {
            return Err(TreeError::NotASuite(suite_id.to_string()));
        }
        let scope = self.subtree(suite_id);
        let root = suite_id.to_string();
        Ok(self.transition(
            &scope,
            |status| status == Status::Queued,
            Status::Running,
        )
        .into_iter()
        .chain(self.force_own_status(&root, Status::Running))
        .collect())
    }

    /// Stop a run: in-flight nodes go back to `idle`, or to `error` on a runner fault.
    pub fn abort(&mut self, fault: bool) -> Vec<NodeId> {
        let scope = self.all_ids();
        let to = if fault { Status::Error } else { Status::Idle };
        let changed = self.transition(&scope, Status::is_in_flight, to);
        info!(fault, count = changed.len(), "run aborted");
        changed
    }

    fn force_own_status(&mut self, id: &str, status: Status) -> Option<NodeId> {
        let scope = vec![id.to_string()];
        self.transition(&scope, |own| own != status, status)
            .into_iter()
            .next()
    }

    /// Apply `to` on every scoped node whose own status matches, then re-aggregate.
    fn transition(
        &mut self,
        scope: &[NodeId],
        matches: impl Fn(Status) -> bool,
        to: Status,
    ) -> Vec<NodeId> {
        let mut touched = HashSet::new();
        let mut changed = Vec::new();
        for id in scope {
            let Ok(node) = self.get_mut(id) else {
                continue;
            };
            if node.own_status == to || !matches(node.own_status) {
                continue;
            }
            node.own_status = to;
            touched.insert(id.clone());
            changed.push(id.clone());
        }
        debug!(status = %to, count = changed.len(), "status transition");
        self.refresh_all(scope, &touched);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ResultFragment;
    use crate::test_support::{at, suite_tree, suite_with_tests, test_fragment};

    fn nested_suite() -> Tree {
        suite_with_tests(
            "s",
            vec![
                test_fragment("a", Status::Passed),
                test_fragment("b", Status::Failed)
                    .with_tests(vec![test_fragment("b1", Status::Failed), test_fragment("b2", Status::Passed)]),
            ],
        )
    }

    /// Cascading selection reaches nested tests.
    #[test]
    fn cascading_select_reaches_nested_tests() {
        let mut tree = nested_suite();
        tree.toggle_selected("s", Some(true), true).expect("select");
        for id in ["s", "a", "b", "b1", "b2"] {
            assert!(tree.get(id).unwrap().selected, "{id} selected");
        }
        assert_eq!(tree.selection("s").unwrap(), SelectionState::Full);
    }

    /// Selecting one test selects its ancestors, which then read as partial.
    #[test]
    fn selecting_a_child_marks_ancestors_partial() {
        let mut tree = nested_suite();
        tree.toggle_selected("b1", Some(true), false).expect("select");

        assert!(tree.get("b").unwrap().selected);
        assert!(tree.get("s").unwrap().selected);
        assert_eq!(tree.selection("s").unwrap(), SelectionState::Partial);
        assert_eq!(tree.selection("b1").unwrap(), SelectionState::Full);
        assert_eq!(tree.selection("a").unwrap(), SelectionState::None);

        tree.toggle_selected("b1", None, false).expect("deselect");
        assert!(!tree.get("s").unwrap().selected);
    }

    #[test]
    fn selected_tests_expand_implicit_subtrees() {
        let mut tree = nested_suite();
        tree.toggle_selected("b", Some(true), false).expect("select");
        assert_eq!(tree.selected_tests(), vec!["b1".to_string(), "b2".to_string()]);
        assert_eq!(tree.selected_suites(), vec!["s".to_string()]);

        tree.toggle_selected("b2", Some(true), false).expect("narrow");
        assert_eq!(tree.selected_tests(), vec!["b2".to_string()]);
    }

    /// An unexpanded suite is run whole.
    #[test]
    fn unloaded_suite_counts_as_leaf() {
        let mut tree = suite_tree("s");
        tree.toggle_selected("s", Some(true), true).expect("select");
        assert_eq!(tree.selected_tests(), vec!["s".to_string()]);
    }

    #[test]
    fn selective_queue_only_touches_scope() {
        let mut tree = nested_suite();
        tree.toggle_selected("a", Some(true), false).expect("select");

        let queued = tree.queue(true);
        assert_eq!(queued, vec!["s".to_string(), "a".to_string()]);
        assert_eq!(tree.get("a").unwrap().status, Status::Queued);
        assert_eq!(tree.get("b").unwrap().status, Status::Failed);
        assert_eq!(tree.get("s").unwrap().status, Status::Failed);
    }

    /// Results that arrived out of order are not overwritten by idle_queued.
    #[test]
    fn idle_queued_spares_arrived_results() {
        let mut tree = nested_suite();
        tree.queue(false);
        tree.build_at(
            "s",
            &ResultFragment::named("s", "s").with_tests(vec![test_fragment("a", Status::Passed)]),
            false,
            at(2),
        )
        .expect("partial result");

        tree.idle_queued(false);
        assert_eq!(tree.get("a").unwrap().status, Status::Passed);
        assert_eq!(tree.get("b1").unwrap().status, Status::Idle);
        assert_eq!(tree.get("s").unwrap().status, Status::Passed);
    }

    #[test]
    fn error_queued_surfaces_runner_fault() {
        let mut tree = nested_suite();
        tree.queue(false);
        tree.error_queued(false);
        assert_eq!(tree.get("b2").unwrap().status, Status::Error);
        assert_eq!(tree.get("s").unwrap().status, Status::Error);
    }

    #[test]
    fn idle_and_error_cover_the_whole_scope() {
        let mut tree = nested_suite();
        tree.error(false);
        assert!(tree.all_ids().iter().all(|id| tree.get(id).unwrap().status == Status::Error));
        tree.idle(false);
        assert_eq!(tree.get("s").unwrap().status, Status::Idle);
        assert_eq!(tree.get("b").unwrap().status, Status::Idle);
    }

    #[test]
    fn running_marks_suite_and_queued_tests() {
        let mut tree = nested_suite();
        tree.queue(false);
        tree.running("s").expect("running");
        assert_eq!(tree.get("s").unwrap().own_status, Status::Running);
        assert_eq!(tree.get("b1").unwrap().status, Status::Running);
        assert_eq!(
            tree.running("a").expect_err("not a suite"),
            TreeError::NotASuite("a".to_string())
        );
    }

    #[test]
    fn abort_reverts_or_errors_in_flight_nodes() {
        let mut tree = nested_suite();
        tree.queue(false);
        tree.running("s").expect("running");
        tree.abort(false);
        assert_eq!(tree.get("s").unwrap().status, Status::Idle);

        tree.queue(false);
        tree.abort(true);
        assert_eq!(tree.get("a").unwrap().status, Status::Error);
    }
}
