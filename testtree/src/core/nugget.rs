//! Tree node shared by suites and tests.

use std::path::PathBuf;

use serde_json::Value;

use crate::core::status::Status;
use crate::core::types::{NodeId, RenderPayload, ResultFragment, Stats};

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NuggetKind {
    /// A test file, addressed by one runner invocation.
    Suite {
        /// Owning framework, by id. The suite does not own it.
        framework: String,
        file: PathBuf,
    },
    /// A test case; may hold nested (e.g. parameterized) cases.
    Test,
}

/// A node in the result arena.
///
/// `parent` and `children` are ids into the owning [`Tree`](crate::core::tree::Tree);
/// the arena owns every node and the parent link is only used to propagate
/// status changes upwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Nugget {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NuggetKind,
    pub name: String,
    pub display_name: Option<String>,
    /// Status assigned to this node directly (by a result or a run transition).
    pub own_status: Status,
    /// Aggregate of `own_status` and the children's statuses.
    pub status: Status,
    pub selected: bool,
    pub expanded: bool,
    pub partial: bool,
    /// Whether `children` reflects the real child list.
    pub loaded: bool,
    /// Set on unloaded nodes known to have children that are not materialized yet.
    pub has_pending_children: bool,
    pub feedback: Option<Value>,
    pub console: Vec<String>,
    pub stats: Stats,
    /// Last merged result for this node.
    pub result: Option<ResultFragment>,
}

impl Nugget {
    pub fn suite(id: impl Into<NodeId>, framework: impl Into<String>, file: PathBuf) -> Self {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string_lossy().into_owned());
        Self::new(
            id.into(),
            None,
            NuggetKind::Suite {
                framework: framework.into(),
                file,
            },
            name,
        )
    }

    pub fn test(id: impl Into<NodeId>, parent: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id.into(), Some(parent.into()), NuggetKind::Test, name.into())
    }

    fn new(id: NodeId, parent: Option<NodeId>, kind: NuggetKind, name: String) -> Self {
        let status = match kind {
            NuggetKind::Suite { .. } => Status::Empty,
            NuggetKind::Test => Status::Idle,
        };
        Self {
            id,
            parent,
            children: Vec::new(),
            kind,
            name,
            display_name: None,
            own_status: Status::Idle,
            status,
            selected: false,
            expanded: false,
            partial: false,
            loaded: false,
            has_pending_children: false,
            feedback: None,
            console: Vec::new(),
            stats: Stats::default(),
            result: None,
        }
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.kind, NuggetKind::Suite { .. })
    }

    pub fn count_children(&self) -> usize {
        self.children.len()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || (!self.loaded && self.has_pending_children)
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn render(&self) -> RenderPayload {
        let has_stats = self.stats != Stats::default();
        RenderPayload {
            id: self.id.clone(),
            name: self.name.clone(),
            display_name: self.label().to_string(),
            status: self.status,
            feedback: self.feedback.clone(),
            console: (!self.console.is_empty()).then(|| self.console.clone()),
            stats: has_stats.then_some(self.stats),
            has_children: self.has_children(),
            selected: self.selected,
            expanded: self.expanded,
            partial: self.partial,
        }
    }
}
