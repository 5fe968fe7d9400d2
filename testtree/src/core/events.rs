//! Change notifications and the lazy-load seam.
//!
//! The tree never polls and never talks to a global bus: each mutation is
//! pushed to the observers registered on that tree, and lazy loads go to the
//! single [`ChildLoader`] it was given.

use std::sync::mpsc::Sender;

use serde::Serialize;

use crate::core::types::{NodeId, RenderPayload};

/// Something observers may want to forward to a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeEvent {
    /// Status, selection, expansion or result data of a node changed.
    Changed { node: RenderPayload },
    /// A node and its descendants left the tree.
    Removed { id: NodeId },
    /// A debrief finished merging into this node.
    Debriefed { id: NodeId },
    /// Children of an expanded node were requested from the loader.
    ChildrenRequested { id: NodeId },
    /// Requested children arrived and were materialized.
    ChildrenLoaded { id: NodeId },
}

impl TreeEvent {
    pub fn id(&self) -> &str {
        match self {
            TreeEvent::Changed { node } => &node.id,
            TreeEvent::Removed { id }
            | TreeEvent::Debriefed { id }
            | TreeEvent::ChildrenRequested { id }
            | TreeEvent::ChildrenLoaded { id } => id,
        }
    }
}

/// Receives every event emitted by a tree.
pub trait TreeObserver: Send {
    fn notify(&self, event: &TreeEvent);
}

impl TreeObserver for Sender<TreeEvent> {
    fn notify(&self, event: &TreeEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.send(event.clone());
    }
}

/// External data source for children that are not materialized yet.
///
/// `request` is fire-and-forget; the answer comes back through
/// [`Tree::resolve_children`](crate::core::tree::Tree::resolve_children).
pub trait ChildLoader: Send {
    fn request(&self, id: &str);
}

impl ChildLoader for Sender<NodeId> {
    fn request(&self, id: &str) {
        let _ = self.send(id.to_string());
    }
}
