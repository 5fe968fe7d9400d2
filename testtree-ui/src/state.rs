//! Shared application state for the UI server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use testtree::core::events::{ChildLoader, TreeEvent, TreeObserver};
use testtree::framework::Framework;
use testtree::io::layout::StorePaths;
use tokio::sync::{Mutex, broadcast, mpsc};

/// A tree event tagged with the framework it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub framework: String,
    #[serde(flatten)]
    pub event: TreeEvent,
}

/// A lazy-load request queued for the background loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub framework: String,
    pub id: String,
}

/// One framework and the lock serializing every mutation of it.
pub type SharedFramework = Arc<Mutex<Framework>>;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// `.testtree/` paths of the served project.
    pub paths: StorePaths,
    pub frameworks: Arc<HashMap<String, SharedFramework>>,
    /// Broadcast sender for tree events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
}

impl AppState {
    /// Wire `frameworks` to the event broadcast and to the loader channel.
    pub fn new(
        project_dir: PathBuf,
        frameworks: Vec<Framework>,
        load_tx: mpsc::UnboundedSender<LoadRequest>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let mut by_id = HashMap::new();
        for mut framework in frameworks {
            let id = framework.id().to_string();
            framework.tree_mut().subscribe(BroadcastObserver {
                framework: id.clone(),
                tx: event_tx.clone(),
            });
            framework.tree_mut().set_loader(ChannelLoader {
                framework: id.clone(),
                tx: load_tx.clone(),
            });
            by_id.insert(id, Arc::new(Mutex::new(framework)));
        }
        Self {
            paths: StorePaths::new(project_dir),
            frameworks: Arc::new(by_id),
            event_tx: Arc::new(event_tx),
        }
    }

    pub fn framework(&self, id: &str) -> Option<SharedFramework> {
        self.frameworks.get(id).cloned()
    }
}

/// Forwards tree events to every SSE client.
struct BroadcastObserver {
    framework: String,
    tx: broadcast::Sender<ChangeEvent>,
}

impl TreeObserver for BroadcastObserver {
    fn notify(&self, event: &TreeEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(ChangeEvent {
            framework: self.framework.clone(),
            event: event.clone(),
        });
    }
}

/// Hands lazy-load requests to the background loader without blocking the tree.
struct ChannelLoader {
    framework: String,
    tx: mpsc::UnboundedSender<LoadRequest>,
}

impl ChildLoader for ChannelLoader {
    fn request(&self, id: &str) {
        let _ = self.tx.send(LoadRequest {
            framework: self.framework.clone(),
            id: id.to_string(),
        });
    }
}
