//! Server-Sent Events stream and the background child loader.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use testtree::core::types::ResultFragment;
use testtree::io::snapshot_store::load_snapshot;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::state::{AppState, LoadRequest};

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change) => {
                    if let Ok(json) = serde_json::to_string(&change) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Clients refetch what they display once they notice the gap.
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                    yield Ok(Event::default().event("lagged").data(n.to_string()));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Start the loader that answers lazy-load requests from the snapshot on disk.
pub fn start_child_loader(state: AppState, rx: mpsc::UnboundedReceiver<LoadRequest>) {
    tokio::spawn(run_child_loader(state, rx));
}

async fn run_child_loader(state: AppState, mut rx: mpsc::UnboundedReceiver<LoadRequest>) {
    while let Some(request) = rx.recv().await {
        let children = match read_children(&state, &request.id).await {
            Ok(children) => children,
            Err(err) => {
                warn!(id = %request.id, error = %format!("{err:#}"), "child load failed");
                Vec::new()
            }
        };
        let Some(framework) = state.framework(&request.framework) else {
            continue;
        };
        let mut framework = framework.lock().await;
        // The node may have been removed while the load was in flight.
        if let Err(err) = framework.tree_mut().resolve_children(&request.id, children) {
            debug!(id = %request.id, error = %err, "dropping child load");
        }
    }
}

async fn read_children(state: &AppState, id: &str) -> anyhow::Result<Vec<ResultFragment>> {
    let schema_path = state.paths.schema_path.clone();
    let snapshot_path = state.paths.snapshot_path.clone();
    let snapshot =
        tokio::task::spawn_blocking(move || load_snapshot(&schema_path, &snapshot_path)).await??;
    Ok(snapshot
        .find(id)
        .and_then(|result| result.tests.clone())
        .unwrap_or_default())
}
