//! HTTP route handlers for the UI API.
//!
//! Every handler locks one framework for the duration of the request, so
//! mutations of a framework are applied one at a time. Stale node ids answer
//! 404 with a `refetch` hint; the client reloads the parent listing.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use testtree::core::debrief::DebriefSummary;
use testtree::core::error::TreeError;
use testtree::core::status::Status;
use testtree::core::types::{NodeId, RenderPayload};
use testtree::framework::{FilterSet, Framework, RunClose, RunPlan, RunRecord};
use testtree::store::save_framework;
use tracing::{info, warn};

use crate::sse;
use crate::state::{AppState, SharedFramework};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/events", get(sse::events_handler))
        .route("/frameworks/{fw}", get(get_framework))
        .route("/frameworks/{fw}/filters", post(set_filters))
        .route("/frameworks/{fw}/nodes/{id}", get(get_node))
        .route("/frameworks/{fw}/nodes/{id}/children", get(get_children))
        .route("/frameworks/{fw}/nodes/{id}/select", post(select_node))
        .route("/frameworks/{fw}/nodes/{id}/expand", post(expand_node))
        .route("/frameworks/{fw}/suites/{id}/running", post(suite_running))
        .route("/frameworks/{fw}/suites/{id}/debrief", post(debrief_suite))
        .route("/frameworks/{fw}/queue", post(queue))
        .route("/frameworks/{fw}/idle", post(idle))
        .route("/frameworks/{fw}/error", post(error))
        .route("/frameworks/{fw}/idle-queued", post(idle_queued))
        .route("/frameworks/{fw}/error-queued", post(error_queued))
        .route("/frameworks/{fw}/abort", post(abort))
        .route("/frameworks/{fw}/persist", post(persist))
}

/// Error answered by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// Unknown framework or node; the client should refetch.
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<TreeError> for ApiError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("not found: {id}"), "refetch": true }),
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "refetch": false }),
            ),
            ApiError::Internal(err) => {
                warn!(error = %format!("{err:#}"), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("{err:#}"), "refetch": false }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn lookup(state: &AppState, fw: &str) -> Result<SharedFramework, ApiError> {
    state
        .framework(fw)
        .ok_or_else(|| ApiError::NotFound(fw.to_string()))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkView {
    id: String,
    name: String,
    status: Status,
    running: bool,
    suites: Vec<RenderPayload>,
    new_tests: Vec<NodeId>,
    ledger: Vec<RunRecord>,
    filters: FilterSet,
}

impl FrameworkView {
    fn of(framework: &Framework) -> Self {
        Self {
            id: framework.id().to_string(),
            name: framework.name().to_string(),
            status: framework.status(),
            running: framework.is_running(),
            suites: framework.visible_suites(),
            new_tests: framework.new_tests(),
            ledger: framework.ledger().records().cloned().collect(),
            filters: framework.filters().clone(),
        }
    }
}

/// GET /api/frameworks/{fw} - status, visible suites and run history.
async fn get_framework(
    State(state): State<AppState>,
    Path(fw): Path<String>,
) -> ApiResult<FrameworkView> {
    let framework = lookup(&state, &fw)?;
    let framework = framework.lock().await;
    Ok(Json(FrameworkView::of(&framework)))
}

/// POST /api/frameworks/{fw}/filters - replace the display filters.
async fn set_filters(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Json(filters): Json<FilterSet>,
) -> ApiResult<FrameworkView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    framework.set_filters(filters);
    Ok(Json(FrameworkView::of(&framework)))
}

/// GET /api/frameworks/{fw}/nodes/{id} - one node, without descendants.
async fn get_node(
    State(state): State<AppState>,
    Path((fw, id)): Path<(String, String)>,
) -> ApiResult<RenderPayload> {
    let framework = lookup(&state, &fw)?;
    let framework = framework.lock().await;
    Ok(Json(framework.tree().render(&id)?))
}

/// GET /api/frameworks/{fw}/nodes/{id}/children - materialized children.
async fn get_children(
    State(state): State<AppState>,
    Path((fw, id)): Path<(String, String)>,
) -> ApiResult<Vec<RenderPayload>> {
    let framework = lookup(&state, &fw)?;
    let framework = framework.lock().await;
    Ok(Json(framework.tree().render_children(&id)?))
}

/// Body of select/expand: `value` absent flips the flag.
#[derive(Debug, Default, Deserialize)]
pub struct Toggle {
    #[serde(default)]
    value: Option<bool>,
    #[serde(default)]
    cascade: bool,
}

/// POST /api/frameworks/{fw}/nodes/{id}/select
async fn select_node(
    State(state): State<AppState>,
    Path((fw, id)): Path<(String, String)>,
    Json(toggle): Json<Toggle>,
) -> ApiResult<RenderPayload> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    let tree = framework.tree_mut();
    tree.toggle_selected(&id, toggle.value, toggle.cascade)?;
    Ok(Json(tree.render(&id)?))
}

/// POST /api/frameworks/{fw}/nodes/{id}/expand
///
/// Children of an unloaded node arrive later, announced by a
/// `children_loaded` event.
async fn expand_node(
    State(state): State<AppState>,
    Path((fw, id)): Path<(String, String)>,
    Json(toggle): Json<Toggle>,
) -> ApiResult<RenderPayload> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    let tree = framework.tree_mut();
    tree.toggle_expanded(&id, toggle.value, toggle.cascade)?;
    Ok(Json(tree.render(&id)?))
}

/// POST /api/frameworks/{fw}/suites/{id}/running - the runner started a suite.
async fn suite_running(
    State(state): State<AppState>,
    Path((fw, id)): Path<(String, String)>,
) -> ApiResult<RenderPayload> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    framework.suite_started(&id)?;
    Ok(Json(framework.tree().render(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DebriefQuery {
    /// Overrides the framework's choice (full runs clean up, selective runs do not).
    cleanup: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebriefView {
    id: NodeId,
    status: Status,
    partial: bool,
    added: Vec<NodeId>,
    removed: Vec<NodeId>,
}

impl From<DebriefSummary> for DebriefView {
    fn from(summary: DebriefSummary) -> Self {
        Self {
            id: summary.id,
            status: summary.status,
            partial: summary.partial,
            added: summary.added,
            removed: summary.removed,
        }
    }
}

/// POST /api/frameworks/{fw}/suites/{id}/debrief - merge a runner result.
///
/// The body is decoded by the tree: a malformed payload turns the suite into
/// an `error` node instead of being rejected.
async fn debrief_suite(
    State(state): State<AppState>,
    Path((fw, id)): Path<(String, String)>,
    Query(query): Query<DebriefQuery>,
    Json(payload): Json<Value>,
) -> ApiResult<DebriefView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    let cleanup = query
        .cleanup
        .unwrap_or_else(|| framework.cleanup_default());
    let summary = framework.tree_mut().debrief_json(&id, payload, cleanup)?;
    Ok(Json(summary.into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    selective: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AbortQuery {
    #[serde(default)]
    fault: bool,
}

/// Result of a run-scope transition.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionView {
    changed: Vec<NodeId>,
    /// Set when the transition closed the active run.
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<RunRecord>,
}

impl From<RunClose> for TransitionView {
    fn from(closed: RunClose) -> Self {
        Self {
            changed: closed.changed,
            run: closed.record,
        }
    }
}

/// POST /api/frameworks/{fw}/queue - start a run.
async fn queue(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<RunPlan> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    Ok(Json(framework.start_run(scope.selective, Utc::now())))
}

/// POST /api/frameworks/{fw}/idle
async fn idle(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<TransitionView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    Ok(Json(TransitionView {
        changed: framework.tree_mut().idle(scope.selective),
        run: None,
    }))
}

/// POST /api/frameworks/{fw}/error
async fn error(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<TransitionView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    Ok(Json(TransitionView {
        changed: framework.tree_mut().error(scope.selective),
        run: None,
    }))
}

/// POST /api/frameworks/{fw}/idle-queued - the runner exited normally.
///
/// `selective` only scopes the transition when no run is active.
async fn idle_queued(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<TransitionView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    let closed = framework.close_run(false, scope.selective, Utc::now());
    Ok(Json(closed.into()))
}

/// POST /api/frameworks/{fw}/error-queued - the runner exited with a fault.
async fn error_queued(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Query(scope): Query<ScopeQuery>,
) -> ApiResult<TransitionView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    let closed = framework.close_run(true, scope.selective, Utc::now());
    Ok(Json(closed.into()))
}

/// POST /api/frameworks/{fw}/abort - stop the active run.
async fn abort(
    State(state): State<AppState>,
    Path(fw): Path<String>,
    Query(query): Query<AbortQuery>,
) -> ApiResult<TransitionView> {
    let framework = lookup(&state, &fw)?;
    let mut framework = framework.lock().await;
    Ok(Json(framework.abort(query.fault, Utc::now()).into()))
}

/// POST /api/frameworks/{fw}/persist - write the snapshot to disk.
async fn persist(
    State(state): State<AppState>,
    Path(fw): Path<String>,
) -> ApiResult<Value> {
    let framework = lookup(&state, &fw)?;
    let framework = framework.lock().await;
    save_framework(&state.paths, &framework)?;
    info!(framework = %fw, path = %state.paths.snapshot_path.display(), "snapshot written");
    Ok(Json(json!({ "path": state.paths.snapshot_path })))
}
