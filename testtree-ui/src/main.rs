//! testtree UI server: live test-result tree over HTTP and SSE.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use testtree::io::layout::StorePaths;
use testtree::store::open_framework;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "testtree-ui")]
#[command(about = "Web UI server for the testtree result tree")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Project directory (contains .testtree/)
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Materialize every suite on startup instead of on first expand
    #[arg(long)]
    eager: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("testtree_ui=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let project_dir = args.project_dir.canonicalize().unwrap_or(args.project_dir);
    info!(project_dir = %project_dir.display(), "starting testtree-ui");

    let paths = StorePaths::new(&project_dir);
    let framework = open_framework(&paths, !args.eager)
        .with_context(|| format!("open store in {}", project_dir.display()))?;
    info!(
        framework = %framework.id(),
        suites = framework.tree().roots().len(),
        "framework loaded"
    );

    let (load_tx, load_rx) = mpsc::unbounded_channel();
    let state = AppState::new(project_dir, vec![framework], load_tx);
    sse::start_child_loader(state.clone(), load_rx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
