use crate::commands::StoreArgs;
use crate::config::AppConfig;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use clap::Args;
use index::{GraphSnapshot, GraphStore, Neo4jStore, SnapshotNode};
use query::{load_view, GraphView, NodeDetail, ViewSource};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Snapshot file to serve when Neo4j is unreachable
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Skip Neo4j and serve the snapshot file only
    #[arg(long)]
    pub offline: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

struct AppState {
    view: GraphView,
    source: ViewSource,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    source: ViewSource,
    nodes: usize,
    edges: usize,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/graph", get(full_graph))
        .route("/nodes/:id", get(node))
        .route("/nodes/:id/neighborhood", get(neighborhood))
        .route("/search", get(search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(args: ServeArgs, config: &AppConfig) -> Result<()> {
    let store = if args.offline {
        None
    } else {
        match Neo4jStore::connect(&args.store.resolve(&config.neo4j)).await {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "Neo4j unavailable");
                None
            }
        }
    };

    let (view, source) = load_view(
        store.as_ref().map(|s| s as &dyn GraphStore),
        args.snapshot.as_deref(),
    )
    .await?;
    tracing::info!(
        source = ?source,
        nodes = view.node_count(),
        edges = view.edge_count(),
        "Graph view ready"
    );

    let app = router(Arc::new(AppState { view, source }));

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    tracing::info!("Server listening on http://{}", args.bind);

    axum::serve(listener, app).await.context("Server error")
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        source: state.source,
        nodes: state.view.node_count(),
        edges: state.view.edge_count(),
    })
}

async fn full_graph(State(state): State<Arc<AppState>>) -> Json<GraphSnapshot> {
    Json(state.view.full_graph())
}

async fn node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeDetail>, StatusCode> {
    state.view.select_node(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn neighborhood(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GraphSnapshot>, StatusCode> {
    state.view.neighborhood(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SnapshotNode>> {
    Json(state.view.search(&params.q))
}
