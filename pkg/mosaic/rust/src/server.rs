// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! HTTP API over a [`TileBoard`].
//!
//! GET    /api/health
//! GET    /api/tiles                    - list tiles and their lifecycle state
//! GET    /api/tiles/:name              - one tile with its last applied data
//! POST   /api/tiles/:name/render       - render (optionally into a new target)
//! DELETE /api/tiles/:name              - unrender
//! GET    /api/tiles/:name/charts       - chart specifications drawn for the tile
//! GET    /api/tiles/:name/export       - ?format=json|csv
//! GET    /api/selection                - current site selection
//! PUT    /api/selection                - replace it and update active tiles

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::board::TileBoard;
use crate::chart::{RenderTarget, SnapshotRenderer, TargetSnapshot};
use crate::data::DashboardData;
use crate::error::TileError;
use crate::export::ExportFormat;
use crate::lifecycle::{RenderOutcome, TileSummary};
use crate::selection::SiteId;

/// Application state shared across handlers.
pub struct AppState {
    pub board: Arc<TileBoard>,
    pub charts: Arc<SnapshotRenderer>,
}

pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8060 }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/tiles", get(tiles_handler))
        .route("/api/tiles/:name", get(tile_handler).delete(unrender_handler))
        .route("/api/tiles/:name/render", post(render_handler))
        .route("/api/tiles/:name/charts", get(charts_handler))
        .route("/api/tiles/:name/export", get(export_handler))
        .route("/api/selection", get(selection_handler).put(set_selection_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn run_server(state: AppState, config: ServerConfig) -> anyhow::Result<()> {
    let app = router(Arc::new(state));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "mosaic server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

// --- Errors ---

struct ApiError(TileError);

impl From<TileError> for ApiError {
    fn from(e: TileError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TileError::UnknownTile(_) | TileError::NoData(_) => StatusCode::NOT_FOUND,
            TileError::MissingRenderTarget(_) => StatusCode::BAD_REQUEST,
            TileError::TearingDown(_) => StatusCode::CONFLICT,
            TileError::Chart(_) | TileError::Export(..) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn join_failed(e: tokio::task::JoinError) -> Response {
    error!(error = %e, "tile task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: e.to_string() }),
    )
        .into_response()
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    tiles: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tiles: state.board.tiles().len(),
    })
}

#[derive(Serialize)]
struct TilesResponse {
    tiles: Vec<TileSummary>,
}

async fn tiles_handler(State(state): State<Arc<AppState>>) -> Json<TilesResponse> {
    let mut tiles = Vec::with_capacity(state.board.tiles().len());
    for tile in state.board.tiles() {
        tiles.push(tile.summary().await);
    }
    Json(TilesResponse { tiles })
}

#[derive(Serialize)]
struct TileResponse {
    #[serde(flatten)]
    summary: TileSummary,
    data: Option<DashboardData>,
}

async fn tile_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<TileResponse>, ApiError> {
    let tile = state.board.get(&name)?;
    Ok(Json(TileResponse {
        summary: tile.summary().await,
        data: tile.data().await.map(|d| (*d).clone()),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct RenderRequest {
    target: Option<String>,
}

/// Renders run on their own task so a dropped connection cannot abandon a
/// cycle halfway.
async fn render_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<RenderRequest>>,
) -> Response {
    let target = body
        .and_then(|Json(req)| req.target)
        .map(RenderTarget::new);
    let board = state.board.clone();
    let task = tokio::spawn(async move { board.render(&name, target).await });

    match task.await {
        Ok(Ok(outcome)) => Json::<RenderOutcome>(outcome).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(e) => join_failed(e),
    }
}

async fn unrender_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let board = state.board.clone();
    let task = tokio::spawn(async move { board.unrender(&name).await });

    match task.await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(e) => join_failed(e),
    }
}

async fn charts_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<TargetSnapshot>, ApiError> {
    let tile = state.board.get(&name)?;
    let snapshot = match tile.target().await {
        Some(target) => state.charts.snapshot(&target),
        None => TargetSnapshot::default(),
    };
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<ExportFormat>,
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = query.format.unwrap_or(ExportFormat::Json);
    let body = state.board.export(&name, format).await?;
    let (content_type, extension) = match format {
        ExportFormat::Json => ("application/json", "json"),
        ExportFormat::Csv => ("text/csv; charset=utf-8", "csv"),
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}.{extension}\""),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectionBody {
    sites: Vec<SiteId>,
}

async fn selection_handler(State(state): State<Arc<AppState>>) -> Json<SelectionBody> {
    Json(SelectionBody {
        sites: state.board.selection().current().to_vec(),
    })
}

/// Accepts the new selection immediately; tile updates finish in the
/// background and are fenced like any other cycle.
async fn set_selection_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectionBody>,
) -> (StatusCode, Json<SelectionBody>) {
    let board = state.board.clone();
    let sites = body.sites;
    let requested = sites.clone();
    tokio::spawn(async move {
        for (tile, outcome) in board.set_selection(sites).await {
            if let Err(e) = outcome {
                error!(tile = %tile, error = %e, "update after selection change failed");
            }
        }
    });
    (StatusCode::ACCEPTED, Json(SelectionBody { sites: requested }))
}
