use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::db::Db;
use crate::settings::validate_speed;
use crate::state::SharedSimulation;

const INDEX_HTML: &str = include_str!("ui/index.html");

const DEFAULT_OBSERVATION_LIMIT: i64 = 50;
const MAX_OBSERVATION_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct AppState {
    pub sim: SharedSimulation,
    /// `None` when the SQLite store is disabled.
    pub db: Option<Db>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/observations", get(api_observations))
        .route("/api/reset", post(api_reset))
        .route("/api/speed", post(api_speed))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let sim = state.sim.read().await;
    Json(sim.to_status())
}

#[derive(Deserialize)]
struct ObservationsQuery {
    limit: Option<i64>,
}

async fn api_observations(
    State(state): State<AppState>,
    Query(q): Query<ObservationsQuery>,
) -> Response {
    let Some(db) = &state.db else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "observation store disabled");
    };

    let limit = q
        .limit
        .unwrap_or(DEFAULT_OBSERVATION_LIMIT)
        .clamp(1, MAX_OBSERVATION_LIMIT);

    match db.recent_observations(limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            warn!("api: recent_observations failed: {e:#}");
            error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read observations")
        }
    }
}

async fn api_reset(State(state): State<AppState>) -> impl IntoResponse {
    let mut sim = state.sim.write().await;
    sim.reset_usage();
    Json(sim.to_status())
}

#[derive(Deserialize)]
struct SpeedRequest {
    multiplier: u32,
}

async fn api_speed(State(state): State<AppState>, Json(req): Json<SpeedRequest>) -> Response {
    let speed = match validate_speed(req.multiplier) {
        Ok(s) => s,
        Err(e) => return error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let mut sim = state.sim.write().await;
    // Minutes owed at the old speed are handed out before switching.
    let now = Instant::now();
    sim.catch_up(now);
    sim.set_speed(speed, now);
    info!(speed, "speed changed");
    Json(sim.to_status()).into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("web ui listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
