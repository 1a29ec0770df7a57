//! HTTP server and API handlers.
//!
//! GET /api/health     - liveness.
//! GET /api/sites      - site identifiers, display names and colours.
//! GET /api/pollutants - pollutants with unit labels.
//! GET /api/defaults   - forecast window, year range and initial selection.
//! GET /api/query      - filtered traces for one selection.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::catalog::{Pollutant, SiteId};
use crate::config::ServerSettings;
use crate::data::ForecastWindow;
use crate::error::QueryError;
use crate::query::{DateWindow, QueryEngine, QueryOutcome, Selection, Trace, WindowEnd};

/// Application state shared across handlers.
pub struct AppState {
    pub engine: QueryEngine,
}

pub fn router(engine: QueryEngine) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/sites", get(sites_handler))
        .route("/api/pollutants", get(pollutants_handler))
        .route("/api/defaults", get(defaults_handler))
        .route("/api/query", get(query_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn run_server(engine: QueryEngine, settings: &ServerSettings) -> anyhow::Result<()> {
    let app = router(engine);
    let addr = SocketAddr::new(settings.bind_address, settings.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        // Without a signal handler, keep serving
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct SiteInfo {
    id: SiteId,
    name: &'static str,
    color: &'static str,
    forecast_color: &'static str,
}

async fn sites_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SiteInfo>> {
    let sites = state
        .engine
        .store()
        .sites()
        .map(|site| SiteInfo {
            id: site,
            name: site.display_name(),
            color: site.color(),
            forecast_color: site.forecast_color(),
        })
        .collect();
    Json(sites)
}

#[derive(Serialize)]
struct PollutantInfo {
    id: Pollutant,
    name: &'static str,
    unit: &'static str,
    axis_label: String,
}

async fn pollutants_handler() -> Json<Vec<PollutantInfo>> {
    Json(
        Pollutant::ALL
            .iter()
            .map(|p| PollutantInfo {
                id: *p,
                name: p.display_name(),
                unit: p.unit().symbol(),
                axis_label: p.axis_label(),
            })
            .collect(),
    )
}

#[derive(Serialize)]
struct DefaultsResponse {
    forecast_window: ForecastWindow,
    year_bounds: Option<(i32, i32)>,
    years: Vec<i32>,
    window_end: WindowEnd,
    selection: Selection,
}

async fn defaults_handler(State(state): State<Arc<AppState>>) -> Json<DefaultsResponse> {
    let store = state.engine.store();
    Json(DefaultsResponse {
        forecast_window: *store.forecast_window(),
        year_bounds: store.year_bounds(),
        years: store.years().to_vec(),
        window_end: state.engine.window_end(),
        selection: state.engine.defaults(),
    })
}

/// Query string for /api/query. `sites` is a comma-separated identifier list.
#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    sites: String,
    pollutant: String,
    month_start: u32,
    month_end: u32,
    year_start: i32,
    year_end: i32,
}

#[derive(Serialize)]
struct QueryResponse<'a> {
    pollutant: Pollutant,
    axis_label: &'a str,
    window: DateWindow,
    traces: Vec<Trace<'a>>,
}

/// Rejected query, mapped onto a status code with a JSON body.
struct ApiError(QueryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            QueryError::UnknownSite(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidSelection(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        ApiError(e)
    }
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let site_ids: Vec<&str> = params
        .sites
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    // Nothing selected: leave the client's chart alone
    if site_ids.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let selection = Selection::from_identifiers(
        &site_ids,
        &params.pollutant,
        (params.month_start, params.month_end),
        (params.year_start, params.year_end),
    )?;

    match state.engine.query(&selection)? {
        QueryOutcome::NoUpdate => Ok(StatusCode::NO_CONTENT.into_response()),
        QueryOutcome::Update(result) => {
            let response = QueryResponse {
                pollutant: result.pollutant,
                axis_label: &result.axis_label,
                window: result.window,
                traces: result.traces(),
            };
            Ok(Json(response).into_response())
        }
    }
}
