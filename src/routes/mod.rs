//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - Admin endpoints under `/api/v1/admin/...` (no auth; local operator tool)
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/login", post(http::http_login))
        .route("/api/v1/users/:username", get(http::http_get_user))
        .route("/api/v1/users/:username/history", get(http::http_get_history))
        .route("/api/v1/scenarios", get(http::http_list_scenarios))
        .route("/api/v1/scenarios/stats", get(http::http_scenario_stats))
        .route("/api/v1/scenarios/:id", get(http::http_get_scenario_by_id))
        .route("/api/v1/scenario", get(http::http_pick_scenario))
        .route("/api/v1/submit", post(http::http_submit))
        .route("/api/v1/leaderboard", get(http::http_leaderboard))
        .route("/api/v1/export", get(http::http_download_csv).post(http::http_export_file))
        .route("/api/v1/export/summary", get(http::http_export_summary))
        .route("/api/v1/admin/raw", get(http::http_admin_raw))
        .route("/api/v1/admin/reload", post(http::http_admin_reload))
        .route("/api/v1/admin/file", get(http::http_admin_file))
        .route("/api/v1/admin/backup", post(http::http_admin_backup))
        .route("/api/v1/admin/users/:username/reset", post(http::http_admin_reset_user))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
