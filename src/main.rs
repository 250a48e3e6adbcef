//! PromptQuest · prompt-writing trainer backend
//!
//! - Axum HTTP API with a static SPA fallback (./static/index.html)
//! - Prompt evaluation and scenario generation through Gemini
//!   (Vertex AI or API key, via environment variables)
//! - Per-user progress in a JSON file, CSV export
//!
//! Important env variables (a `.env` file is read first):
//!   PORT                       : u16 (default 3000)
//!   PROGRESS_FILE              : default "user_progress.json"
//!   EXPORT_DIR                 : directory for CSV exports and backups (default ".")
//!   AUTO_BACKUP_EVERY          : backup when the user count is a multiple of this (default 5, 0 = off)
//!   GOOGLE_GENAI_USE_VERTEXAI  : "true" selects Vertex AI
//!   GOOGLE_CLOUD_PROJECT / GOOGLE_CLOUD_LOCATION : Vertex AI route (Application Default Credentials)
//!   GOOGLE_CLOUD_ACCESS_TOKEN  : optional fixed Vertex AI bearer token
//!   GOOGLE_API_KEY             : direct API-key route
//!   LLM_MODEL                  : default "gemini-2.5-flash"
//!   AGENT_CONFIG_PATH          : TOML config (prompt overrides + extra scenarios)
//!   LOG_LEVEL                  : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                 : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod error;
mod progress;
mod store;
mod export;
mod gemini;
mod evaluator;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  dotenvy::dotenv().ok();
  telemetry::init_tracing();

  let settings = Settings::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

  // A corrupt progress file stops startup here rather than being overwritten later.
  let state = Arc::new(AppState::new(settings)?);
  info!(
    target: "promptquest",
    users = state.store.read().await.user_count(),
    evaluator = %state.evaluator_description().unwrap_or_else(|| "disabled".into()),
    "State ready"
  );

  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "promptquest", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "promptquest", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "promptquest", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "promptquest", "Shutdown signal received");
}
