//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; logs include parameters and basic result info.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::domain::Scenario;
use crate::error::AppError;
use crate::export::{default_export_name, emergency_backup, export_to_file, export_to_writer};
use crate::logic;
use crate::progress::LeaderboardEntry;
use crate::protocol::*;
use crate::state::{AppState, ScenarioStats};
use crate::store::ExportSummary;

type ApiResult<T> = Result<Json<T>, AppError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, evaluator: state.evaluator_description() })
}

#[instrument(level = "info", skip_all)]
pub async fn http_login(
  State(state): State<Arc<AppState>>,
  body: Result<Json<LoginIn>, JsonRejection>,
) -> ApiResult<AccountOut> {
  let Json(body) = body?;
  Ok(Json(logic::login(&state, &body.username).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_user(
  State(state): State<Arc<AppState>>,
  Path(username): Path<String>,
) -> ApiResult<UserStatsOut> {
  Ok(Json(logic::user_stats(&state, &username).await?))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_history(
  State(state): State<Arc<AppState>>,
  Path(username): Path<String>,
  q: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<AttemptOut>> {
  let Query(q) = q?;
  let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
  Ok(Json(logic::user_history(&state, &username, limit).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_list_scenarios(
  State(state): State<Arc<AppState>>,
  q: Result<Query<LevelQuery>, QueryRejection>,
) -> ApiResult<Vec<Scenario>> {
  let Query(q) = q?;
  Ok(Json(state.scenarios_for_level(q.level).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_scenario_stats(State(state): State<Arc<AppState>>) -> Json<ScenarioStats> {
  Json(state.scenario_stats().await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_scenario_by_id(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<Scenario> {
  state
    .get_scenario(&id)
    .await
    .map(Json)
    .ok_or_else(|| AppError::not_found(format!("Unknown scenario: {id}")))
}

#[instrument(level = "info", skip_all)]
pub async fn http_pick_scenario(
  State(state): State<Arc<AppState>>,
  q: Result<Query<ScenarioQuery>, QueryRejection>,
) -> ApiResult<ScenarioOut> {
  let Query(q) = q?;
  let (scenario, origin) = state.choose_scenario(q.level, q.mode, q.ai_probability).await;
  info!(target: "scenario", level = %q.level, mode = ?q.mode, id = %scenario.id, ?origin, "HTTP scenario served");
  Ok(Json(ScenarioOut { scenario, level: q.level, origin }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_submit(
  State(state): State<Arc<AppState>>,
  body: Result<Json<SubmitIn>, JsonRejection>,
) -> ApiResult<SubmitOut> {
  let Json(body) = body?;
  Ok(Json(logic::submit_prompt(&state, body).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_leaderboard(
  State(state): State<Arc<AppState>>,
  q: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<LeaderboardEntry>> {
  let Query(q) = q?;
  let limit = q.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
  Ok(Json(state.store.read().await.leaderboard(limit)))
}

/// CSV download; 204 when there is nothing to export.
#[instrument(level = "info", skip(state))]
pub async fn http_download_csv(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
  let mut buf = Vec::new();
  let rows = export_to_writer(&*state.store.read().await, &mut buf)?;
  if rows == 0 {
    return Ok(StatusCode::NO_CONTENT.into_response());
  }
  let disposition = format!("attachment; filename=\"{}\"", default_export_name("user_progress_export"));
  info!(target: "progress", rows, "CSV download served");
  Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()), (header::CONTENT_DISPOSITION, disposition)], buf).into_response())
}

/// An empty body exports under the default name; anything else must be valid JSON.
#[instrument(level = "info", skip_all)]
pub async fn http_export_file(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<ExportOut> {
  let body = parse_export_body(&body)?;
  let path = export_to_file(&*state.store.read().await, &state.settings.export_dir, body.filename.as_deref())?;
  Ok(Json(ExportOut { exported: path.is_some(), path: path.map(|p| p.display().to_string()) }))
}

fn parse_export_body(body: &[u8]) -> Result<ExportIn, AppError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(ExportIn::default());
  }
  serde_json::from_slice(body).map_err(|e| AppError::bad_request(format!("Invalid JSON body: {e}")))
}

#[instrument(level = "info", skip(state))]
pub async fn http_export_summary(State(state): State<Arc<AppState>>) -> Json<ExportSummary> {
  Json(state.store.read().await.export_summary())
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_raw(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
  Json(state.store.read().await.raw_json())
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_reload(State(state): State<Arc<AppState>>) -> ApiResult<ReloadOut> {
  let mut store = state.store.write().await;
  store.reload()?;
  Ok(Json(ReloadOut { users: store.user_count() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_file(State(state): State<Arc<AppState>>) -> Json<FileInfoOut> {
  Json(logic::file_info(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_backup(State(state): State<Arc<AppState>>) -> ApiResult<ExportOut> {
  let path = emergency_backup(&*state.store.read().await, &state.settings.export_dir)?;
  Ok(Json(ExportOut { exported: path.is_some(), path: path.map(|p| p.display().to_string()) }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_reset_user(
  State(state): State<Arc<AppState>>,
  Path(username): Path<String>,
) -> ApiResult<AccountOut> {
  Ok(Json(logic::reset_user(&state, &username).await?))
}
