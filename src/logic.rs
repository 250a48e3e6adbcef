//! Core flows shared by the HTTP handlers.
//!
//! This includes:
//!   - Login and dashboard stats
//!   - Prompt submission (evaluate, record, auto-backup)
//!   - Attempt history, data reset, progress file info

use chrono::{DateTime, Local};
use tracing::{info, instrument, warn};

use crate::domain::User;
use crate::error::{AppError, EvaluatorError, StoreError};
use crate::export::maybe_auto_backup;
use crate::progress::score_tier;
use crate::protocol::{AccountOut, AttemptOut, FileInfoOut, SubmitIn, SubmitOut, UserStatsOut};
use crate::state::AppState;
use crate::store::ProgressStore;

const UNSAVED_WARNING: &str = "Your progress could not be saved to disk. It is kept for this session only.";

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, AppError> {
  let v = value.trim();
  if v.is_empty() {
    return Err(AppError::bad_request(format!("Please enter a {what}")));
  }
  Ok(v)
}

fn unknown_user(username: &str) -> AppError {
  AppError::not_found(format!("Unknown user: {username}"))
}

/// A failed durable write still leaves the change in memory: answer with the
/// in-memory user and a warning. Other store errors propagate.
fn keep_unsaved(
  store: &ProgressStore,
  username: &str,
  result: Result<User, StoreError>,
) -> Result<(User, Option<String>), AppError> {
  match result {
    Ok(user) => Ok((user, None)),
    Err(e @ StoreError::Persistence { .. }) => {
      warn!(target: "progress", %username, error = %e, "Change kept in memory but not saved");
      let user = store.user(username).cloned().ok_or(e)?;
      Ok((user, Some(UNSAVED_WARNING.to_string())))
    }
    Err(e) => Err(e.into()),
  }
}

/// Create the user on first login, then return the dashboard stats.
#[instrument(level = "info", skip(state))]
pub async fn login(state: &AppState, username: &str) -> Result<AccountOut, AppError> {
  let username = required(username, "username")?;
  let mut store = state.store.write().await;
  let result = store.ensure_user(username);
  let (user, warning) = keep_unsaved(&store, username, result)?;
  info!(target: "progress", %username, attempts = user.attempt_count(), "User logged in");
  Ok(AccountOut { user: UserStatsOut::from(&user), warning })
}

pub async fn user_stats(state: &AppState, username: &str) -> Result<UserStatsOut, AppError> {
  let username = required(username, "username")?;
  let store = state.store.read().await;
  let user = store.user(username).ok_or_else(|| unknown_user(username))?;
  Ok(UserStatsOut::from(user))
}

/// Most recent attempts first.
pub async fn user_history(state: &AppState, username: &str, limit: usize) -> Result<Vec<AttemptOut>, AppError> {
  let username = required(username, "username")?;
  let store = state.store.read().await;
  let user = store.user(username).ok_or_else(|| unknown_user(username))?;
  Ok(user.history.iter().rev().take(limit).map(AttemptOut::from).collect())
}

/// Evaluate a prompt and record the attempt.
///
/// The evaluator call happens without holding the store lock. A failed durable
/// write still returns the evaluation, with a warning.
#[instrument(level = "info", skip(state, body), fields(username = %body.username, scenario_id = %body.scenario_id, prompt_len = body.prompt.len()))]
pub async fn submit_prompt(state: &AppState, body: SubmitIn) -> Result<SubmitOut, AppError> {
  let username = required(&body.username, "username")?;
  if body.prompt.trim().is_empty() {
    return Err(AppError::bad_request("Please write a prompt before submitting"));
  }
  let scenario = state
    .get_scenario(&body.scenario_id)
    .await
    .ok_or_else(|| AppError::not_found(format!("Unknown scenario: {}", body.scenario_id)))?;
  let evaluator = state.evaluator.as_ref().ok_or(EvaluatorError::NotConfigured)?;

  let evaluation = evaluator.evaluate(&scenario, &body.prompt).await?;

  let mut store = state.store.write().await;
  let result = store.record_attempt(username, &scenario.id, evaluation.clone(), &body.prompt);
  let (user, warning) = keep_unsaved(&store, username, result)?;
  maybe_auto_backup(&store, &state.settings.export_dir, state.settings.auto_backup_every);
  drop(store);

  let tier = score_tier(evaluation.total_score);
  info!(target: "progress", %username, total = evaluation.total_score, ?tier, "Attempt recorded");
  Ok(SubmitOut {
    tier,
    message: tier.message(),
    user: UserStatsOut::from(&user),
    evaluation,
    warning,
  })
}

/// Clear one user's history. `NotFound` for unknown users.
#[instrument(level = "info", skip(state))]
pub async fn reset_user(state: &AppState, username: &str) -> Result<AccountOut, AppError> {
  let username = required(username, "username")?;
  let mut store = state.store.write().await;
  let result = match store.reset_user(username) {
    Ok(None) => return Err(unknown_user(username)),
    Ok(Some(user)) => Ok(user),
    Err(e) => Err(e),
  };
  let (user, warning) = keep_unsaved(&store, username, result)?;
  warn!(target: "progress", %username, "User data reset");
  Ok(AccountOut { user: UserStatsOut::from(&user), warning })
}

/// Size and modification time of the progress file.
pub async fn file_info(state: &AppState) -> FileInfoOut {
  let store = state.store.read().await;
  let path = store.path();
  let meta = std::fs::metadata(path).ok();
  FileInfoOut {
    path: path.display().to_string(),
    exists: meta.is_some(),
    size_bytes: meta.as_ref().map(|m| m.len()).unwrap_or(0),
    modified: meta
      .and_then(|m| m.modified().ok())
      .map(|t| DateTime::<Local>::from(t).to_rfc3339()),
  }
}
