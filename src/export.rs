//! CSV export of the progress store: one row per attempt, flattened with the
//! owning user's aggregates.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::User;
use crate::error::ExportError;
use crate::progress::round2;
use crate::store::ProgressStore;
use crate::util::truncate_chars;

const FEEDBACK_SUMMARY_CHARS: usize = 100;

#[derive(Debug, Serialize, PartialEq)]
struct ExportRow {
    username: String,
    skill_level: String,
    total_attempts: usize,
    cumulative_score: u64,
    avg_score: f64,
    badges_count: usize,
    badges: String,
    timestamp: String,
    scenario_id: String,
    total_score: u8,
    clarity_score: u8,
    specificity_score: u8,
    structure_score: u8,
    task_alignment_score: u8,
    feedback_summary: String,
    user_prompt: String,
    strengths: String,
    improvements: String,
}

fn rows_for(user: &User) -> Vec<ExportRow> {
    let badges = user.badges.iter().map(|b| b.label()).collect::<Vec<_>>().join(", ");
    let base = |avg_score: f64| ExportRow {
        username: user.username.clone(),
        skill_level: user.skill_level.to_string(),
        total_attempts: user.attempt_count(),
        cumulative_score: user.cumulative_score(),
        avg_score,
        badges_count: user.badges.len(),
        badges: badges.clone(),
        timestamp: String::new(),
        scenario_id: String::new(),
        total_score: 0,
        clarity_score: 0,
        specificity_score: 0,
        structure_score: 0,
        task_alignment_score: 0,
        feedback_summary: String::new(),
        user_prompt: String::new(),
        strengths: String::new(),
        improvements: String::new(),
    };

    if user.history.is_empty() {
        return vec![ExportRow { feedback_summary: "No attempts yet".into(), ..base(0.0) }];
    }

    let avg = round2(user.average_score());
    let mut attempts: Vec<_> = user.history.iter().collect();
    attempts.sort_by_key(|a| a.timestamp);
    attempts
        .into_iter()
        .map(|a| {
            let e = &a.evaluation;
            ExportRow {
                timestamp: a.timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
                scenario_id: a.scenario_id.clone(),
                total_score: e.total_score,
                clarity_score: e.clarity_score,
                specificity_score: e.specificity_score,
                structure_score: e.structure_score,
                task_alignment_score: e.task_alignment_score,
                feedback_summary: truncate_chars(&e.feedback, FEEDBACK_SUMMARY_CHARS),
                user_prompt: a.user_prompt.clone(),
                strengths: e.strengths.join("; "),
                improvements: e.improvements.join("; "),
                ..base(avg)
            }
        })
        .collect()
}

/// Write the CSV to `out`. Returns the number of data rows; 0 means nothing was written.
pub fn export_to_writer<W: Write>(store: &ProgressStore, out: W) -> Result<usize, ExportError> {
    // Users iterate in username order; rows within a user are sorted by timestamp.
    let rows: Vec<ExportRow> = store.users().flat_map(rows_for).collect();
    if rows.is_empty() {
        return Ok(0);
    }
    let mut w = csv::Writer::from_writer(out);
    for row in &rows {
        w.serialize(row)?;
    }
    w.flush()?;
    Ok(rows.len())
}

pub fn default_export_name(prefix: &str) -> String {
    format!("{prefix}_{}.csv", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Write an export file into `dir`. `filename` is reduced to its last path component.
/// Returns `None` when the store holds no users.
#[instrument(level = "info", skip(store), fields(dir = %dir.display()))]
pub fn export_to_file(store: &ProgressStore, dir: &Path, filename: Option<&str>) -> Result<Option<PathBuf>, ExportError> {
    if store.user_count() == 0 {
        return Ok(None);
    }
    let name = filename
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .and_then(|f| Path::new(f).file_name())
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| default_export_name("user_progress_export"));
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);

    let mut buf = Vec::new();
    let rows = export_to_writer(store, &mut buf)?;
    std::fs::write(&path, buf)?;
    info!(target: "progress", path = %path.display(), rows, "Progress exported");
    Ok(Some(path))
}

/// Emergency backup requested from the admin panel.
pub fn emergency_backup(store: &ProgressStore, dir: &Path) -> Result<Option<PathBuf>, ExportError> {
    export_to_file(store, dir, Some(&default_export_name("emergency_backup")))
}

/// Periodic backup: runs when the user count is a positive multiple of `every`.
/// Failures are logged only.
pub fn maybe_auto_backup(store: &ProgressStore, dir: &Path, every: usize) -> Option<PathBuf> {
    let users = store.user_count();
    if every == 0 || users == 0 || users % every != 0 {
        return None;
    }
    match export_to_file(store, dir, None) {
        Ok(path) => {
            if let Some(p) = &path {
                info!(target: "progress", path = %p.display(), users, "Auto-backup created");
            }
            path
        }
        Err(e) => {
            warn!(target: "progress", error = %e, "Auto-backup failed");
            None
        }
    }
}
