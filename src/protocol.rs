//! Public HTTP request/response structs (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Attempt, Badge, Evaluation, Scenario, ScoreTier, SkillLevel, User};
use crate::progress::round2;
use crate::state::{GenerationMode, ScenarioOrigin};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    /// Model description, or null when evaluation is disabled.
    pub evaluator: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub username: String,
}

/// Dashboard numbers for one user.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsOut {
    pub username: String,
    pub skill_level: SkillLevel,
    pub total_attempts: usize,
    pub average_score: f64,
    pub cumulative_score: u64,
    pub best_score: u8,
    pub badges: Vec<Badge>,
}

impl From<&User> for UserStatsOut {
    fn from(u: &User) -> Self {
        Self {
            username: u.username.clone(),
            skill_level: u.skill_level,
            total_attempts: u.attempt_count(),
            average_score: round2(u.average_score()),
            cumulative_score: u.cumulative_score(),
            best_score: u.history.iter().map(Attempt::total_score).max().unwrap_or(0),
            badges: u.badges.iter().copied().collect(),
        }
    }
}

/// Stats after a login or reset, with a warning when the change was not saved to disk.
#[derive(Debug, Serialize)]
pub struct AccountOut {
    #[serde(flatten)]
    pub user: UserStatsOut,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOut {
    pub timestamp: String,
    pub scenario_id: String,
    pub user_prompt: String,
    pub evaluation: Evaluation,
}

impl From<&Attempt> for AttemptOut {
    fn from(a: &Attempt) -> Self {
        Self {
            timestamp: a.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            scenario_id: a.scenario_id.clone(),
            user_prompt: a.user_prompt.clone(),
            evaluation: a.evaluation.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    #[serde(default)]
    pub level: SkillLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioQuery {
    #[serde(default)]
    pub level: SkillLevel,
    #[serde(default)]
    pub mode: GenerationMode,
    pub ai_probability: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioOut {
    pub scenario: Scenario,
    pub level: SkillLevel,
    pub origin: ScenarioOrigin,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIn {
    pub username: String,
    pub scenario_id: String,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitOut {
    pub evaluation: Evaluation,
    pub tier: ScoreTier,
    pub message: &'static str,
    pub user: UserStatsOut,
    /// Set when the attempt was scored but could not be saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportIn {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportOut {
    pub exported: bool,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadOut {
    pub users: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoOut {
    pub path: String,
    pub exists: bool,
    pub size_bytes: u64,
    /// RFC 3339, local time.
    pub modified: Option<String>,
}
