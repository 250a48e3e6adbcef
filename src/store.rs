//! JSON-file-backed progress store.
//!
//! The whole document is held in memory and rewritten after every mutation
//! (temp file + rename). A failed write leaves memory ahead of disk until the
//! next successful save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::{Attempt, Evaluation, User};
use crate::error::StoreError;
use crate::progress::{self, round2, LeaderboardEntry};

/// On-disk document. Unknown keys (e.g. an old `leaderboard` array) are ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: BTreeMap<String, User>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub total_users: usize,
    pub active_users: usize,
    pub total_attempts: usize,
    pub avg_score_all_users: f64,
    pub leaderboard_size: usize,
}

#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    users: BTreeMap<String, User>,
}

impl ProgressStore {
    /// Empty store bound to `path`; nothing is written until the first mutation.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), users: BTreeMap::new() }
    }

    /// Missing file: empty store. Malformed file: `StoreError::Corrupt`.
    #[instrument(level = "info", fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self, StoreError> {
        let mut store = Self::empty(path.as_ref());
        store.users = read_users(&store.path)?;
        info!(target: "progress", users = store.users.len(), "Progress store loaded");
        Ok(store)
    }

    /// Replace memory with the file contents (admin refresh).
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.users = read_users(&self.path)?;
        info!(target: "progress", users = self.users.len(), "Progress store reloaded");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole store: temp file first, then rename over the target.
    pub fn save(&self) -> Result<(), StoreError> {
        let persistence = |reason: String| StoreError::Persistence { path: self.path.clone(), reason };

        let doc = StoreFile { users: self.users.clone() };
        let json = serde_json::to_string_pretty(&doc).map_err(|e| persistence(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;
        }
        let tmp = tmp_path(&self.path);
        if let Err(e) = std::fs::write(&tmp, json).and_then(|_| std::fs::rename(&tmp, &self.path)) {
            let _ = std::fs::remove_file(&tmp);
            warn!(target: "progress", path = %self.path.display(), error = %e, "Failed to persist progress");
            return Err(persistence(e.to_string()));
        }
        Ok(())
    }

    /// The persisted document as JSON.
    pub fn raw_json(&self) -> serde_json::Value {
        serde_json::to_value(StoreFile { users: self.users.clone() }).unwrap_or_default()
    }

    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Login: create the user if needed and persist.
    #[instrument(level = "info", skip(self))]
    pub fn ensure_user(&mut self, username: &str) -> Result<User, StoreError> {
        if let Some(u) = self.users.get(username) {
            return Ok(u.clone());
        }
        let user = User::new(username);
        self.users.insert(username.to_string(), user.clone());
        info!(target: "progress", %username, "New user created");
        self.save()?;
        Ok(user)
    }

    pub fn record_attempt(
        &mut self,
        username: &str,
        scenario_id: &str,
        evaluation: Evaluation,
        prompt_text: &str,
    ) -> Result<User, StoreError> {
        self.record_attempt_at(username, scenario_id, evaluation, prompt_text, Local::now().naive_local())
    }

    /// Append an attempt, recompute derived state, persist. On a failed write the
    /// attempt stays in memory and `StoreError::Persistence` is returned.
    #[instrument(level = "info", skip(self, evaluation, prompt_text), fields(total = evaluation.total_score))]
    pub fn record_attempt_at(
        &mut self,
        username: &str,
        scenario_id: &str,
        evaluation: Evaluation,
        prompt_text: &str,
        timestamp: NaiveDateTime,
    ) -> Result<User, StoreError> {
        let user = self
            .users
            .entry(username.to_string())
            .or_insert_with(|| User::new(username));
        user.history.push(Attempt {
            timestamp,
            scenario_id: scenario_id.to_string(),
            user_prompt: prompt_text.to_string(),
            evaluation,
        });
        let before = (user.skill_level, user.badges.len());
        user.recompute();
        if before != (user.skill_level, user.badges.len()) {
            info!(target: "progress", %username, skill_level = %user.skill_level, badges = user.badges.len(), "Progress changed");
        }
        let snapshot = user.clone();
        self.save()?;
        Ok(snapshot)
    }

    /// Explicit data reset for one user: history cleared, derived state recomputed.
    #[instrument(level = "info", skip(self))]
    pub fn reset_user(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        let Some(user) = self.users.get_mut(username) else {
            return Ok(None);
        };
        user.history.clear();
        user.recompute();
        let snapshot = user.clone();
        self.save()?;
        Ok(Some(snapshot))
    }

    fn entries(&self) -> Vec<LeaderboardEntry> {
        self.users
            .values()
            .filter(|u| !u.history.is_empty())
            .map(|u| LeaderboardEntry {
                username: u.username.clone(),
                average_score: u.average_score(),
                attempt_count: u.attempt_count(),
                skill_level: u.skill_level,
                badge_count: u.badges.len(),
            })
            .collect()
    }

    /// Users with at least one attempt, best first.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        progress::rank(self.entries(), limit)
    }

    pub fn export_summary(&self) -> ExportSummary {
        let total_attempts: usize = self.users.values().map(User::attempt_count).sum();
        let total_score: u64 = self.users.values().map(User::cumulative_score).sum();
        let active_users = self.users.values().filter(|u| !u.history.is_empty()).count();
        ExportSummary {
            total_users: self.users.len(),
            active_users,
            total_attempts,
            avg_score_all_users: if total_attempts == 0 {
                0.0
            } else {
                round2(total_score as f64 / total_attempts as f64)
            },
            leaderboard_size: active_users,
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_users(path: &Path) -> Result<BTreeMap<String, User>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(target: "progress", path = %path.display(), "No progress file yet; starting empty");
            return Ok(BTreeMap::new());
        }
        Err(source) => return Err(StoreError::Read { path: path.to_path_buf(), source }),
    };
    let doc: StoreFile = serde_json::from_str(&contents)
        .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })?;

    let mut users = doc.users;
    for (name, user) in users.iter_mut() {
        user.username = name.clone();
        user.recompute();
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Badge, SkillLevel};
    use crate::progress::tests::attempt;

    fn eval(score: u8) -> Evaluation {
        attempt("b1", score).evaluation
    }

    fn store_in(dir: &tempfile::TempDir) -> ProgressStore {
        ProgressStore::load(dir.path().join("progress.json")).unwrap()
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.user_count(), 0);
        assert!(store.leaderboard(10).is_empty());
    }

    #[test]
    fn invalid_json_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ProgressStore::load(&path), Err(StoreError::Corrupt { .. })));

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(ProgressStore::load(&path), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn record_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        for score in [70, 75, 72] {
            store.record_attempt("alice", "b1", eval(score), "Summarize the thread").unwrap();
        }
        let user = store.user("alice").unwrap();
        assert_eq!(user.skill_level, SkillLevel::Intermediate);
        assert!(!dir.path().join("progress.json.tmp").exists());

        let reloaded = store_in(&dir);
        let u = reloaded.user("alice").unwrap();
        assert_eq!(u.username, "alice");
        assert_eq!(u.attempt_count(), 3);
        assert_eq!(u.skill_level, SkillLevel::Intermediate);
        assert_eq!(u.history[0].user_prompt, "Summarize the thread");
    }

    #[test]
    fn first_submission_creates_beginner() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let u = store.record_attempt("bob", "i1", eval(100), "x").unwrap();
        assert_eq!(u.skill_level, SkillLevel::Beginner);
        assert!(u.badges.contains(&Badge::PerfectScore));
        let u = store.record_attempt("bob", "i1", eval(100), "x").unwrap();
        assert_eq!(u.skill_level, SkillLevel::Beginner);
    }

    #[test]
    fn dedicated_learner_arrives_with_tenth_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        for i in 1..=10 {
            let u = store.record_attempt("carol", "b2", eval(40), "p").unwrap();
            assert_eq!(u.badges.contains(&Badge::DedicatedLearner), i == 10, "attempt {i}");
        }
    }

    #[test]
    fn ensure_user_is_idempotent_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.ensure_user("dana").unwrap();
        store.record_attempt("dana", "b1", eval(50), "p").unwrap();
        let again = store.ensure_user("dana").unwrap();
        assert_eq!(again.attempt_count(), 1);
        assert!(store_in(&dir).user("dana").is_some());
    }

    #[test]
    fn legacy_document_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{
              "users": {
                "erin": {
                  "total_score": 160, "attempts": 2, "skill_level": "advanced", "badges": [],
                  "history": [
                    {"timestamp": "2025-03-01T10:15:30.123456", "scenario_id": "a1", "score": 100,
                     "evaluation": {"clarity_score": 25, "specificity_score": 25, "structure_score": 25,
                                    "task_alignment_score": 25, "total_score": 100, "feedback": "great",
                                    "strengths": ["clear"], "improvements": []}},
                    {"timestamp": "2025-03-02T08:00:00", "scenario_id": "b1", "score": 60,
                     "evaluation": {"clarity_score": 15, "specificity_score": 15, "structure_score": 15,
                                    "task_alignment_score": 15, "total_score": 60, "feedback": "ok"}}
                  ]
                }
              },
              "leaderboard": [{"username": "erin", "avg_score": 80.0}]
            }"#,
        )
        .unwrap();
        let store = ProgressStore::load(&path).unwrap();
        let u = store.user("erin").unwrap();
        assert_eq!(u.history[1].user_prompt, "");
        // Derived state comes from history, not from the stored fields.
        assert_eq!(u.skill_level, SkillLevel::Beginner);
        assert!(u.badges.contains(&Badge::PerfectScore));
        assert_eq!(u.cumulative_score(), 160);
    }

    #[test]
    fn legacy_fractional_sub_scores_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"users": {"finn": {"skill_level": "beginner", "badges": [], "history": [
                {"timestamp": "2025-04-01T09:30:00", "scenario_id": "i1",
                 "evaluation": {"clarity_score": 20.0, "specificity_score": 18.5, "structure_score": 15,
                                "task_alignment_score": 22.4, "total_score": 75.9, "feedback": "fine"}}
            ]}}}"#,
        )
        .unwrap();
        let store = ProgressStore::load(&path).unwrap();
        let e = &store.user("finn").unwrap().history[0].evaluation;
        assert_eq!((e.clarity_score, e.specificity_score, e.structure_score, e.task_alignment_score), (20, 19, 15, 22));
        assert_eq!(e.total_score, 76);
    }

    #[test]
    fn failed_write_keeps_memory_ahead_of_disk() {
        let dir = tempfile::tempdir().unwrap();
        // The store path is a directory, so the rename cannot succeed.
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();
        let mut store = ProgressStore::empty(&path);

        let err = store.record_attempt("finn", "b1", eval(90), "p").unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        assert_eq!(store.user("finn").unwrap().attempt_count(), 1);
        assert!(!dir.path().join("occupied.tmp").exists());
    }

    #[test]
    fn leaderboard_skips_idle_users_and_breaks_ties() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.ensure_user("idle").unwrap();
        store.record_attempt("zed", "b1", eval(80), "p").unwrap();
        store.record_attempt("amy", "b1", eval(80), "p").unwrap();
        store.record_attempt("kim", "b1", eval(80), "p").unwrap();
        store.record_attempt("kim", "b1", eval(80), "p").unwrap();
        store.record_attempt("top", "b1", eval(95), "p").unwrap();

        let board = store.leaderboard(10);
        let names: Vec<&str> = board.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["top", "kim", "amy", "zed"]);
        assert_eq!(store.leaderboard(10), board);
        assert_eq!(store.leaderboard(2).len(), 2);
    }

    #[test]
    fn reset_clears_history_and_badges() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.record_attempt("gus", "a1", eval(100), "p").unwrap();
        let u = store.reset_user("gus").unwrap().unwrap();
        assert_eq!(u.attempt_count(), 0);
        assert!(u.badges.is_empty());
        assert!(store.reset_user("nobody").unwrap().is_none());
    }

    #[test]
    fn summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.ensure_user("idle").unwrap();
        store.record_attempt("a", "b1", eval(70), "p").unwrap();
        store.record_attempt("a", "b1", eval(75), "p").unwrap();
        store.record_attempt("b", "b1", eval(72), "p").unwrap();
        let s = store.export_summary();
        assert_eq!(s.total_users, 3);
        assert_eq!(s.active_users, 2);
        assert_eq!(s.total_attempts, 3);
        assert_eq!(s.avg_score_all_users, 72.33);
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = store_in(&dir);
        let mut b = store_in(&dir);
        a.record_attempt("hal", "b1", eval(60), "p").unwrap();
        assert!(b.user("hal").is_none());
        b.reload().unwrap();
        assert_eq!(b.user("hal").unwrap().attempt_count(), 1);
    }
}
