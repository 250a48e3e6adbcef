//! Derived progress state as pure functions over an attempt history.
//!
//! Nothing here touches storage: badges, skill level and leaderboard order are
//! recomputed from scratch every time, so the result never depends on call order.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{Attempt, Badge, ScoreTier, SkillLevel};

pub const PERFECT_SCORE: u8 = 100;
pub const CONSISTENT_SCORE_ABOVE: u8 = 80;
pub const CONSISTENT_MIN_ATTEMPTS: usize = 3;
pub const DEDICATED_MIN_ATTEMPTS: usize = 10;
pub const ADVANCED_MASTER_MIN_ATTEMPTS: usize = 5;
pub const ADVANCED_MASTER_AVG_ABOVE: f64 = 85.0;

/// Mean total score; 0.0 for an empty history. Full precision.
pub fn average_score(history: &[Attempt]) -> f64 {
    mean(history.iter().map(Attempt::total_score))
}

fn mean(scores: impl Iterator<Item = u8>) -> f64 {
    let (sum, n) = scores.fold((0u64, 0u64), |(sum, n), s| (sum + u64::from(s), n + 1));
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

pub fn badges(history: &[Attempt]) -> BTreeSet<Badge> {
    let mut out = BTreeSet::new();

    if history.iter().any(|a| a.total_score() == PERFECT_SCORE) {
        out.insert(Badge::PerfectScore);
    }

    let high = history
        .iter()
        .filter(|a| a.total_score() > CONSISTENT_SCORE_ABOVE)
        .count();
    if high >= CONSISTENT_MIN_ATTEMPTS {
        out.insert(Badge::ConsistentPerformer);
    }

    if history.len() >= DEDICATED_MIN_ATTEMPTS {
        out.insert(Badge::DedicatedLearner);
    }

    let advanced: Vec<u8> = history
        .iter()
        .filter(|a| a.scenario_id.starts_with(SkillLevel::Advanced.id_prefix()))
        .map(Attempt::total_score)
        .collect();
    if advanced.len() >= ADVANCED_MASTER_MIN_ATTEMPTS
        && mean(advanced.iter().copied()) > ADVANCED_MASTER_AVG_ABOVE
    {
        out.insert(Badge::AdvancedMaster);
    }

    out
}

pub fn skill_level(history: &[Attempt]) -> SkillLevel {
    let n = history.len();
    let avg = average_score(history);
    if n >= 5 && avg >= 85.0 {
        SkillLevel::Advanced
    } else if n >= 3 && avg >= 70.0 {
        SkillLevel::Intermediate
    } else {
        SkillLevel::Beginner
    }
}

pub fn score_tier(total: u8) -> ScoreTier {
    if total >= 85 {
        ScoreTier::Excellent
    } else if total >= 70 {
        ScoreTier::Good
    } else {
        ScoreTier::NeedsWork
    }
}

/// Round for display and export only.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub average_score: f64,
    pub attempt_count: usize,
    pub skill_level: SkillLevel,
    pub badge_count: usize,
}

/// Total order: average desc, then attempt count desc, then username asc.
pub fn leaderboard_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.average_score
        .total_cmp(&a.average_score)
        .then_with(|| b.attempt_count.cmp(&a.attempt_count))
        .then_with(|| a.username.cmp(&b.username))
}

pub fn rank(mut entries: Vec<LeaderboardEntry>, limit: usize) -> Vec<LeaderboardEntry> {
    entries.sort_by(leaderboard_order);
    entries.truncate(limit);
    entries
}
