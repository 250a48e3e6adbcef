//! Domain models: skill levels, scenarios, evaluations, attempts, users and badges.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Skill tier. Used both for a user's level and for a scenario's difficulty.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

impl SkillLevel {
  pub const ALL: [SkillLevel; 3] = [SkillLevel::Beginner, SkillLevel::Intermediate, SkillLevel::Advanced];

  /// First character of every scenario id of this tier.
  pub fn id_prefix(self) -> char {
    match self {
      SkillLevel::Beginner => 'b',
      SkillLevel::Intermediate => 'i',
      SkillLevel::Advanced => 'a',
    }
  }

  pub fn from_id_prefix(id: &str) -> Option<Self> {
    match id.chars().next()? {
      'b' => Some(SkillLevel::Beginner),
      'i' => Some(SkillLevel::Intermediate),
      'a' => Some(SkillLevel::Advanced),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      SkillLevel::Beginner => "beginner",
      SkillLevel::Intermediate => "intermediate",
      SkillLevel::Advanced => "advanced",
    }
  }

  /// Difficulty description handed to the model when generating scenarios.
  pub fn description(self) -> &'static str {
    match self {
      SkillLevel::Beginner => "Simple, single-task scenarios requiring basic prompts. Focus on one Microsoft 365 product with straightforward goals.",
      SkillLevel::Intermediate => "Multi-step scenarios requiring more detailed prompts. May involve data analysis, content creation, or coordination across products.",
      SkillLevel::Advanced => "Complex scenarios requiring sophisticated prompts. Often involve strategic thinking, multiple products, automation, or enterprise-level challenges.",
    }
  }
}

impl fmt::Display for SkillLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for SkillLevel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "beginner" => Ok(SkillLevel::Beginner),
      "intermediate" => Ok(SkillLevel::Intermediate),
      "advanced" => Ok(SkillLevel::Advanced),
      other => Err(format!("unknown skill level '{other}'")),
    }
  }
}

/// Where did a scenario come from?
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioSource {
  #[default]
  Preset,     // built-in seeds
  LocalBank,  // from the TOML agent config
  Generated,  // generated by the model and cached in memory
  Fallback,   // canned scenario used when nothing else is available
}

/// A practice task. Never mutated once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
  pub id: String,
  pub title: String,
  pub description: String,
  pub goal: String,
  pub context: String,
  pub product: String,
  pub hints: Vec<String>,
  pub example_good: String,
  #[serde(default)]
  pub source: ScenarioSource,
}

impl Scenario {
  /// Tier derived from the id prefix.
  pub fn level(&self) -> Option<SkillLevel> {
    SkillLevel::from_id_prefix(&self.id)
  }
}

/// Highest value of each evaluation dimension.
pub const MAX_SUB_SCORE: u8 = 25;

/// Scored outcome of one submission.
///
/// `total_score` is always the sum of the four sub-scores; it is computed here and
/// recomputed when reading from disk, never taken from the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "EvaluationRecord")]
pub struct Evaluation {
  pub clarity_score: u8,
  pub specificity_score: u8,
  pub structure_score: u8,
  pub task_alignment_score: u8,
  pub total_score: u8,
  pub feedback: String,
  #[serde(default)]
  pub strengths: Vec<String>,
  #[serde(default)]
  pub improvements: Vec<String>,
}

impl Evaluation {
  /// Sub-scores above 25 are clamped.
  pub fn new(
    clarity: u8,
    specificity: u8,
    structure: u8,
    task_alignment: u8,
    feedback: impl Into<String>,
    strengths: Vec<String>,
    improvements: Vec<String>,
  ) -> Self {
    let clarity_score = clarity.min(MAX_SUB_SCORE);
    let specificity_score = specificity.min(MAX_SUB_SCORE);
    let structure_score = structure.min(MAX_SUB_SCORE);
    let task_alignment_score = task_alignment.min(MAX_SUB_SCORE);
    Self {
      clarity_score,
      specificity_score,
      structure_score,
      task_alignment_score,
      total_score: clarity_score + specificity_score + structure_score + task_alignment_score,
      feedback: feedback.into(),
      strengths,
      improvements,
    }
  }
}

/// On-disk shape of an evaluation. Older files carry a model-reported total which is ignored,
/// and may hold fractional sub-scores such as `18.5`.
#[derive(Deserialize)]
struct EvaluationRecord {
  #[serde(default)] clarity_score: f64,
  #[serde(default)] specificity_score: f64,
  #[serde(default)] structure_score: f64,
  #[serde(default)] task_alignment_score: f64,
  #[serde(default)] feedback: String,
  #[serde(default)] strengths: Vec<String>,
  #[serde(default)] improvements: Vec<String>,
}

/// Round a stored sub-score to the nearest integer in 0..=25.
fn stored_sub_score(v: f64) -> u8 {
  if !v.is_finite() {
    return 0;
  }
  v.round().clamp(0.0, f64::from(MAX_SUB_SCORE)) as u8
}

impl From<EvaluationRecord> for Evaluation {
  fn from(r: EvaluationRecord) -> Self {
    Evaluation::new(
      stored_sub_score(r.clarity_score),
      stored_sub_score(r.specificity_score),
      stored_sub_score(r.structure_score),
      stored_sub_score(r.task_alignment_score),
      r.feedback,
      r.strengths,
      r.improvements,
    )
  }
}

/// One scored submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
  pub timestamp: NaiveDateTime,
  /// Weak reference: the scenario may no longer be in the catalog.
  pub scenario_id: String,
  #[serde(default)]
  pub user_prompt: String,
  pub evaluation: Evaluation,
}

impl Attempt {
  pub fn total_score(&self) -> u8 {
    self.evaluation.total_score
  }
}

/// Achievement derived from attempt history. Ordered as displayed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Badge {
  #[serde(rename = "Perfect Score")]
  PerfectScore,
  #[serde(rename = "Consistent Performer")]
  ConsistentPerformer,
  #[serde(rename = "Dedicated Learner")]
  DedicatedLearner,
  #[serde(rename = "Advanced Master")]
  AdvancedMaster,
}

impl Badge {
  pub fn label(self) -> &'static str {
    match self {
      Badge::PerfectScore => "Perfect Score",
      Badge::ConsistentPerformer => "Consistent Performer",
      Badge::DedicatedLearner => "Dedicated Learner",
      Badge::AdvancedMaster => "Advanced Master",
    }
  }
}

impl fmt::Display for Badge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// A trainee. `skill_level` and `badges` are pure functions of `history`; see
/// [`User::recompute`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
  #[serde(skip)]
  pub username: String,
  #[serde(default)]
  pub skill_level: SkillLevel,
  #[serde(default)]
  pub badges: BTreeSet<Badge>,
  #[serde(default)]
  pub history: Vec<Attempt>,
}

impl User {
  pub fn new(username: impl Into<String>) -> Self {
    Self {
      username: username.into(),
      skill_level: SkillLevel::Beginner,
      badges: BTreeSet::new(),
      history: Vec::new(),
    }
  }

  /// Re-derive badges and skill level from the full history.
  pub fn recompute(&mut self) {
    self.badges = crate::progress::badges(&self.history);
    self.skill_level = crate::progress::skill_level(&self.history);
  }

  pub fn attempt_count(&self) -> usize {
    self.history.len()
  }

  pub fn cumulative_score(&self) -> u64 {
    self.history.iter().map(|a| u64::from(a.total_score())).sum()
  }

  pub fn average_score(&self) -> f64 {
    crate::progress::average_score(&self.history)
  }
}

/// Feedback band for a single total score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
  Excellent,
  Good,
  NeedsWork,
}

impl ScoreTier {
  pub fn message(self) -> &'static str {
    match self {
      ScoreTier::Excellent => "Excellent!",
      ScoreTier::Good => "Good job!",
      ScoreTier::NeedsWork => "Keep practicing!",
    }
  }
}
