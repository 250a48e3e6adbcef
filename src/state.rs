//! Application state: the progress store, the scenario catalog, the optional
//! evaluator, and the scenario selection policy.
//!
//! The catalog holds presets, TOML bank entries and the most recent generated
//! scenarios (cached on creation so later submissions can find them by id).
//! Selection modes:
//!   - preset: random catalog scenario of the level (generated ones excluded)
//!   - ai:     generate via the evaluator; on failure serve a preset
//!   - mixed:  ai with probability `ai_probability`, preset otherwise

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::config::{load_agent_config, ScenarioCfg, Settings};
use crate::domain::{Scenario, ScenarioSource, SkillLevel};
use crate::error::StoreError;
use crate::evaluator::Evaluator;
use crate::gemini::GeminiClient;
use crate::seeds::{fallback_scenario, seed_scenarios};
use crate::store::ProgressStore;

pub const DEFAULT_AI_PROBABILITY: f64 = 0.3;
const MIN_AI_PROBABILITY: f64 = 0.1;
const MAX_AI_PROBABILITY: f64 = 0.9;
/// Generated scenarios kept in the catalog; the oldest is dropped first.
pub const MAX_GENERATED_SCENARIOS: usize = 200;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Preset,
    Ai,
    Mixed,
}

/// Where a served scenario came from.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOrigin {
    Preset,
    Generated,
    /// The model reply was rejected and the evaluator handed back an example.
    Example,
    /// Generation was unavailable or failed; a preset was served instead.
    PresetFallback,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStats {
    pub beginner: usize,
    pub intermediate: usize,
    pub advanced: usize,
    pub total_preset: usize,
    pub generated: usize,
}

/// Scenario stores (by id, by level). Ids per level keep insertion order.
#[derive(Debug, Default)]
pub struct ScenarioCatalog {
    by_id: HashMap<String, Scenario>,
    by_level: BTreeMap<SkillLevel, Vec<String>>,
    /// Generated ids, oldest first.
    generated: VecDeque<String>,
}

impl ScenarioCatalog {
    /// Bank entries first, then built-in presets; presets never overwrite a bank id.
    pub fn build(bank: &[ScenarioCfg]) -> Self {
        let mut catalog = Self::default();
        for cfg in bank {
            match bank_scenario(cfg) {
                Ok(s) => {
                    if catalog.contains(&s.id) {
                        error!(target: "scenario", id = %s.id, "Skipping bank item: duplicate id");
                        continue;
                    }
                    catalog.insert(s);
                }
                Err(reason) => error!(target: "scenario", id = %cfg.id, %reason, "Skipping bank item"),
            }
        }
        for s in seed_scenarios() {
            if !catalog.contains(&s.id) {
                catalog.insert(s);
            }
        }

        let stats = catalog.stats();
        info!(
            target: "scenario",
            beginner = stats.beginner,
            intermediate = stats.intermediate,
            advanced = stats.advanced,
            local_bank = bank.len(),
            "Startup scenario inventory"
        );
        catalog
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.by_id.get(id)
    }

    /// Scenarios whose id has no tier prefix are not indexed by level.
    fn insert(&mut self, s: Scenario) {
        if let Some(level) = s.level() {
            self.by_level.entry(level).or_default().push(s.id.clone());
        }
        self.by_id.insert(s.id.clone(), s);
    }

    fn remove(&mut self, id: &str) {
        let Some(s) = self.by_id.remove(id) else {
            return;
        };
        if let Some(ids) = s.level().and_then(|level| self.by_level.get_mut(&level)) {
            ids.retain(|x| x != id);
        }
    }

    /// Cache a generated scenario, renaming it to the next free `<prefix><n>` on collision.
    pub fn insert_generated(&mut self, mut s: Scenario, level: SkillLevel) -> Scenario {
        if self.contains(&s.id) {
            let prefix = level.id_prefix();
            let free = (1..)
                .map(|n| format!("{prefix}{n}"))
                .find(|id| !self.contains(id))
                .unwrap_or_default();
            info!(target: "scenario", from = %s.id, to = %free, "Generated scenario id collided; renamed");
            s.id = free;
        }
        self.insert(s.clone());
        self.generated.push_back(s.id.clone());
        while self.generated.len() > MAX_GENERATED_SCENARIOS {
            if let Some(old) = self.generated.pop_front() {
                info!(target: "scenario", id = %old, "Generated scenario evicted");
                self.remove(&old);
            }
        }
        s
    }

    pub fn for_level(&self, level: SkillLevel) -> Vec<Scenario> {
        self.by_level
            .get(&level)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    fn presets_for_level(&self, level: SkillLevel) -> Vec<Scenario> {
        self.for_level(level)
            .into_iter()
            .filter(|s| matches!(s.source, ScenarioSource::Preset | ScenarioSource::LocalBank))
            .collect()
    }

    /// Uniform pick among the level's presets; the fallback scenario if there are none.
    pub fn random_preset(&self, level: SkillLevel) -> Scenario {
        self.presets_for_level(level)
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| fallback_scenario(level))
    }

    pub fn stats(&self) -> ScenarioStats {
        let mut stats = ScenarioStats::default();
        for level in SkillLevel::ALL {
            let n = self.presets_for_level(level).len();
            match level {
                SkillLevel::Beginner => stats.beginner = n,
                SkillLevel::Intermediate => stats.intermediate = n,
                SkillLevel::Advanced => stats.advanced = n,
            }
            stats.total_preset += n;
        }
        stats.generated = self.by_id.values().filter(|s| s.source == ScenarioSource::Generated).count();
        stats
    }
}

fn bank_scenario(cfg: &ScenarioCfg) -> Result<Scenario, &'static str> {
    if SkillLevel::from_id_prefix(&cfg.id).is_none() {
        return Err("id must start with b, i or a");
    }
    if [&cfg.title, &cfg.goal, &cfg.product].iter().any(|f| f.trim().is_empty()) {
        return Err("title, goal and product must be non-empty");
    }
    Ok(Scenario {
        id: cfg.id.clone(),
        title: cfg.title.clone(),
        description: cfg.description.clone(),
        goal: cfg.goal.clone(),
        context: cfg.context.clone(),
        product: cfg.product.clone(),
        hints: cfg.hints.clone(),
        example_good: cfg.example_good.clone(),
        source: ScenarioSource::LocalBank,
    })
}

/// Clamp a requested AI share into the supported range.
pub fn clamp_ai_probability(p: Option<f64>) -> f64 {
    match p {
        Some(p) if p.is_finite() => p.clamp(MIN_AI_PROBABILITY, MAX_AI_PROBABILITY),
        _ => DEFAULT_AI_PROBABILITY,
    }
}

pub struct AppState {
    pub store: RwLock<ProgressStore>,
    pub catalog: RwLock<ScenarioCatalog>,
    pub evaluator: Option<Evaluator>,
    pub settings: Settings,
}

impl AppState {
    /// Build state from settings: agent config, scenario catalog, model client, progress file.
    /// A corrupt progress file is fatal.
    #[instrument(level = "info", skip_all)]
    pub fn new(settings: Settings) -> Result<Self, StoreError> {
        let cfg = load_agent_config(settings.agent_config_path.as_ref()).unwrap_or_default();

        let evaluator = match &settings.model {
            Some(model) => match GeminiClient::new(model) {
                Ok(client) => {
                    info!(target: "promptquest", backend = model.backend.name(), model = %model.model, "Evaluation service enabled");
                    Some(Evaluator::new(Arc::new(client), cfg.prompts.clone()))
                }
                Err(e) => {
                    error!(target: "promptquest", error = %e, "Failed to build the model client; evaluation disabled");
                    None
                }
            },
            None => {
                warn!(target: "promptquest", "No model credentials configured; evaluation disabled and scenarios limited to presets");
                None
            }
        };

        let store = ProgressStore::load(&settings.progress_file)?;
        Ok(Self::from_parts(settings, store, evaluator, &cfg.scenarios))
    }

    pub fn from_parts(settings: Settings, store: ProgressStore, evaluator: Option<Evaluator>, bank: &[ScenarioCfg]) -> Self {
        Self {
            store: RwLock::new(store),
            catalog: RwLock::new(ScenarioCatalog::build(bank)),
            evaluator,
            settings,
        }
    }

    /// `None` when evaluation is disabled.
    pub fn evaluator_description(&self) -> Option<String> {
        self.evaluator.as_ref().map(Evaluator::describe)
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_scenario(&self, id: &str) -> Option<Scenario> {
        self.catalog.read().await.get(id).cloned()
    }

    pub async fn scenarios_for_level(&self, level: SkillLevel) -> Vec<Scenario> {
        self.catalog.read().await.for_level(level)
    }

    pub async fn scenario_stats(&self) -> ScenarioStats {
        self.catalog.read().await.stats()
    }

    /// Selection policy; never fails. Generation problems degrade to a preset.
    #[instrument(level = "info", skip(self), fields(%level))]
    pub async fn choose_scenario(
        &self,
        level: SkillLevel,
        mode: GenerationMode,
        ai_probability: Option<f64>,
    ) -> (Scenario, ScenarioOrigin) {
        let use_ai = match mode {
            GenerationMode::Preset => false,
            GenerationMode::Ai => true,
            GenerationMode::Mixed => rand::thread_rng().gen_bool(clamp_ai_probability(ai_probability)),
        };
        if use_ai {
            if let Some(picked) = self.generate(level).await {
                return picked;
            }
            let s = self.catalog.read().await.random_preset(level);
            warn!(target: "scenario", %level, chosen = %s.id, "Serving preset instead of a generated scenario");
            return (s, ScenarioOrigin::PresetFallback);
        }

        let s = self.catalog.read().await.random_preset(level);
        info!(target: "scenario", %level, chosen = %s.id, "Preset scenario served");
        (s, ScenarioOrigin::Preset)
    }

    async fn generate(&self, level: SkillLevel) -> Option<(Scenario, ScenarioOrigin)> {
        let Some(evaluator) = &self.evaluator else {
            warn!(target: "scenario", %level, "Scenario generation requested but evaluation service is disabled");
            return None;
        };
        let examples = self.catalog.read().await.presets_for_level(level);
        match evaluator.generate_scenario(level, &examples).await {
            Ok(s) if s.source == ScenarioSource::Generated => {
                let s = self.catalog.write().await.insert_generated(s, level);
                info!(target: "scenario", %level, chosen = %s.id, "Generated scenario cached");
                Some((s, ScenarioOrigin::Generated))
            }
            Ok(s) => Some((s, ScenarioOrigin::Example)),
            Err(e) => {
                error!(target: "scenario", %level, error = %e, "Scenario generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::error::EvaluatorError;
    use crate::evaluator::tests::ScriptedClient;
    use std::path::Path;

    pub(crate) fn test_settings(dir: &Path) -> Settings {
        Settings {
            port: 0,
            progress_file: dir.join("user_progress.json"),
            export_dir: dir.join("exports"),
            auto_backup_every: 0,
            model: None,
            agent_config_path: None,
        }
    }

    pub(crate) fn test_state(dir: &Path, replies: Option<Vec<Result<String, EvaluatorError>>>) -> AppState {
        let settings = test_settings(dir);
        let store = ProgressStore::empty(&settings.progress_file);
        let evaluator =
            replies.map(|r| Evaluator::new(Arc::new(ScriptedClient::new(r)), Prompts::default()));
        AppState::from_parts(settings, store, evaluator, &[])
    }

    const GENERATED_B1: &str = r#"{"id":"b1","title":"Tidy a OneNote notebook","description":"Your notes are scattered.",
        "goal":"Organize sections","context":"Team notebook","product":"OneNote Copilot",
        "hints":["Name the sections"],"example_good":"Reorganize..."}"#;

    fn cfg(id: &str, title: &str) -> ScenarioCfg {
        ScenarioCfg {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            goal: "g".into(),
            context: String::new(),
            product: "Word Copilot".into(),
            hints: vec![],
            example_good: String::new(),
        }
    }

    #[test]
    fn catalog_has_three_presets_per_level() {
        let c = ScenarioCatalog::build(&[]);
        let stats = c.stats();
        assert_eq!((stats.beginner, stats.intermediate, stats.advanced), (3, 3, 3));
        assert_eq!(stats.total_preset, 9);
        assert_eq!(c.for_level(SkillLevel::Advanced)[0].id, "a1");
    }

    #[test]
    fn bank_entries_are_validated_and_win_over_presets() {
        let c = ScenarioCatalog::build(&[cfg("b1", "Bank b1"), cfg("x1", "Bad tier"), cfg("i9", ""), cfg("a4", "Extra")]);
        assert_eq!(c.get("b1").unwrap().title, "Bank b1");
        assert_eq!(c.get("b1").unwrap().source, ScenarioSource::LocalBank);
        assert!(!c.contains("x1"));
        assert!(!c.contains("i9"));
        assert_eq!(c.stats().advanced, 4);
        assert_eq!(c.stats().beginner, 3);
    }

    #[test]
    fn colliding_generated_id_gets_next_free_number() {
        let mut c = ScenarioCatalog::build(&[]);
        let s = Scenario { source: ScenarioSource::Generated, ..c.get("b2").unwrap().clone() };
        let stored = c.insert_generated(s, SkillLevel::Beginner);
        assert_eq!(stored.id, "b4");
        assert!(c.contains("b4"));
        assert_eq!(c.stats().generated, 1);
        assert_eq!(c.stats().beginner, 3);
    }

    #[test]
    fn generated_scenarios_are_capped_oldest_first() {
        let mut c = ScenarioCatalog::build(&[]);
        let template = Scenario { source: ScenarioSource::Generated, ..c.get("i1").unwrap().clone() };
        let mut ids = Vec::new();
        for _ in 0..=MAX_GENERATED_SCENARIOS {
            ids.push(c.insert_generated(template.clone(), SkillLevel::Intermediate).id);
        }
        let stats = c.stats();
        assert_eq!(stats.generated, MAX_GENERATED_SCENARIOS);
        assert_eq!(stats.intermediate, 3);
        assert!(!c.contains(&ids[0]));
        assert!(c.contains(&ids[MAX_GENERATED_SCENARIOS]));
        assert!(c.contains("i1"));
        assert_eq!(c.for_level(SkillLevel::Intermediate).len(), 3 + MAX_GENERATED_SCENARIOS);
    }

    #[test]
    fn ai_probability_is_clamped() {
        assert_eq!(clamp_ai_probability(None), 0.3);
        assert_eq!(clamp_ai_probability(Some(0.0)), 0.1);
        assert_eq!(clamp_ai_probability(Some(1.0)), 0.9);
        assert_eq!(clamp_ai_probability(Some(0.5)), 0.5);
        assert_eq!(clamp_ai_probability(Some(f64::NAN)), 0.3);
    }

    #[tokio::test]
    async fn preset_mode_serves_the_requested_level() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), None);
        for _ in 0..10 {
            let (s, origin) = state.choose_scenario(SkillLevel::Intermediate, GenerationMode::Preset, None).await;
            assert_eq!(s.level(), Some(SkillLevel::Intermediate));
            assert_eq!(origin, ScenarioOrigin::Preset);
        }
    }

    #[tokio::test]
    async fn ai_mode_without_evaluator_falls_back_to_preset() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), None);
        let (s, origin) = state.choose_scenario(SkillLevel::Advanced, GenerationMode::Ai, None).await;
        assert_eq!(origin, ScenarioOrigin::PresetFallback);
        assert_eq!(s.source, ScenarioSource::Preset);
    }

    #[tokio::test]
    async fn ai_mode_service_error_falls_back_to_preset() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Some(vec![Err(EvaluatorError::Transport("down".into()))]));
        let (s, origin) = state.choose_scenario(SkillLevel::Beginner, GenerationMode::Ai, None).await;
        assert_eq!(origin, ScenarioOrigin::PresetFallback);
        assert_eq!(s.level(), Some(SkillLevel::Beginner));
    }

    #[tokio::test]
    async fn generated_scenario_is_cached_under_a_free_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), Some(vec![Ok(GENERATED_B1.into())]));
        let (s, origin) = state.choose_scenario(SkillLevel::Beginner, GenerationMode::Ai, None).await;
        assert_eq!(origin, ScenarioOrigin::Generated);
        assert_eq!(s.id, "b4");
        assert_eq!(state.get_scenario("b4").await.unwrap().title, "Tidy a OneNote notebook");
        assert_eq!(state.get_scenario("b1").await.unwrap().source, ScenarioSource::Preset);
    }
}
