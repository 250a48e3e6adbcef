//! Runtime settings from the environment, plus the optional TOML agent config
//! (prompt overrides and an extra scenario bank).
//!
//! See `Settings`, `AgentConfig` and `Prompts` for the expected schema.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info, warn};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Which route to the generative model. Selected by `GOOGLE_GENAI_USE_VERTEXAI`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelBackend {
  /// Managed cloud route: Vertex AI project + region. Tokens come from Application
  /// Default Credentials unless `access_token` pins a fixed one.
  Vertex { project: String, location: String, access_token: Option<String> },
  /// Direct route with a literal API key.
  ApiKey { api_key: String },
}

impl ModelBackend {
  pub fn name(&self) -> &'static str {
    match self {
      ModelBackend::Vertex { .. } => "vertex",
      ModelBackend::ApiKey { .. } => "api_key",
    }
  }
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
  pub backend: ModelBackend,
  pub model: String,
  pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub progress_file: PathBuf,
  pub export_dir: PathBuf,
  /// Write a CSV backup whenever the user count is a multiple of this. 0 disables.
  pub auto_backup_every: usize,
  pub model: Option<ModelSettings>,
  pub agent_config_path: Option<PathBuf>,
}

impl Settings {
  pub fn from_env() -> Self {
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  /// Build settings from any key lookup; `from_env` passes the process environment.
  pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
    let port = get("PORT").and_then(|p| p.parse::<u16>().ok()).unwrap_or(3000);
    let progress_file = get("PROGRESS_FILE").map(PathBuf::from).unwrap_or_else(|| "user_progress.json".into());
    let export_dir = get("EXPORT_DIR").map(PathBuf::from).unwrap_or_else(|| ".".into());
    let auto_backup_every = get("AUTO_BACKUP_EVERY").and_then(|v| v.parse().ok()).unwrap_or(5);
    let agent_config_path = get("AGENT_CONFIG_PATH").map(PathBuf::from);

    Self {
      port,
      progress_file,
      export_dir,
      auto_backup_every,
      model: model_settings(&get),
      agent_config_path,
    }
  }
}

fn model_settings(get: &impl Fn(&str) -> Option<String>) -> Option<ModelSettings> {
  let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
  let use_vertex = non_empty("GOOGLE_GENAI_USE_VERTEXAI")
    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
    .unwrap_or(false);

  let backend = if use_vertex {
    match (non_empty("GOOGLE_CLOUD_PROJECT"), non_empty("GOOGLE_CLOUD_LOCATION")) {
      (Some(project), Some(location)) => {
        let access_token = non_empty("GOOGLE_CLOUD_ACCESS_TOKEN");
        if access_token.is_none() {
          info!(target: "promptquest", "Vertex AI tokens will come from Application Default Credentials");
        }
        ModelBackend::Vertex { project, location, access_token }
      }
      (project, location) => {
        error!(
          target: "promptquest",
          has_project = project.is_some(),
          has_location = location.is_some(),
          "GOOGLE_GENAI_USE_VERTEXAI is set but the Vertex AI settings are incomplete"
        );
        return None;
      }
    }
  } else {
    ModelBackend::ApiKey { api_key: non_empty("GOOGLE_API_KEY")? }
  };

  Some(ModelSettings {
    backend,
    model: non_empty("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
    base_url: non_empty("GOOGLE_GENAI_BASE_URL"),
  })
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub scenarios: Vec<ScenarioCfg>,
}

/// Scenario entry accepted in the TOML bank. The id prefix decides the level.
#[derive(Clone, Debug, Deserialize)]
pub struct ScenarioCfg {
  pub id: String,
  pub title: String,
  #[serde(default)] pub description: String,
  pub goal: String,
  #[serde(default)] pub context: String,
  pub product: String,
  #[serde(default)] pub hints: Vec<String>,
  #[serde(default)] pub example_good: String,
}

/// Prompts sent to the model. Any field can be overridden from TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub evaluation_system: String,
  pub evaluation_user_template: String,
  pub scenario_system: String,
  pub scenario_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      evaluation_system: r#"You are an expert prompt engineering evaluator.
Your job is to assess user prompts based on:
1. Clarity (25 points): Is the prompt clear and unambiguous?
2. Specificity (25 points): Does it provide enough context and details?
3. Structure (25 points): Is it well-organized with proper formatting?
4. Task Alignment (25 points): Does it align with the given scenario/goal?

Be constructive but honest. Provide specific examples of what works and what could be improved.
Only return valid JSON with the exact field names requested. Do not include markdown code blocks or any other text."#.into(),
      evaluation_user_template: r#"SCENARIO:
{title}
{description}
Goal: {goal}
Context: {context}
Product: {product}

USER'S PROMPT:
{prompt}

Evaluate this prompt and return ONLY a valid JSON object with these EXACT field names:
{
  "clarity_score": <integer 0-25>,
  "specificity_score": <integer 0-25>,
  "structure_score": <integer 0-25>,
  "task_alignment_score": <integer 0-25>,
  "feedback": "<detailed constructive feedback>",
  "strengths": ["<strength1>", "<strength2>"],
  "improvements": ["<improvement1>", "<improvement2>"]
}

Do not include any text before or after the JSON."#.into(),
      scenario_system: r#"You are an expert Microsoft 365 Copilot trainer and scenario designer.
Your job is to generate realistic, practical training scenarios for prompt engineering practice.

Return the scenario as a JSON object with this EXACT structure:
{
  "id": "<level_prefix><number>",
  "title": "<Clear, specific title>",
  "description": "<2-3 sentence scenario description>",
  "goal": "<What the user needs to accomplish>",
  "context": "<Relevant background information>",
  "product": "<Microsoft 365 product (e.g., 'Excel Copilot', 'Teams Copilot')>",
  "hints": ["<hint1>", "<hint2>", "<hint3>"],
  "example_good": "<Example of a well-crafted prompt for this scenario>"
}

Make scenarios realistic and business-relevant, match the requested difficulty, and focus on real workplace challenges.
Only return valid JSON. Do not include markdown code blocks or any other text."#.into(),
      scenario_user_template: r#"Generate a NEW Microsoft 365 Copilot training scenario for {level_upper} level.

Level requirements:
{level_description}

Here are examples of well-crafted scenarios for this level:
{examples}

Create a unique scenario that is different from the examples, matches the {level} difficulty level,
uses a Microsoft 365 product appropriately and represents a realistic workplace challenge.
Return ONLY the JSON object. Use id prefix "{prefix}" followed by a number (e.g. "{prefix}4")."#.into(),
    }
  }
}

/// Load `AgentConfig` from the given path. On any parsing/IO error, returns None.
pub fn load_agent_config(path: Option<&PathBuf>) -> Option<AgentConfig> {
  let path = path?;
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "promptquest", path = %path.display(), scenarios = cfg.scenarios.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "promptquest", path = %path.display(), error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      warn!(target: "promptquest", path = %path.display(), error = %e, "Failed to read TOML config file");
      None
    }
  }
}
