//! Minimal Gemini client for our use-cases.
//!
//! We only call `generateContent` and ask for a JSON reply. Two routes are supported:
//! Vertex AI (project + region, OAuth bearer token) and the Generative Language API (API key).
//! Vertex tokens come from Application Default Credentials per request, unless a
//! fixed token is configured.
//! Calls are instrumented and log model names, latencies, and token usage (not contents).
//!
//! NOTE: We never log credentials and we keep payload previews short to avoid PII leaks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument};

use crate::config::{ModelBackend, ModelSettings};
use crate::error::EvaluatorError;
use crate::util::trunc_for_log;

const GENERATIVE_LANGUAGE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// One text-generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateRequest {
  pub system: String,
  pub user: String,
  pub temperature: f32,
  pub max_output_tokens: u32,
}

/// Seam between the evaluator and the network.
#[async_trait]
pub trait ModelClient: Send + Sync {
  /// Return the raw text of the model reply.
  async fn generate(&self, req: &GenerateRequest) -> Result<String, EvaluatorError>;

  /// Short description for logs and the health endpoint.
  fn describe(&self) -> String;
}

/// How each request is authenticated.
#[derive(Clone)]
enum Credentials {
  ApiKey(String),
  /// Fixed bearer token from the environment; never refreshed.
  StaticToken(String),
  /// Application Default Credentials. The provider is resolved on first use and
  /// caches and refreshes tokens itself.
  Adc(Arc<OnceCell<Arc<dyn TokenProvider>>>),
}

impl Credentials {
  fn for_backend(backend: &ModelBackend) -> Self {
    match backend {
      ModelBackend::ApiKey { api_key } => Credentials::ApiKey(api_key.clone()),
      ModelBackend::Vertex { access_token: Some(token), .. } => Credentials::StaticToken(token.clone()),
      ModelBackend::Vertex { access_token: None, .. } => Credentials::Adc(Arc::new(OnceCell::new())),
    }
  }

  async fn apply(&self, builder: RequestBuilder) -> Result<RequestBuilder, EvaluatorError> {
    match self {
      Credentials::ApiKey(key) => Ok(builder.header("x-goog-api-key", key)),
      Credentials::StaticToken(token) => Ok(builder.bearer_auth(token)),
      Credentials::Adc(cell) => {
        let provider = cell.get_or_try_init(gcp_auth::provider).await.map_err(auth_error)?;
        let token = provider.token(&[CLOUD_PLATFORM_SCOPE]).await.map_err(auth_error)?;
        Ok(builder.bearer_auth(token.as_str()))
      }
    }
  }
}

fn auth_error(e: gcp_auth::Error) -> EvaluatorError {
  error!(error = %e, "Could not obtain a Google Cloud access token");
  EvaluatorError::Auth(e.to_string())
}

#[derive(Clone)]
pub struct GeminiClient {
  client: reqwest::Client,
  backend: ModelBackend,
  credentials: Credentials,
  model: String,
  url: String,
}

impl GeminiClient {
  pub fn new(settings: &ModelSettings) -> Result<Self, EvaluatorError> {
    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| EvaluatorError::Transport(e.to_string()))?;
    let url = endpoint(settings);
    Ok(Self {
      client,
      credentials: Credentials::for_backend(&settings.backend),
      backend: settings.backend.clone(),
      model: settings.model.clone(),
      url,
    })
  }
}

/// Full `generateContent` URL for the configured route.
fn endpoint(settings: &ModelSettings) -> String {
  match &settings.backend {
    ModelBackend::Vertex { project, location, .. } => {
      let base = settings
        .base_url
        .clone()
        .unwrap_or_else(|| format!("https://{location}-aiplatform.googleapis.com/v1"));
      format!(
        "{base}/projects/{project}/locations/{location}/publishers/google/models/{}:generateContent",
        settings.model
      )
    }
    ModelBackend::ApiKey { .. } => {
      let base = settings.base_url.clone().unwrap_or_else(|| GENERATIVE_LANGUAGE_URL.into());
      format!("{base}/models/{}:generateContent", settings.model)
    }
  }
}

#[async_trait]
impl ModelClient for GeminiClient {
  #[instrument(level = "info", skip(self, req), fields(model = %self.model, backend = self.backend.name(), user_len = req.user.len()))]
  async fn generate(&self, req: &GenerateRequest) -> Result<String, EvaluatorError> {
    let body = GenerateContentRequest {
      system_instruction: Content { role: None, parts: vec![Part { text: req.system.clone() }] },
      contents: vec![Content { role: Some("user".into()), parts: vec![Part { text: req.user.clone() }] }],
      generation_config: GenerationConfig {
        temperature: req.temperature,
        max_output_tokens: req.max_output_tokens,
        response_mime_type: "application/json".into(),
      },
    };

    let builder = self.client.post(&self.url)
      .header(USER_AGENT, "promptquest-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    let builder = self.credentials.apply(builder).await?;

    let start = Instant::now();
    let res = builder.json(&body).send().await.map_err(|e| {
      error!(elapsed = ?start.elapsed(), error = %e, "Gemini request failed");
      EvaluatorError::Transport(e.to_string())
    })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(elapsed = ?start.elapsed(), %status, %message, "Gemini returned an error status");
      return Err(EvaluatorError::Status { status: status.as_u16(), message });
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| EvaluatorError::Transport(e.to_string()))?;
    if let Some(usage) = &body.usage_metadata {
      info!(
        elapsed = ?start.elapsed(),
        prompt_tokens = ?usage.prompt_token_count,
        completion_tokens = ?usage.candidates_token_count,
        total_tokens = ?usage.total_token_count,
        "Gemini usage"
      );
    }

    let text = body.text();
    if text.trim().is_empty() {
      return Err(EvaluatorError::EmptyReply);
    }
    debug!(reply_preview = %trunc_for_log(&text, 80), "Gemini reply received");
    Ok(text)
  }

  fn describe(&self) -> String {
    format!("gemini:{}:{}", self.backend.name(), self.model)
  }
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  system_instruction: Content,
  contents: Vec<Content>,
  generation_config: GenerationConfig,
}
#[derive(Serialize, Deserialize, Default)]
struct Content {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  #[serde(default)]
  parts: Vec<Part>,
}
#[derive(Serialize, Deserialize)]
struct Part {
  #[serde(default)]
  text: String,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  temperature: f32,
  max_output_tokens: u32,
  response_mime_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate {
  #[serde(default)] content: Content,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

impl GenerateContentResponse {
  /// Concatenated text parts of the first candidate.
  fn text(&self) -> String {
    self.candidates
      .first()
      .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect::<String>())
      .unwrap_or_default()
  }
}

/// Try to extract a clean error message from a Google API error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings(backend: ModelBackend) -> ModelSettings {
    ModelSettings { backend, model: "gemini-2.5-flash".into(), base_url: None }
  }

  #[test]
  fn vertex_endpoint_uses_project_and_region() {
    let url = endpoint(&settings(ModelBackend::Vertex {
      project: "acme".into(),
      location: "europe-west4".into(),
      access_token: None,
    }));
    assert_eq!(
      url,
      "https://europe-west4-aiplatform.googleapis.com/v1/projects/acme/locations/europe-west4/publishers/google/models/gemini-2.5-flash:generateContent"
    );
  }

  #[test]
  fn api_key_endpoint_and_override() {
    let mut s = settings(ModelBackend::ApiKey { api_key: "k".into() });
    assert_eq!(endpoint(&s), format!("{GENERATIVE_LANGUAGE_URL}/models/gemini-2.5-flash:generateContent"));
    s.base_url = Some("http://localhost:8080".into());
    assert_eq!(endpoint(&s), "http://localhost:8080/models/gemini-2.5-flash:generateContent");
  }

  #[tokio::test]
  async fn configured_credentials_set_request_headers() {
    use reqwest::header::AUTHORIZATION;

    let client = reqwest::Client::new();
    let vertex = ModelBackend::Vertex { project: "p".into(), location: "l".into(), access_token: Some("t".into()) };
    let req = Credentials::for_backend(&vertex)
      .apply(client.post("http://localhost/x"))
      .await
      .unwrap()
      .build()
      .unwrap();
    assert_eq!(req.headers()[AUTHORIZATION], "Bearer t");

    let keyed = ModelBackend::ApiKey { api_key: "k".into() };
    let req = Credentials::for_backend(&keyed)
      .apply(client.post("http://localhost/x"))
      .await
      .unwrap()
      .build()
      .unwrap();
    assert_eq!(req.headers()["x-goog-api-key"], "k");
    assert!(req.headers().get(AUTHORIZATION).is_none());

    let adc = ModelBackend::Vertex { project: "p".into(), location: "l".into(), access_token: None };
    assert!(matches!(Credentials::for_backend(&adc), Credentials::Adc(_)));
  }

  #[test]
  fn reply_text_joins_parts_of_first_candidate() {
    let body: GenerateContentResponse = serde_json::from_str(
      r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"a\":"},{"text":"1}"}]}}],
          "usageMetadata":{"promptTokenCount":5}}"#,
    )
    .unwrap();
    assert_eq!(body.text(), "{\"a\":1}");
    let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
    assert_eq!(empty.text(), "");
  }

  #[test]
  fn error_message_is_extracted() {
    let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
    assert_eq!(extract_gemini_error(body).as_deref(), Some("API key not valid"));
    assert_eq!(extract_gemini_error("<html>"), None);
  }
}
