//! Prompt evaluation and scenario generation on top of a [`ModelClient`].
//!
//! Model replies are decoded into a strict schema. Anything that does not fit is a
//! parse failure, absorbed here with a deterministic fallback; only service failures
//! reach the caller.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{Evaluation, Scenario, ScenarioSource, SkillLevel, MAX_SUB_SCORE};
use crate::error::EvaluatorError;
use crate::gemini::{GenerateRequest, ModelClient};
use crate::seeds::fallback_scenario;
use crate::util::{fill_template, strip_code_fences, trunc_for_log};

const EVAL_TEMPERATURE: f32 = 0.4;
const EVAL_MAX_TOKENS: u32 = 3072;
const SCENARIO_TEMPERATURE: f32 = 0.7;
const SCENARIO_MAX_TOKENS: u32 = 2048;
/// How many catalog scenarios are shown to the model as examples.
pub const FEW_SHOT_EXAMPLES: usize = 2;

/// Decoded evaluation reply.
#[derive(Debug, PartialEq)]
pub enum EvaluationReply {
    Valid(Evaluation),
    ParseFailure(String),
}

/// Exact shape the model must return. Integers only; a reported total is ignored.
#[derive(Deserialize)]
struct RawEvaluation {
    clarity_score: i64,
    specificity_score: i64,
    structure_score: i64,
    task_alignment_score: i64,
    feedback: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

fn sub_score(name: &str, v: i64) -> Result<u8, String> {
    u8::try_from(v)
        .ok()
        .filter(|s| *s <= MAX_SUB_SCORE)
        .ok_or_else(|| format!("{name} out of range: {v}"))
}

pub fn parse_evaluation(reply: &str) -> EvaluationReply {
    let raw: RawEvaluation = match serde_json::from_str(strip_code_fences(reply)) {
        Ok(raw) => raw,
        Err(e) => return EvaluationReply::ParseFailure(e.to_string()),
    };
    let scores = (|| {
        Ok::<_, String>([
            sub_score("clarity_score", raw.clarity_score)?,
            sub_score("specificity_score", raw.specificity_score)?,
            sub_score("structure_score", raw.structure_score)?,
            sub_score("task_alignment_score", raw.task_alignment_score)?,
        ])
    })();
    match scores {
        Ok([c, s, st, t]) => EvaluationReply::Valid(Evaluation::new(
            c,
            s,
            st,
            t,
            raw.feedback,
            raw.strengths,
            raw.improvements,
        )),
        Err(reason) => EvaluationReply::ParseFailure(reason),
    }
}

/// Deterministic result used when the model reply cannot be decoded.
pub fn fallback_evaluation(reason: &str) -> Evaluation {
    Evaluation::new(
        0,
        0,
        0,
        0,
        format!("The evaluation could not be read from the model reply ({reason}). Your prompt was recorded with a score of 0."),
        Vec::new(),
        vec!["Submit the prompt again to get a full evaluation".into()],
    )
}

#[derive(Deserialize)]
struct RawScenario {
    id: String,
    title: String,
    description: String,
    goal: String,
    context: String,
    product: String,
    hints: Vec<String>,
    example_good: String,
}

pub fn parse_scenario(reply: &str, level: SkillLevel) -> Result<Scenario, String> {
    let raw: RawScenario = serde_json::from_str(strip_code_fences(reply)).map_err(|e| e.to_string())?;
    let id = raw.id.trim().to_string();
    if SkillLevel::from_id_prefix(&id) != Some(level) {
        return Err(format!("id '{id}' is not prefixed with '{}'", level.id_prefix()));
    }
    let fields = [
        ("title", &raw.title),
        ("description", &raw.description),
        ("goal", &raw.goal),
        ("context", &raw.context),
        ("product", &raw.product),
        ("example_good", &raw.example_good),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(format!("field '{name}' is empty"));
    }
    let hints: Vec<String> = raw.hints.into_iter().filter(|h| !h.trim().is_empty()).collect();
    if hints.is_empty() {
        return Err("no hints".into());
    }
    Ok(Scenario {
        id,
        title: raw.title,
        description: raw.description,
        goal: raw.goal,
        context: raw.context,
        product: raw.product,
        hints,
        example_good: raw.example_good,
        source: ScenarioSource::Generated,
    })
}

#[derive(Clone)]
pub struct Evaluator {
    client: Arc<dyn ModelClient>,
    prompts: Prompts,
}

impl Evaluator {
    pub fn new(client: Arc<dyn ModelClient>, prompts: Prompts) -> Self {
        Self { client, prompts }
    }

    pub fn describe(&self) -> String {
        self.client.describe()
    }

    /// Score `prompt_text` against `scenario`.
    #[instrument(level = "info", skip(self, scenario, prompt_text), fields(scenario_id = %scenario.id, prompt_len = prompt_text.len()))]
    pub async fn evaluate(&self, scenario: &Scenario, prompt_text: &str) -> Result<Evaluation, EvaluatorError> {
        let user = fill_template(
            &self.prompts.evaluation_user_template,
            &[
                ("title", &scenario.title),
                ("description", &scenario.description),
                ("goal", &scenario.goal),
                ("context", &scenario.context),
                ("product", &scenario.product),
                ("prompt", prompt_text),
            ],
        );
        let req = GenerateRequest {
            system: self.prompts.evaluation_system.clone(),
            user,
            temperature: EVAL_TEMPERATURE,
            max_output_tokens: EVAL_MAX_TOKENS,
        };
        let reply = self.client.generate(&req).await?;

        match parse_evaluation(&reply) {
            EvaluationReply::Valid(e) => {
                info!(target: "progress", total = e.total_score, "Prompt evaluated");
                Ok(e)
            }
            EvaluationReply::ParseFailure(reason) => {
                warn!(target: "progress", %reason, reply_preview = %trunc_for_log(&reply, 120), "Unparseable evaluation; using fallback");
                Ok(fallback_evaluation(&reason))
            }
        }
    }

    /// Few-shot scenario generation. Invalid replies fall back to the first example.
    #[instrument(level = "info", skip(self, examples), fields(%level, examples = examples.len()))]
    pub async fn generate_scenario(&self, level: SkillLevel, examples: &[Scenario]) -> Result<Scenario, EvaluatorError> {
        let shown: Vec<&Scenario> = examples.iter().take(FEW_SHOT_EXAMPLES).collect();
        let examples_text = shown
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let json = serde_json::to_string_pretty(&ExampleOut::from(*s)).unwrap_or_default();
                format!("Example {}:\n{}", i + 1, json)
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let prefix = level.id_prefix().to_string();
        let level_upper = level.as_str().to_ascii_uppercase();
        let user = fill_template(
            &self.prompts.scenario_user_template,
            &[
                ("level_upper", &level_upper),
                ("level_description", level.description()),
                ("examples", &examples_text),
                ("level", level.as_str()),
                ("prefix", &prefix),
            ],
        );
        let req = GenerateRequest {
            system: self.prompts.scenario_system.clone(),
            user,
            temperature: SCENARIO_TEMPERATURE,
            max_output_tokens: SCENARIO_MAX_TOKENS,
        };
        let reply = self.client.generate(&req).await?;

        match parse_scenario(&reply, level) {
            Ok(s) => {
                info!(target: "scenario", %level, id = %s.id, title = %s.title, "Scenario generated");
                Ok(s)
            }
            Err(reason) => {
                warn!(target: "scenario", %level, %reason, "Generated scenario rejected; using an example");
                Ok(examples.first().cloned().unwrap_or_else(|| fallback_scenario(level)))
            }
        }
    }
}

/// Scenario fields shown to the model (without the internal source tag).
#[derive(serde::Serialize)]
struct ExampleOut<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    goal: &'a str,
    context: &'a str,
    product: &'a str,
    hints: &'a [String],
    example_good: &'a str,
}

impl<'a> From<&'a Scenario> for ExampleOut<'a> {
    fn from(s: &'a Scenario) -> Self {
        Self {
            id: &s.id,
            title: &s.title,
            description: &s.description,
            goal: &s.goal,
            context: &s.context,
            product: &s.product,
            hints: &s.hints,
            example_good: &s.example_good,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::seeds::seed_scenarios;
    use std::sync::Mutex;

    /// Returns scripted replies in order and records every request.
    pub(crate) struct ScriptedClient {
        replies: Mutex<Vec<Result<String, EvaluatorError>>>,
        pub(crate) seen: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(replies: Vec<Result<String, EvaluatorError>>) -> Self {
            Self { replies: Mutex::new(replies), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for ScriptedClient {
        async fn generate(&self, req: &GenerateRequest) -> Result<String, EvaluatorError> {
            self.seen.lock().unwrap().push(req.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(EvaluatorError::Transport("no scripted reply left".into()));
            }
            replies.remove(0)
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn evaluator(replies: Vec<Result<String, EvaluatorError>>) -> (Evaluator, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(replies));
        (Evaluator::new(client.clone(), Prompts::default()), client)
    }

    fn scenario(id: &str) -> Scenario {
        seed_scenarios().into_iter().find(|s| s.id == id).unwrap()
    }

    const GOOD_REPLY: &str = r#"{"clarity_score": 20, "specificity_score": 18, "structure_score": 15,
        "task_alignment_score": 22, "total_score": 100, "feedback": "Solid.",
        "strengths": ["Clear goal"], "improvements": ["Add a timeframe"]}"#;

    #[test]
    fn valid_reply_total_is_recomputed() {
        match parse_evaluation(GOOD_REPLY) {
            EvaluationReply::Valid(e) => {
                assert_eq!(e.total_score, 75);
                assert_eq!(e.strengths, vec!["Clear goal".to_string()]);
            }
            other => panic!("expected valid, got {other:?}"),
        }
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let fenced = format!("```json\n{GOOD_REPLY}\n```");
        assert!(matches!(parse_evaluation(&fenced), EvaluationReply::Valid(_)));
    }

    #[test]
    fn missing_sub_score_is_a_parse_failure() {
        let reply = r#"{"clarity_score": 20, "specificity_score": 18, "structure_score": 15, "feedback": "x"}"#;
        assert!(matches!(parse_evaluation(reply), EvaluationReply::ParseFailure(_)));
    }

    #[test]
    fn out_of_range_and_fractional_scores_are_parse_failures() {
        let too_high = r#"{"clarity_score": 26, "specificity_score": 1, "structure_score": 1, "task_alignment_score": 1, "feedback": ""}"#;
        let negative = r#"{"clarity_score": -1, "specificity_score": 1, "structure_score": 1, "task_alignment_score": 1, "feedback": ""}"#;
        let fractional = r#"{"clarity_score": 12.5, "specificity_score": 1, "structure_score": 1, "task_alignment_score": 1, "feedback": ""}"#;
        for reply in [too_high, negative, fractional] {
            assert!(matches!(parse_evaluation(reply), EvaluationReply::ParseFailure(_)), "{reply}");
        }
        assert!(matches!(parse_evaluation("I think this prompt is great"), EvaluationReply::ParseFailure(_)));
    }

    #[tokio::test]
    async fn malformed_reply_yields_zero_fallback_not_error() {
        let (ev, _) = evaluator(vec![Ok(r#"{"clarity_score": 20}"#.into())]);
        let e = ev.evaluate(&scenario("b1"), "Summarize my inbox").await.unwrap();
        assert_eq!(e.total_score, 0);
        assert!(!e.feedback.is_empty());
    }

    #[tokio::test]
    async fn service_error_propagates() {
        let (ev, _) = evaluator(vec![Err(EvaluatorError::Status { status: 500, message: "boom".into() })]);
        let err = ev.evaluate(&scenario("b1"), "Summarize").await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn request_embeds_scenario_and_prompt() {
        let (ev, client) = evaluator(vec![Ok(GOOD_REPLY.into())]);
        let s = scenario("i1");
        ev.evaluate(&s, "Build a pivot table of Q1-Q3 sales").await.unwrap();
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].user.contains(&s.goal));
        assert!(seen[0].user.contains(&s.context));
        assert!(seen[0].user.contains("Excel Copilot"));
        assert!(seen[0].user.contains("Build a pivot table of Q1-Q3 sales"));
        assert_eq!(seen[0].temperature, EVAL_TEMPERATURE);
    }

    const GENERATED: &str = r#"{"id": "a7", "title": "Board pack", "description": "Prepare the quarterly board pack.",
        "goal": "Draft the board pack", "context": "Finance and HR data in SharePoint",
        "product": "Microsoft 365 Copilot", "hints": ["Name the sources", "Define sections"],
        "example_good": "Draft a 12-page board pack..."}"#;

    #[tokio::test]
    async fn generated_scenario_is_accepted_and_tagged() {
        let examples: Vec<Scenario> = seed_scenarios().into_iter().filter(|s| s.id.starts_with('a')).collect();
        let (ev, client) = evaluator(vec![Ok(GENERATED.into())]);
        let s = ev.generate_scenario(SkillLevel::Advanced, &examples).await.unwrap();
        assert_eq!(s.id, "a7");
        assert_eq!(s.source, ScenarioSource::Generated);

        let seen = client.seen.lock().unwrap();
        assert!(seen[0].user.contains("ADVANCED"));
        assert!(seen[0].user.contains("\"a1\""));
        assert!(seen[0].user.contains("\"a2\""));
        assert!(!seen[0].user.contains("\"a3\""));
    }

    #[tokio::test]
    async fn wrong_prefix_falls_back_to_first_example_unchanged() {
        let examples: Vec<Scenario> = seed_scenarios().into_iter().filter(|s| s.id.starts_with('b')).collect();
        let (ev, _) = evaluator(vec![Ok(GENERATED.into())]);
        let s = ev.generate_scenario(SkillLevel::Beginner, &examples).await.unwrap();
        assert_eq!(s, examples[0]);
    }

    #[tokio::test]
    async fn missing_field_without_examples_uses_fallback_scenario() {
        let (ev, _) = evaluator(vec![Ok(r#"{"id": "i5", "title": "x"}"#.into())]);
        let s = ev.generate_scenario(SkillLevel::Intermediate, &[]).await.unwrap();
        assert_eq!(s.id, "i99");
        assert_eq!(s.source, ScenarioSource::Fallback);
    }

    #[test]
    fn empty_hint_list_is_rejected() {
        let reply = GENERATED.replace(r#"["Name the sources", "Define sections"]"#, "[]");
        assert!(parse_scenario(&reply, SkillLevel::Advanced).is_err());
    }
}
