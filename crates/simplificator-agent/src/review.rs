//! Over-engineering review: prompt, forced tool call, and sanitizing of
//! whatever the model sends back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use simplificator_core::config::ReviewConfig;
use simplificator_core::types::MAX_SCORE;
use simplificator_core::{ScoreBand, SimplificatorError};
use tracing::{debug, info, warn};

use crate::prompt::{review_user_prompt, REVIEW_SYSTEM_PROMPT};
use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, ToolDefinition};

pub const REVIEW_TOOL: &str = "provide_review";

/// Score used when the model omits one or sends something non-numeric.
const DEFAULT_SCORE: u8 = 5;
/// Description prefix used as title when the model gives none.
const TITLE_FROM_DESCRIPTION_CHARS: usize = 50;

const DEFAULT_SUGGESTIONS: [&str; 3] = [
    "Start with a monolith on a one-click host - simple deployment",
    "Use Postgres with a managed backend instead of custom infrastructure",
    "Ship the MVP first, optimize later when you have real users",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl ReviewRequest {
    pub fn validate(&self, limits: &ReviewConfig) -> Result<(), SimplificatorError> {
        check_field("code", &self.code, limits.max_code_chars)?;
        check_field("description", &self.description, limits.max_description_chars)
    }
}

fn check_field(name: &str, value: &str, max_chars: usize) -> Result<(), SimplificatorError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SimplificatorError::InvalidInput(format!("{name} is required")));
    }
    if value.chars().count() > max_chars {
        return Err(SimplificatorError::InvalidInput(format!(
            "{name} must be at most {max_chars} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub score: u8,
    pub title: String,
    pub suggestions: Vec<String>,
}

impl ReviewVerdict {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }
}

/// Verdict returned in place of a real one when scoring failed.
#[derive(Debug, Clone)]
pub struct ReviewFallback {
    pub status: u16,
    pub error: String,
    pub verdict: ReviewVerdict,
}

impl ReviewFallback {
    pub fn from_error(err: &ProviderError) -> Self {
        let (status, error, title, suggestions): (u16, String, &str, &[&str]) = match err {
            ProviderError::RateLimited { .. } => (
                429,
                "Rate limit exceeded. Please try again in a moment.".into(),
                "Rate Limited",
                &["Please wait a moment and try again"],
            ),
            ProviderError::CreditsRequired => (
                402,
                "AI credits depleted. Please add credits to your workspace.".into(),
                "Credits Required",
                &["Please add credits to continue using AI features"],
            ),
            other => (
                500,
                other.to_string(),
                "Error analyzing code",
                &[
                    "Start simple - monolith first, split later if needed",
                    "Use managed services to avoid infrastructure complexity",
                    "Focus on shipping value to customers, not perfect architecture",
                ],
            ),
        };
        Self {
            status,
            error,
            verdict: ReviewVerdict {
                score: DEFAULT_SCORE,
                title: title.to_string(),
                suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

/// The single tool the model is forced to call.
pub fn review_tool() -> ToolDefinition {
    ToolDefinition {
        name: REVIEW_TOOL.to_string(),
        description: "Provide code review with complexity score and simplification suggestions"
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "score": {
                    "type": "number",
                    "description": "Complexity score from 0-10 where 0-3=simple, 4-6=medium, 7-10=over-engineered"
                },
                "title": {
                    "type": "string",
                    "description": "Short descriptive title like \"Microservices for Todo App\" or \"Simple Landing Page\""
                },
                "suggestions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Exactly 3 specific garage mode alternatives with concrete recommendations"
                }
            },
            "required": ["score", "title", "suggestions"],
            "additionalProperties": false
        }),
    }
}

/// Coerce raw tool arguments into a well-formed verdict.
pub fn sanitize(args: &Value, description: &str, limits: &ReviewConfig) -> ReviewVerdict {
    let score = args
        .get("score")
        .and_then(numeric)
        .map(|n| n.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
        .unwrap_or(DEFAULT_SCORE);

    let title = match args.get("title").and_then(Value::as_str) {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => truncate_chars(description, TITLE_FROM_DESCRIPTION_CHARS),
    };
    let title = truncate_chars(&title, limits.max_title_chars);

    let suggestions = match args.get("suggestions") {
        Some(Value::Array(items)) => items
            .iter()
            .take(limits.suggestion_count)
            .map(|item| {
                let text = match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                truncate_chars(&text, limits.max_suggestion_chars)
            })
            .collect(),
        _ => DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
    };

    ReviewVerdict {
        score,
        title,
        suggestions,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Scores submissions through a provider that supports tool calls.
pub struct Reviewer {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    limits: ReviewConfig,
}

impl Reviewer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        limits: ReviewConfig,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            limits,
        }
    }

    pub async fn review(&self, req: &ReviewRequest) -> Result<ReviewVerdict, ProviderError> {
        info!(
            provider = self.provider.name(),
            description_len = req.description.len(),
            code_len = req.code.len(),
            "analyzing submission"
        );

        let chat = ChatRequest {
            model: self.model.clone(),
            system: REVIEW_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(review_user_prompt(
                &req.description,
                &req.code,
            ))],
            max_tokens: self.max_tokens,
            stream: false,
            tools: vec![review_tool()],
            tool_choice: Some(REVIEW_TOOL.to_string()),
        };

        let resp = self.provider.send(&chat).await?;
        let call = resp
            .tool_calls
            .iter()
            .find(|c| c.name == REVIEW_TOOL)
            .ok_or_else(|| {
                warn!(stop_reason = %resp.stop_reason, "model answered without calling the review tool");
                ProviderError::Parse("no tool call in response".into())
            })?;

        let args: Value = serde_json::from_str(&call.arguments)
            .map_err(|e| ProviderError::Parse(format!("tool arguments: {e}")))?;
        debug!(args = %args, "raw review arguments");

        let verdict = sanitize(&args, &req.description, &self.limits);
        info!(score = verdict.score, band = %verdict.band(), "review scored");
        Ok(verdict)
    }
}
