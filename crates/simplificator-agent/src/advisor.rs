//! Offline advisor: canned answers picked by keyword.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, Role};

/// Maps a user message to a reply.
pub type Advisor = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Preset {
    pub keywords: Vec<String>,
    /// Question the preset answers; offered as a quick prompt.
    pub question: String,
    pub answer: String,
}

impl Preset {
    pub fn new(keywords: &[&str], question: &str, answer: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct PresetAdvisor {
    presets: Vec<Preset>,
    fallback: String,
}

impl PresetAdvisor {
    pub fn new(presets: Vec<Preset>, fallback: impl Into<String>) -> Self {
        Self {
            presets,
            fallback: fallback.into(),
        }
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Answer of the first preset with a keyword contained in `text`,
    /// case-insensitively; the fallback otherwise.
    pub fn respond(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        match self.presets.iter().find(|p| p.matches(&lowered)) {
            Some(preset) => {
                debug!(question = %preset.question, "preset matched");
                preset.answer.clone()
            }
            None => self.fallback.clone(),
        }
    }

    pub fn into_advisor(self) -> Advisor {
        Arc::new(move |text: &str| self.respond(text))
    }
}

impl Default for PresetAdvisor {
    fn default() -> Self {
        Self::new(
            vec![
                Preset::new(
                    &["graphql", "graph", "rest", "api"],
                    "Should I use GraphQL?",
                    "For your small app? REST is simpler. GraphQL adds complexity you don't \
                     need yet. Ship first, optimize later.",
                ),
                Preset::new(
                    &["kubernetes", "k8s", "docker", "container", "deploy"],
                    "Do I need Kubernetes?",
                    "Probably not. Start with a one-click host like Render or Railway. K8s \
                     when you have the problem, not before. Easy, relax.",
                ),
                Preset::new(
                    &["mvp", "minimum", "simple", "start", "begin"],
                    "What's the simplest MVP approach?",
                    "Monolith + Postgres + Deploy. That's it. Add complexity when customers \
                     demand it, not sooner. Faut savoir rider la vague du simple.",
                ),
            ],
            "Great question! The simplest approach is usually the best. What problem are you \
             really solving? Remember: YAGNI = You Ain't Gonna Need It.",
        )
    }
}

/// Provider that answers from an [`Advisor`] instead of a model.
pub struct ScriptedProvider {
    advisor: Advisor,
}

impl ScriptedProvider {
    pub fn new(advisor: Advisor) -> Self {
        Self { advisor }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new(PresetAdvisor::default().into_advisor())
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        Ok(ChatResponse {
            content: (self.advisor)(last_user),
            model: "scripted".to_string(),
            stop_reason: "stop".to_string(),
            tool_calls: Vec::new(),
        })
    }
}
