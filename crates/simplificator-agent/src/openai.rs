use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::assembler::StreamingAssembler;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};
use crate::stream::StreamEvent;

/// Client for an OpenAI-compatible chat-completions gateway.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            api_key,
            url,
        }
    }

    pub fn from_config(config: &simplificator_core::SimplificatorConfig) -> Option<Self> {
        let api_key = config.upstream.api_key.clone()?;
        Some(Self::new(
            api_key,
            config.chat_url(),
            Duration::from_secs(config.upstream.timeout_secs),
        ))
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;
        check_status(resp).await
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req, false);
        debug!(model = %req.model, tools = req.tools.len(), "sending request to gateway");

        let resp = self.post(&body).await?;
        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp, &req.model))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req, true);
        debug!(model = %req.model, messages = req.messages.len(), "sending streaming request to gateway");

        let resp = self.post(&body).await?;
        process_openai_stream(resp.bytes_stream(), tx).await;
        Ok(())
    }
}

/// Map a non-success status to the matching request error.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(resp);
    }
    match status {
        429 => Err(ProviderError::RateLimited {
            retry_after_ms: retry_after_ms(resp.headers()),
        }),
        402 => Err(ProviderError::CreditsRequired),
        _ => {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "gateway API error");
            Err(ProviderError::Api {
                status,
                message: text,
            })
        }
    }
}

/// `retry-after` in seconds, converted to ms; 5s when absent or unparsable.
pub fn retry_after_ms(headers: &HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|s| s * 1000)
        .unwrap_or(5000)
}

pub fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    // System prompt goes first as a plain system message.
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];

    for m in &req.messages {
        messages.push(serde_json::json!({
            "role": m.role,
            "content": m.content,
        }));
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": stream,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }
    if let Some(ref name) = req.tool_choice {
        body["tool_choice"] = serde_json::json!({
            "type": "function",
            "function": { "name": name },
        });
    }
    body
}

fn parse_response(resp: ApiResponse, requested_model: &str) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let (content, tool_calls, stop_reason) = match choice {
        Some(c) => (
            c.message.content.unwrap_or_default(),
            c.message
                .tool_calls
                .into_iter()
                .map(|t| ToolCall {
                    name: t.function.name,
                    arguments: t.function.arguments,
                })
                .collect(),
            c.finish_reason.unwrap_or_default(),
        ),
        None => (String::new(), Vec::new(), String::new()),
    };

    ChatResponse {
        content,
        model: resp.model.unwrap_or_else(|| requested_model.to_string()),
        stop_reason,
        tool_calls,
    }
}

/// Assemble a streamed chat-completion body and forward the events.
///
/// Events are flushed to `tx` after every chunk. Stops early when the
/// receiver is dropped.
pub async fn process_openai_stream<S, B, E>(byte_stream: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut assembler = StreamingAssembler::new(Vec::new());
    let mut byte_stream = std::pin::pin!(byte_stream);

    while let Some(chunk) = byte_stream.next().await {
        match chunk {
            Ok(bytes) => assembler.push_bytes(bytes.as_ref()),
            Err(e) => {
                warn!(error = %e, "gateway stream interrupted");
                assembler.fail(&e.to_string());
            }
        }
        if !forward(&mut assembler, &tx).await {
            return; // receiver dropped
        }
        if assembler.state().is_terminal() {
            return;
        }
    }

    assembler.finish();
    forward(&mut assembler, &tx).await;
}

async fn forward(
    assembler: &mut StreamingAssembler<Vec<StreamEvent>>,
    tx: &mpsc::Sender<StreamEvent>,
) -> bool {
    let events = std::mem::take(assembler.handler_mut());
    for event in events {
        if let StreamEvent::TextDelta { ref text } = event {
            trace!(len = text.len(), "gateway stream text delta");
        }
        if tx.send(event).await.is_err() {
            debug!("stream receiver dropped, abandoning gateway stream");
            return false;
        }
    }
    true
}

// Gateway response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}
