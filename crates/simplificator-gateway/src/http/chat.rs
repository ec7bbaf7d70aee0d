//! POST /chat: streams the coach's reply as `data:` chunk lines.
//!
//! Request: `{"messages": [{"role": "user", "content": "..."}]}`
//! Response: `text/event-stream` of chat-completion chunks, then `data: [DONE]`.
//! Failures before the first chunk are plain JSON errors (429, 402, 500).
//! A failure after that sends an `{"error": ...}` frame and aborts the body
//! without `[DONE]`, so clients see a transport error rather than a clean end.

use std::io;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::Deserialize;
use simplificator_agent::prompt::CHAT_SYSTEM_PROMPT;
use simplificator_agent::provider::{ChatRequest, Message};
use simplificator_agent::stream::{delta_chunk, DONE_SENTINEL};
use simplificator_agent::StreamEvent;
use simplificator_core::SimplificatorError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{api_error, ApiError};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<Message>,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    if body.messages.iter().all(|m| m.content.trim().is_empty()) {
        return Err(api_error(SimplificatorError::InvalidInput(
            "messages must contain at least one non-empty message".into(),
        )));
    }

    info!(
        provider = state.provider.name(),
        messages = body.messages.len(),
        "starting chat"
    );

    let req = ChatRequest {
        model: state.config.upstream.model.clone(),
        system: CHAT_SYSTEM_PROMPT.to_string(),
        messages: body.messages,
        max_tokens: state.config.upstream.max_tokens,
        stream: true,
        tools: Vec::new(),
        tool_choice: None,
    };

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
    let provider = Arc::clone(&state.provider);
    let task = tokio::spawn(async move { provider.send_stream(&req, tx).await });

    // A request that fails before streaming drops the sender without sending.
    let first = match rx.recv().await {
        Some(event) => event,
        None => {
            return match task.await {
                Ok(Err(e)) => Err(api_error(e.into())),
                Err(e) => Err(api_error(SimplificatorError::Internal(e.to_string()))),
                Ok(Ok(())) => Err(api_error(SimplificatorError::Upstream(
                    "stream ended without a response".into(),
                ))),
            };
        }
    };

    let stream = async_stream::stream! {
        let mut next = Some(first);
        while let Some(event) = next {
            match event {
                StreamEvent::TextDelta { text } => {
                    yield Ok::<_, io::Error>(Event::default().data(delta_chunk(&text).to_string()));
                }
                StreamEvent::Done => {
                    yield Ok(Event::default().data(DONE_SENTINEL));
                    break;
                }
                StreamEvent::Error { kind, message } => {
                    warn!(%kind, error = %message, "upstream stream failed, closing relay");
                    let body = serde_json::json!({ "error": { "type": kind, "message": message } });
                    yield Ok(Event::default().data(body.to_string()));
                    yield Err(io::Error::other(format!("upstream {kind}: {message}")));
                    break;
                }
            }
            next = rx.recv().await;
        }
        debug!("chat relay finished");
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use simplificator_agent::openai::OpenAiProvider;
    use simplificator_agent::stream::encode_delta_frame;
    use simplificator_agent::transcript::MessageStatus;
    use simplificator_agent::{
        drive_stream, AssemblerState, StreamErrorKind, StreamEvent, StreamingAssembler,
    };
    use tower::ServiceExt;

    use crate::app::{build_router, test_support};
    use crate::client::ChatClient;

    /// Serve `upstream` on a loopback port; returns its chat-completions URL.
    async fn fake_upstream(upstream: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, upstream).await;
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn relay_to(url: String) -> axum::Router {
        let provider = OpenAiProvider::new("test-key".into(), url, Duration::from_secs(5));
        build_router(test_support::state_with(Arc::new(provider), None))
    }

    async fn relayed_events(resp: axum::response::Response) -> Vec<StreamEvent> {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let mut assembler = StreamingAssembler::new(Vec::new());
        assembler.push_bytes(&bytes);
        assembler.finish();
        assembler.into_handler()
    }

    /// Upstream that sends one delta, then resets the connection.
    fn resetting_upstream() -> axum::Router {
        axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let body = async_stream::stream! {
                    yield Ok::<_, std::io::Error>(encode_delta_frame("partial").into_bytes());
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    yield Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "upstream went away",
                    ));
                };
                Body::from_stream(body)
            }),
        )
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn scripted_reply_streams_one_delta_and_done() {
        let app = build_router(test_support::state(None));
        let resp = app
            .oneshot(chat_request(
                r#"{"messages":[{"role":"user","content":"Do I need Kubernetes?"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let mut assembler = StreamingAssembler::new(Vec::new());
        assembler.push_bytes(&bytes);
        let events = assembler.into_handler();
        assert_eq!(events.len(), 2);
        assert!(events[0].as_text_delta().unwrap().starts_with("Probably not."));
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn upstream_chunks_are_reassembled_and_relayed() {
        // Chunks cut mid-line, mid-character and inside a raw newline.
        let chunks: Vec<Vec<u8>> = vec![
            b": ping\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"Respect \xC3".to_vec(),
            b"\xA0 toi\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"two\nlines".to_vec(),
            b"\"}}]}\n\n".to_vec(),
            encode_delta_frame("!").into_bytes(),
            b"data: [DONE]\n\n".to_vec(),
        ];
        let upstream = axum::Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let chunks = chunks.clone().into_iter().map(Ok::<_, std::io::Error>);
                async move { Body::from_stream(futures_util::stream::iter(chunks)) }
            }),
        );
        let app = relay_to(fake_upstream(upstream).await);

        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            relayed_events(resp).await,
            vec![
                StreamEvent::TextDelta { text: "Respect \u{e0} toi".into() },
                StreamEvent::TextDelta { text: "two\nlines".into() },
                StreamEvent::TextDelta { text: "!".into() },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn mid_stream_upstream_failure_aborts_relay() {
        let app = relay_to(fake_upstream(resetting_upstream()).await);

        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut assembler = StreamingAssembler::new(Vec::new());
        drive_stream(resp.into_body().into_data_stream(), &mut assembler).await;
        assert_eq!(assembler.state(), AssemblerState::Failed);
        let events = assembler.into_handler();
        assert_eq!(events[0], StreamEvent::TextDelta { text: "partial".into() });
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { kind: StreamErrorKind::TransportError, .. })
        ));
        assert!(!events.contains(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn client_marks_reply_incomplete_on_mid_stream_failure() {
        let relay = relay_to(fake_upstream(resetting_upstream()).await);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, relay).await;
        });

        let mut client = ChatClient::new(&format!("http://{addr}"));
        let mut out = Vec::new();
        let status = client.send("hi", &mut out).await.unwrap();
        assert_eq!(status, MessageStatus::Incomplete);
        assert!(String::from_utf8(out).unwrap().starts_with("partial"));
        // only the user turn goes back upstream
        assert_eq!(client.transcript().history().len(), 1);
    }

    #[tokio::test]
    async fn upstream_rate_limit_is_json_429() {
        let upstream = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "3")],
                    "slow down",
                )
                    .into_response()
            }),
        );
        let app = relay_to(fake_upstream(upstream).await);

        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = test_support::body_json(resp).await;
        assert_eq!(body["code"], "RATE_LIMITED");
        assert_eq!(body["retry_after_ms"], 3000);
    }

    #[tokio::test]
    async fn upstream_credits_exhausted_is_json_402() {
        let upstream = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async { StatusCode::PAYMENT_REQUIRED }),
        );
        let app = relay_to(fake_upstream(upstream).await);

        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(test_support::body_json(resp).await["code"], "CREDITS_REQUIRED");
    }

    #[tokio::test]
    async fn empty_messages_rejected() {
        let app = build_router(test_support::state(None));
        let resp = app.oneshot(chat_request(r#"{"messages":[]}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = test_support::body_json(resp).await;
        assert_eq!(body["code"], "INVALID_INPUT");
    }
}
