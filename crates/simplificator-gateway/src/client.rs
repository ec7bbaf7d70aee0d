//! `simplificator chat`: talk to a running gateway from the terminal.

use std::io::Write;

use anyhow::Context;
use simplificator_agent::transcript::{ChatTranscript, MessageStatus};
use simplificator_agent::{
    drive_stream, StreamErrorKind, StreamEvent, StreamHandler, StreamingAssembler,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use uuid::Uuid;

/// Prints deltas as they arrive and records them in the transcript.
struct TerminalRenderer<'a, W: Write> {
    transcript: &'a mut ChatTranscript,
    reply: Uuid,
    out: W,
}

impl<W: Write> TerminalRenderer<'_, W> {
    fn record(&mut self, event: StreamEvent) {
        self.transcript.apply(self.reply, &event);
    }
}

impl<W: Write> StreamHandler for TerminalRenderer<'_, W> {
    fn on_delta(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        let _ = self.out.flush();
        self.record(StreamEvent::TextDelta {
            text: text.to_string(),
        });
    }

    fn on_complete(&mut self) {
        let _ = writeln!(self.out);
        self.record(StreamEvent::Done);
    }

    fn on_error(&mut self, kind: StreamErrorKind, detail: &str) {
        let _ = writeln!(self.out);
        eprintln!("[{kind}] {detail}");
        self.record(StreamEvent::Error {
            kind,
            message: detail.to_string(),
        });
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    transcript: ChatTranscript,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/chat", base_url.trim_end_matches('/')),
            transcript: ChatTranscript::new(),
        }
    }

    /// Send `message` with the conversation so far and stream the reply to
    /// `out`. Returns the status the reply ended in.
    pub async fn send<W: Write>(&mut self, message: &str, out: W) -> anyhow::Result<MessageStatus> {
        self.transcript.push_user(message);
        let body = serde_json::json!({ "messages": self.transcript.history() });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", self.url))?;

        let reply = self.transcript.begin_assistant();
        let mut renderer = TerminalRenderer {
            transcript: &mut self.transcript,
            reply,
            out,
        };
        let mut assembler = StreamingAssembler::new(&mut renderer);

        let status = resp.status();
        if status.is_success() {
            drive_stream(resp.bytes_stream(), &mut assembler).await;
        } else {
            let text = resp.text().await.unwrap_or_default();
            assembler.reject(&format!("{status}: {}", error_message(&text)));
        }
        debug!(
            malformed = assembler.malformed_frames(),
            replaced = assembler.replaced_chars(),
            "reply finished"
        );
        drop(assembler);
        drop(renderer);

        Ok(self
            .transcript
            .get(reply)
            .map(|m| m.status)
            .unwrap_or(MessageStatus::Incomplete))
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }
}

/// The `error` field of a JSON error body, or the body itself.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

/// One message, or an interactive session when `message` is None.
pub async fn run(base_url: &str, message: Option<String>) -> anyhow::Result<()> {
    let mut client = ChatClient::new(base_url);

    if let Some(message) = message {
        let status = client.send(&message, std::io::stdout()).await?;
        if status != MessageStatus::Complete {
            anyhow::bail!("reply incomplete");
        }
        return Ok(());
    }

    println!("Simplificator Manager. Easy, relax. (Ctrl-D to quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        client.send(line, std::io::stdout()).await?;
    }
    debug!(messages = client.transcript().messages().len(), "chat session ended");
    Ok(())
}
