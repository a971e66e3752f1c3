// src/core/llm/providers.rs
use std::env;
use std::pin::Pin;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{RoutetraceError, Result};
use super::assistant::{LanguageAssistant, PromptMessage, ReplyStream};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Factory function to create the configured language assistant
pub fn create_assistant(config: &LlmConfig) -> Result<Box<dyn LanguageAssistant>> {
    if !config.enabled {
        return Err(RoutetraceError::Config("Language assistant is disabled".to_string()));
    }

    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiAssistant::new(config)?)),
        _ => Err(RoutetraceError::Config(
            format!("Unsupported LLM provider: {}", config.provider)
        )),
    }
}

/// Assistant backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiAssistant {
    config: LlmConfig,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiAssistant {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone()
            .or_else(|| env::var(API_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RoutetraceError::Config(
                format!("API key required: set llm.api_key or {}", API_KEY_VAR)
            ))?;

        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');

        Ok(Self {
            config: config.clone(),
            api_key,
            endpoint: format!("{}/chat/completions", base_url),
            client: reqwest::Client::new(),
        })
    }

    fn payload(&self, messages: &[PromptMessage]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }
        payload
    }
}

#[async_trait]
impl LanguageAssistant for OpenAiAssistant {
    async fn ask(&self, messages: Vec<PromptMessage>) -> Result<ReplyStream> {
        debug!("Asking {} with {} messages", self.config.model, messages.len());

        let response = self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(&messages))
            .send()
            .await
            .map_err(|e| RoutetraceError::collaborator("ask", format!("request to {} failed: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RoutetraceError::collaborator(
                "ask",
                format!("API error {}: {}", status, error_text),
            ));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| RoutetraceError::collaborator("ask", e)));
        Ok(sse_text_stream(Box::pin(bytes)))
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// One line of a server-sent event stream
#[derive(Debug, PartialEq)]
enum SseEvent {
    Content(String),
    Done,
    Skip,
    Malformed(String),
}

fn parse_sse_line(line: &str) -> SseEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // blank separators, `: keep-alive` comments, `event:`/`id:` fields
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(event) => {
            if let Some(error) = event.get("error") {
                return SseEvent::Malformed(format!("stream reported an error: {}", error));
            }
            match event["choices"][0]["delta"]["content"].as_str() {
                Some(text) if !text.is_empty() => SseEvent::Content(text.to_string()),
                _ => SseEvent::Skip,
            }
        }
        Err(e) => SseEvent::Malformed(format!("unparseable stream event: {}", e)),
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

struct SseState {
    source: ByteStream,
    buffer: Vec<u8>,
    exhausted: bool,
    done: bool,
}

/// Turn raw response bytes into the text deltas they carry
fn sse_text_stream(source: ByteStream) -> ReplyStream {
    let state = SseState { source, buffer: Vec::new(), exhausted: false, done: false };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            if let Some(newline) = state.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=newline).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseEvent::Content(text) => return Some((Ok(text), state)),
                    SseEvent::Skip => continue,
                    SseEvent::Done => {
                        state.done = true;
                        return None;
                    }
                    SseEvent::Malformed(message) => {
                        state.done = true;
                        return Some((Err(RoutetraceError::collaborator("ask", message)), state));
                    }
                }
            }

            if state.exhausted {
                return None;
            }

            match state.source.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.exhausted = true;
                    if !state.buffer.is_empty() {
                        state.buffer.push(b'\n');
                    }
                }
            }
        }
    })
    .boxed()
}
