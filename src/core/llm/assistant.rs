// src/core/llm/assistant.rs
use std::pin::Pin;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One chat message sent to the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Reply text as it arrives, chunk by chunk
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Language-assistance collaborator
#[async_trait]
pub trait LanguageAssistant: Send + Sync {
    /// Send the conversation and stream back the reply
    async fn ask(&self, messages: Vec<PromptMessage>) -> Result<ReplyStream>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Drain a reply stream into one string; the first failed chunk fails the reply
pub async fn collect_reply(mut stream: ReplyStream) -> Result<String> {
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        reply.push_str(&chunk?);
    }
    Ok(reply)
}
