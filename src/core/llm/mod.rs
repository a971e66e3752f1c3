//! Language-assistance collaborator
//!
//! A trait for chat-style assistants that stream their reply, plus an
//! OpenAI-compatible provider. The resolver uses it as its last automatic
//! disambiguation stage.

mod assistant;
mod providers;

pub use assistant::{collect_reply, LanguageAssistant, PromptMessage, ReplyStream};
pub use providers::{create_assistant, OpenAiAssistant};
