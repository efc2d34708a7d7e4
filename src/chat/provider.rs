use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use super::ChatError;
use super::session::Role;

/// Lazily produced answer fragments. Ends when the answer is complete.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// One `{role, content}` message of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat model that streams its answer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Starts a completion. Errors before the first fragment are returned
    /// here; later ones arrive as stream items.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, ChatError>;
}
