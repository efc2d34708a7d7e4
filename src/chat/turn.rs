use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use super::ChatError;
use super::prompt::{build_context, system_prompt};
use super::provider::{ChatMessage, CompletionProvider};
use super::render::{RenderEvent, RenderSink, WordBuffer};
use super::retriever::SearchableIndex;
use super::session::Session;

pub const DEFAULT_TOP_K: usize = 3;

/// Answers questions about the document attached to a [`Session`].
pub struct ChatEngine {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    top_k: usize,
}

impl ChatEngine {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one question/answer exchange.
    ///
    /// Appends the user turn, retrieves context, streams the answer into
    /// `sink` a word at a time and appends the assistant turn. Returns the
    /// answer text.
    ///
    /// A question that is blank, or a session without an index, is
    /// rejected before anything is recorded. If retrieval or the completion
    /// fails, whatever was received is kept, an `[response interrupted: …]`
    /// line is added, that text is rendered and recorded as the assistant
    /// turn, and the error is returned.
    #[instrument(skip_all, fields(model = %self.model, top_k = self.top_k))]
    pub async fn handle_turn<S>(
        &self,
        session: &mut Session,
        question: &str,
        sink: &mut S,
    ) -> Result<String, ChatError>
    where
        S: RenderSink + ?Sized,
    {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        let index = session.index().ok_or(ChatError::IndexNotReady)?;

        let user_turn = session.transcript_mut().push_user(question).clone();
        sink.on_event(RenderEvent::Message(user_turn));

        let mut buffer = WordBuffer::default();
        let outcome = self
            .stream_answer(index.as_ref(), question, &mut buffer, &mut *sink)
            .await;

        let mut answer = buffer.finish();
        if let Err(err) = &outcome {
            warn!(error = %err, received = answer.len(), "turn interrupted");
            if !answer.is_empty() {
                answer.push_str("\n\n");
            }
            answer.push_str(&format!("[response interrupted: {err}]"));
        }

        sink.on_event(RenderEvent::Final(answer.clone()));
        session.transcript_mut().push_assistant(answer.clone());
        info!(
            turns = session.transcript().len(),
            chars = answer.chars().count(),
            "turn complete"
        );

        outcome.map(|()| answer)
    }

    async fn stream_answer<S>(
        &self,
        index: &dyn SearchableIndex,
        question: &str,
        buffer: &mut WordBuffer,
        sink: &mut S,
    ) -> Result<(), ChatError>
    where
        S: RenderSink + ?Sized,
    {
        sink.on_event(RenderEvent::Searching);
        let hits = index.search(question, self.top_k).await?;
        debug!(hits = hits.len(), "retrieved context");

        let context = build_context(&hits);
        let messages = [
            ChatMessage::system(system_prompt(&context)),
            ChatMessage::user(question),
        ];

        let mut fragments = self.provider.stream_chat(&self.model, &messages).await?;
        while let Some(fragment) = fragments.next().await {
            for ch in fragment?.chars() {
                if buffer.push(ch) {
                    sink.on_event(RenderEvent::Partial(buffer.with_cursor()));
                }
            }
        }
        Ok(())
    }
}
