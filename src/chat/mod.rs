//! Retrieval-augmented chat over an indexed document.
//!
//! A turn goes question → top-k retrieval → grounding prompt → streamed
//! completion → word-buffered rendering → transcript entry. See
//! [`ChatEngine::handle_turn`].

pub mod azure;
pub mod prompt;
pub mod provider;
pub mod render;
pub mod retriever;
pub mod session;
pub mod turn;

pub use azure::AzureChatProvider;
pub use provider::{ChatMessage, CompletionProvider, FragmentStream};
pub use render::{CURSOR, RenderEvent, RenderSink, WordBuffer};
pub use retriever::{RetrievedChunk, SearchableIndex, VectorIndex};
pub use session::{Role, Session, Transcript, Turn};
pub use turn::ChatEngine;

use thiserror::Error;

use crate::embedder::EmbedderError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("no document has been indexed for this session")]
    IndexNotReady,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("embedding the question failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("index lookup failed: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("response stream broke: {0}")]
    Stream(String),

    #[error("malformed response chunk: {0}")]
    Decode(#[from] serde_json::Error),
}
