//! Top-k lookup over indexed chunks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use super::ChatError;
use crate::db::Db;
use crate::db::search::SearchResult;
use crate::embedder::Embedder;
use crate::indexer::document_key;

/// Metadata key holding the human-readable locator (the page number).
pub const PAGE_LABEL: &str = "page_label";
/// Metadata key holding the document path.
pub const SOURCE: &str = "source";
/// Metadata key holding the chunk's ordinal within its document.
pub const POSITION: &str = "position";

/// A chunk returned by a [`SearchableIndex`], with its relevance.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub score: f64,
}

impl RetrievedChunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
            score: 0.0,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The page label, if present and non-empty.
    pub fn page_label(&self) -> Option<&str> {
        self.metadata
            .get(PAGE_LABEL)
            .map(String::as_str)
            .filter(|label| !label.trim().is_empty())
    }
}

impl From<SearchResult> for RetrievedChunk {
    fn from(result: SearchResult) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(SOURCE.to_string(), result.document_name);
        metadata.insert(POSITION.to_string(), result.position.to_string());
        if let Some(label) = result.page_label {
            metadata.insert(PAGE_LABEL.to_string(), label);
        }
        Self {
            content: result.chunk_content,
            metadata,
            score: result.similarity,
        }
    }
}

/// Nearest-content lookup. Results come back best match first.
#[async_trait]
pub trait SearchableIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, ChatError>;
}

/// [`SearchableIndex`] over one document in the sqlite-vec store, embedding
/// the query first.
///
/// A file-backed store can hold many documents; only chunks stored under
/// `document` are searched.
pub struct VectorIndex {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    document: String,
}

impl VectorIndex {
    pub fn new(db: Arc<TokioMutex<Db>>, embedder: Arc<dyn Embedder>, document: &Path) -> Self {
        Self {
            db,
            embedder,
            document: document_key(document),
        }
    }
}

#[async_trait]
impl SearchableIndex for VectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, ChatError> {
        let query_vector = self.embedder.embed(query).await?;
        let results = {
            let db_guard = self.db.lock().await;
            db_guard.search(&self.document, &query_vector, k)?
        };
        debug!(document = %self.document, k, hits = results.len(), "vector search");
        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }
}
