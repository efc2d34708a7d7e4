//! Azure OpenAI embeddings over the deployments REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{Embedder, EmbedderError};
use crate::azure::{deployment_url, error_detail};
use crate::config::AzureCredentials;

/// An [`Embedder`] backed by an Azure OpenAI embeddings deployment.
///
/// Calls `POST {endpoint}/openai/deployments/{deployment}/embeddings`
/// with the `api-key` header.
pub struct AzureEmbedder {
    client: reqwest::Client,
    credentials: AzureCredentials,
    deployment: String,
    dimensions: usize,
}

impl AzureEmbedder {
    pub fn new(
        credentials: AzureCredentials,
        deployment: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedderError::RequestFailed(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            credentials,
            deployment: deployment.into(),
            dimensions,
        })
    }

    fn url(&self) -> String {
        deployment_url(&self.credentials, &self.deployment, "embeddings")
    }
}

// ── Request/response types ───────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Order vectors by their `index` and check count and width.
fn collect_vectors(
    response: EmbeddingResponse,
    expected_count: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    let mut data = response.data;
    if data.len() != expected_count {
        return Err(EmbedderError::InvalidResponse(format!(
            "requested {expected_count} embeddings, received {}",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimensions {
                Ok(d.embedding)
            } else {
                Err(EmbedderError::DimensionMismatch {
                    expected: dimensions,
                    actual: d.embedding.len(),
                })
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for AzureEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            deployment = %self.deployment,
            batch_size = texts.len(),
            "embedding batch"
        );

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.credentials.api_key)
            .json(&EmbeddingRequest { input: texts })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embedding request failed");
                EmbedderError::RequestFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "embedding API error");
            return Err(EmbedderError::Api {
                status: status.as_u16(),
                message: error_detail(body),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;

        collect_vectors(parsed, texts.len(), self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> AzureCredentials {
        AzureCredentials {
            endpoint: "https://res.openai.azure.com".into(),
            api_key: "k".into(),
            api_version: "2023-05-15".into(),
        }
    }

    #[test]
    fn test_embeddings_url() {
        let embedder =
            AzureEmbedder::new(creds(), "text-embedding-ada-002", 1536, Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            embedder.url(),
            "https://res.openai.azure.com/openai/deployments/text-embedding-ada-002/embeddings?api-version=2023-05-15"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(EmbeddingRequest { input: &["a", "b"] }).unwrap();
        assert_eq!(body, serde_json::json!({ "input": ["a", "b"] }));
    }

    #[test]
    fn test_collect_vectors_orders_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]}"#,
        )
        .unwrap();
        let vectors = collect_vectors(response, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_collect_vectors_rejects_wrong_width() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]}"#)
                .unwrap();
        let err = collect_vectors(response, 1, 2).unwrap_err();
        assert!(matches!(
            err,
            EmbedderError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_collect_vectors_rejects_wrong_count() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        assert!(collect_vectors(response, 2, 1).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let embedder =
            AzureEmbedder::new(creds(), "text-embedding-ada-002", 1536, Duration::from_secs(1))
                .unwrap();
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.dimensions(), 1536);
    }
}
