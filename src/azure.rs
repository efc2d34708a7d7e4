//! Pieces shared by the Azure OpenAI embeddings and chat clients.

use serde::Deserialize;

use crate::config::AzureCredentials;

/// `{endpoint}/openai/deployments/{deployment}/{operation}?api-version={version}`
pub(crate) fn deployment_url(
    credentials: &AzureCredentials,
    deployment: &str,
    operation: &str,
) -> String {
    format!(
        "{}/openai/deployments/{}/{}?api-version={}",
        credentials.endpoint, deployment, operation, credentials.api_version
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub(crate) message: String,
}

/// Extract the provider's message from an error body, or return the body as-is.
pub(crate) fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}
