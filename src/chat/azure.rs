//! Streamed chat completions from an Azure OpenAI deployment.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, TryStreamExt, future};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::ChatError;
use super::provider::{ChatMessage, CompletionProvider, FragmentStream};
use crate::azure::{ErrorDetail, deployment_url, error_detail};
use crate::config::{AzureCredentials, ChatConfig};

/// Sentinel data payload that ends an Azure/OpenAI event stream.
const DONE: &str = "[DONE]";

pub struct AzureChatProvider {
    client: reqwest::Client,
    credentials: AzureCredentials,
}

impl AzureChatProvider {
    pub fn new(credentials: AzureCredentials, config: &ChatConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Text carried by one `data:` payload, if any.
///
/// Azure sends prompt-filter results with no choices and a closing chunk
/// with an empty delta; both yield `None`.
fn parse_chunk(data: &str) -> Result<Option<String>, ChatError> {
    let chunk: CompletionChunk = serde_json::from_str(data)?;
    if let Some(err) = chunk.error {
        return Err(ChatError::Stream(err.message));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

/// Turns a raw SSE byte stream into answer fragments.
fn decode_event_stream<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    bytes
        .eventsource()
        .take_while(|event| {
            future::ready(!matches!(event, Ok(event) if event.data.trim() == DONE))
        })
        .map(|event| match event {
            Ok(event) => parse_chunk(&event.data),
            Err(e) => Err(ChatError::Stream(e.to_string())),
        })
        .try_filter_map(|fragment| future::ready(Ok(fragment)))
        .boxed()
}

#[async_trait]
impl CompletionProvider for AzureChatProvider {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, ChatError> {
        let url = deployment_url(&self.credentials, model, "chat/completions");
        debug!(model, messages = messages.len(), "requesting completion");

        let response = self
            .client
            .post(url)
            .header("api-key", &self.credentials.api_key)
            .json(&ChatRequest {
                messages,
                stream: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "chat completion API error");
            return Err(ChatError::Provider {
                status: status.as_u16(),
                message: error_detail(body),
            });
        }

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body_stream(
        parts: Vec<Result<&'static str, std::io::Error>>,
    ) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
        stream::iter(
            parts
                .into_iter()
                .map(|part| part.map(|s| s.as_bytes().to_vec())),
        )
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String, ChatError>> {
        stream.collect().await
    }

    const BODY: &str = concat!(
        "data: {\"choices\":[],\"prompt_filter_results\":[{\"prompt_index\":0}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":null}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"after done\"}}]}\n\n",
    );

    #[test]
    fn test_parse_chunk() {
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            Some("Hi".to_string())
        );
        assert_eq!(parse_chunk(r#"{"choices":[]}"#).unwrap(), None);
        assert_eq!(parse_chunk(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
        assert!(matches!(parse_chunk("not json"), Err(ChatError::Decode(_))));
    }

    #[test]
    fn test_parse_chunk_in_band_error() {
        let err = parse_chunk(r#"{"error":{"message":"content filtered"}}"#).unwrap_err();
        assert!(matches!(err, ChatError::Stream(ref m) if m == "content filtered"));
    }

    #[tokio::test]
    async fn test_decode_skips_empty_and_stops_at_done() {
        let fragments = collect(decode_event_stream(body_stream(vec![Ok(BODY)]))).await;
        let fragments: Vec<String> = fragments.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_decode_handles_events_split_across_reads() {
        let mut parts = Vec::new();
        let mut rest = BODY;
        while !rest.is_empty() {
            let (head, tail) = rest.split_at(rest.len().min(7));
            parts.push(Ok(head));
            rest = tail;
        }
        let fragments = collect(decode_event_stream(body_stream(parts))).await;
        let fragments: Vec<String> = fragments.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let parts = vec![
            Ok("data: {\"choices\":[{\"delta\":{\"content\":\"Par\"}}]}\n\n"),
            Err(std::io::Error::other("connection reset")),
        ];
        let items = collect(decode_event_stream(body_stream(parts))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Par");
        assert!(matches!(items[1], Err(ChatError::Stream(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = [ChatMessage::system("ctx"), ChatMessage::user("q")];
        let body = serde_json::to_value(ChatRequest {
            messages: &messages,
            stream: true,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "messages": [
                    {"role": "system", "content": "ctx"},
                    {"role": "user", "content": "q"}
                ],
                "stream": true
            })
        );
    }
}
