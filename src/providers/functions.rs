//! Client for the studio's hosted AI functions.
//!
//! Three endpoints sit behind the same project URL and publishable key:
//! - `ai-chat`: streamed chat completion, consumed through [`ChatTransport`]
//! - `ai-suggest`: tattoo idea cards
//! - `ai-generate-image`: a single generated image

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::client::{ByteStream, ChatTransport, ClientError};
use crate::http::{authorized_post, build_http_client, ResponseExt};
use crate::model::{
    ChatMessage, ChatRequest, GeneratedImage, ImageRequest, ImageResponse, SuggestRequest,
    SuggestResponse, Suggestion,
};
use crate::options::{FunctionsConfig, TransportOptions};

/// HTTP client for the AI functions.
#[derive(Debug, Clone)]
pub struct FunctionsClient {
    config: FunctionsConfig,
    transport_options: TransportOptions,
    http: reqwest::Client,
}

impl FunctionsClient {
    pub fn new(
        config: FunctionsConfig,
        transport_options: TransportOptions,
    ) -> Result<Self, ClientError> {
        let http = build_http_client(&transport_options)?;
        Ok(Self {
            config,
            transport_options,
            http,
        })
    }

    /// Build from [`FunctionsConfig::from_env`] with default transport options.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(FunctionsConfig::from_env()?, TransportOptions::default())
    }

    pub fn config(&self) -> &FunctionsConfig {
        &self.config
    }

    /// Ask for tattoo ideas around `context`.
    ///
    /// A response without a `suggestions` list yields no suggestions.
    pub async fn suggest(&self, context: &str) -> Result<Vec<Suggestion>, ClientError> {
        let url = self.config.endpoint(&self.config.suggest_path);
        debug!(%url, "requesting suggestions");

        let response = self
            .post(&url)
            .json(&SuggestRequest { context })
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_error_response(status, &body));
        }

        let body: SuggestResponse = response.json().await?;
        Ok(body.suggestions.unwrap_or_default())
    }

    /// Generate an image from a text prompt.
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ClientError> {
        if prompt.trim().is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let url = self.config.endpoint(&self.config.image_path);
        debug!(%url, "requesting image generation");

        let response = self
            .post(&url)
            .json(&ImageRequest { prompt })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::handle_error_response(status, &body));
        }

        let image: ImageResponse = serde_json::from_str(&body)?;
        match image.image_url {
            Some(image_url) if !image_url.is_empty() => Ok(GeneratedImage { image_url }),
            _ => Err(ClientError::ProviderError(
                image.error.unwrap_or_else(|| "no image returned".to_string()),
            )),
        }
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        authorized_post(&self.http, url, &self.config.api_key, &self.transport_options)
    }

    /// Handle function error responses.
    fn handle_error_response(status: StatusCode, body: &str) -> ClientError {
        match serde_json::from_str::<FunctionErrorResponse>(body) {
            Ok(FunctionErrorResponse { error: Some(error) }) => ClientError::ProviderError(error),
            _ => ClientError::ProviderError(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl ChatTransport for FunctionsClient {
    async fn open_chat_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<ByteStream, ClientError> {
        let request_body =
            ChatRequest::from_history(messages).ok_or(ClientError::EmptyConversation)?;
        let url = self.config.endpoint(&self.config.chat_path);

        let response = self
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ClientError::Connection {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match Self::handle_error_response(status, &body) {
                ClientError::ProviderError(message) => message,
                other => other.to_string(),
            };
            return Err(ClientError::Connection {
                status: Some(status.as_u16()),
                message,
            });
        }

        debug!(%status, "chat response accepted");
        Ok(response.byte_stream())
    }
}

#[derive(Debug, Deserialize)]
struct FunctionErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_message_is_used() {
        let err = FunctionsClient::handle_error_response(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":"Rate limit exceeded"}"#,
        );
        assert!(matches!(err, ClientError::ProviderError(ref m) if m == "Rate limit exceeded"));
    }

    #[test]
    fn raw_body_is_used_without_error_field() {
        let err = FunctionsClient::handle_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            ClientError::ProviderError(ref m) if m == "HTTP 502 Bad Gateway: upstream down"
        ));
    }

    #[tokio::test]
    async fn empty_history_is_rejected_before_any_request() {
        let client = FunctionsClient::new(
            FunctionsConfig::new("http://127.0.0.1:9", "key"),
            TransportOptions::default(),
        )
        .unwrap();

        let err = client.open_chat_stream(&[]).await.err().unwrap();
        assert!(matches!(err, ClientError::EmptyConversation));
    }

    #[test]
    fn invalid_proxy_fails_construction() {
        let result = FunctionsClient::new(
            FunctionsConfig::new("http://127.0.0.1:9", "key"),
            TransportOptions::new().with_proxy("http://[::1".to_string()),
        );
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected() {
        let client = FunctionsClient::new(
            FunctionsConfig::new("http://127.0.0.1:9", "key"),
            TransportOptions::default(),
        )
        .unwrap();

        assert!(matches!(
            client.generate_image("   ").await,
            Err(ClientError::EmptyPrompt)
        ));
    }
}
