//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, the Portkey AI gateway, and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! Only non-streaming chat completions are used; the first choice's text is
//! the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spurchat_core::error::ProviderError;
use spurchat_core::message::{ContextMessage, Role};
use spurchat_core::provider::*;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            headers: Vec::new(),
            client: build_client(DEFAULT_TIMEOUT),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "", // Ollama doesn't need a key
        )
    }

    /// Route requests through the Portkey AI gateway.
    ///
    /// With a virtual key Portkey resolves the upstream credentials itself;
    /// without one the request is forwarded to OpenAI using `openai_api_key`.
    pub fn portkey(
        portkey_api_key: impl Into<String>,
        virtual_key: Option<&str>,
        openai_api_key: Option<&str>,
        cache: bool,
    ) -> Self {
        let mut provider = Self::new(
            "portkey",
            "https://api.portkey.ai/v1",
            openai_api_key.unwrap_or_default(),
        )
        .with_header("x-portkey-api-key", portkey_api_key);

        provider = match virtual_key {
            Some(vk) => provider.with_header("x-portkey-virtual-key", vk),
            None => provider.with_header("x-portkey-provider", "openai"),
        };

        if cache {
            provider = provider.with_header("x-portkey-config", r#"{"cache":{"mode":"simple"}}"#);
        }

        provider
    }

    /// Send an extra header with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert context messages to OpenAI API format.
    fn to_api_messages(messages: &[ContextMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl spurchat_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .request(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyCompletion)?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: api_response.model.unwrap_or(request.model),
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(map_send_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::post};
    use spurchat_core::Provider;

    /// Serve a single canned chat-completions response on an ephemeral port.
    async fn spawn_upstream(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![
                ContextMessage::system("You are a support agent"),
                ContextMessage::user("What are your hours?"),
            ],
            temperature: 0.7,
            max_tokens: Some(256),
        }
    }

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(provider.name(), "openai");
        assert!(provider.base_url.contains("api.openai.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
        assert!(provider.api_key.is_empty());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://localhost:9000/v1/", "k");
        assert_eq!(provider.base_url(), "http://localhost:9000/v1");
    }

    #[test]
    fn portkey_with_virtual_key() {
        let provider = OpenAiCompatProvider::portkey("pk", Some("vk-openai"), None, true);
        assert_eq!(provider.name(), "portkey");
        assert!(provider.base_url.contains("portkey.ai"));
        assert!(
            provider
                .headers
                .contains(&("x-portkey-virtual-key".into(), "vk-openai".into()))
        );
        assert!(provider.headers.iter().any(|(k, _)| k == "x-portkey-config"));
        assert!(provider.api_key.is_empty());
    }

    #[test]
    fn portkey_without_virtual_key_forwards_to_openai() {
        let provider = OpenAiCompatProvider::portkey("pk", None, Some("sk-openai"), false);
        assert_eq!(provider.api_key, "sk-openai");
        assert!(
            provider
                .headers
                .contains(&("x-portkey-provider".into(), "openai".into()))
        );
        assert!(!provider.headers.iter().any(|(k, _)| k == "x-portkey-config"));
    }

    #[test]
    fn message_conversion() {
        let api_messages = OpenAiCompatProvider::to_api_messages(&request().messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[1].content.as_deref(), Some("What are your hours?"));
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "9 to 5 EST."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 4, "total_tokens": 24}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("9 to 5 EST."));
        assert_eq!(parsed.usage.unwrap().total_tokens, 24);
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let base = spawn_upstream(
            StatusCode::OK,
            serde_json::json!({
                "model": "gpt-4o",
                "choices": [
                    {"message": {"role": "assistant", "content": "First"}},
                    {"message": {"role": "assistant", "content": "Second"}}
                ]
            }),
        )
        .await;

        let provider = OpenAiCompatProvider::new("test", base, "sk-test");
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "First");
        assert_eq!(response.model, "gpt-4o");
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn complete_without_choices_is_empty_completion() {
        let base = spawn_upstream(StatusCode::OK, serde_json::json!({"choices": []})).await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyCompletion));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let base = spawn_upstream(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"error": {"message": "bad key"}}),
        )
        .await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-bad");
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let base = spawn_upstream(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": "upstream exploded"}),
        )
        .await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");
        match provider.complete(request()).await.unwrap_err() {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 500);
                assert!(message.contains("upstream exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_maps_to_malformed_response() {
        let base = spawn_upstream(StatusCode::OK, serde_json::json!({"choices": "nope"})).await;
        let provider = OpenAiCompatProvider::new("test", base, "sk-test");
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let provider = OpenAiCompatProvider::new("test", "http://127.0.0.1:9/v1", "sk-test")
            .with_timeout(Duration::from_secs(2));
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Network(_) | ProviderError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn extra_headers_are_sent() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap| async move {
                let tag = headers
                    .get("x-portkey-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("missing")
                    .to_string();
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": tag}}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = OpenAiCompatProvider::new("test", format!("http://{addr}/v1"), "")
            .with_header("x-portkey-api-key", "pk-123");
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "pk-123");
    }
}
