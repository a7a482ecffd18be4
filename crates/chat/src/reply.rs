//! Reply generation. Never fails: provider trouble becomes a canned reply.

use spurchat_core::message::ContextMessage;
use spurchat_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Returned when the provider cannot be reached or errors out.
pub const FALLBACK_REPLY: &str = "I'm having trouble connecting right now. Please try again later.";

/// Returned when the provider answers with no text.
pub const EMPTY_REPLY: &str = "I apologize, I couldn't generate a response.";

/// Wraps an injected provider with the model settings used for every call.
pub struct ReplyGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ReplyGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Produce the assistant's reply for an assembled context.
    pub async fn generate(&self, context: &[ContextMessage]) -> String {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: context.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self.provider.complete(request).await {
            Ok(response) if response.content.trim().is_empty() => {
                warn!(provider = %self.provider.name(), "Provider returned an empty completion");
                EMPTY_REPLY.to_string()
            }
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    debug!(
                        model = %response.model,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Completion received"
                    );
                }
                response.content
            }
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "LLM call failed, using fallback reply");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spurchat_core::error::ProviderError;
    use spurchat_core::provider::{ProviderResponse, Usage};
    use std::sync::Mutex;

    /// Returns a fixed outcome and records the last request.
    struct Scripted {
        outcome: Result<String, ProviderError>,
        seen: Mutex<Option<ProviderRequest>>,
    }

    impl Scripted {
        fn new(outcome: Result<String, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let model = request.model.clone();
            *self.seen.lock().unwrap() = Some(request);
            self.outcome.clone().map(|content| ProviderResponse {
                content,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model,
            })
        }
    }

    fn context() -> Vec<ContextMessage> {
        vec![ContextMessage::system("sys"), ContextMessage::user("hi")]
    }

    #[tokio::test]
    async fn passes_provider_text_through() {
        let provider = Scripted::new(Ok("Hello! Welcome to Spur Mart.".into()));
        let generator = ReplyGenerator::new(provider.clone(), "gpt-4o")
            .with_temperature(0.2)
            .with_max_tokens(128);

        let reply = generator.generate(&context()).await;
        assert_eq!(reply, "Hello! Welcome to Spur Mart.");

        let seen = provider.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.model, "gpt-4o");
        assert_eq!(seen.messages, context());
        assert_eq!(seen.max_tokens, Some(128));
    }

    #[tokio::test]
    async fn provider_errors_become_fallback() {
        for err in [
            ProviderError::Network("connection refused".into()),
            ProviderError::AuthenticationFailed("bad key".into()),
            ProviderError::RateLimited { retry_after_secs: 5 },
            ProviderError::EmptyCompletion,
            ProviderError::Timeout("60s".into()),
        ] {
            let generator = ReplyGenerator::new(Scripted::new(Err(err)), "gpt-4o");
            assert_eq!(generator.generate(&context()).await, FALLBACK_REPLY);
        }
    }

    #[tokio::test]
    async fn blank_completion_becomes_apology() {
        let generator = ReplyGenerator::new(Scripted::new(Ok("  \n".into())), "gpt-4o");
        assert_eq!(generator.generate(&context()).await, EMPTY_REPLY);
    }
}
