//! Provider router — selects the correct LLM provider based on config.
//!
//! Handles provider creation and lookup by name. The chat service only ever
//! talks to the default provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use spurchat_config::AppConfig;
use spurchat_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// Every `[providers.<name>]` table becomes an OpenAI-compatible provider.
/// The default provider is always registered, falling back to the global
/// API key and the well-known base URL for its name.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);
    let timeout = Duration::from_secs(config.request_timeout_secs);

    for (name, provider_config) in &config.providers {
        if name == "portkey" {
            continue;
        }

        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        let mut provider =
            OpenAiCompatProvider::new(name, &base_url, &api_key).with_timeout(timeout);
        for (header, value) in &provider_config.headers {
            provider = provider.with_header(header, value);
        }

        router.register(name.clone(), Arc::new(provider));
    }

    // Portkey keeps its own credentials under [portkey]
    if let Some(portkey_key) = &config.portkey.api_key {
        let provider = OpenAiCompatProvider::portkey(
            portkey_key,
            config.portkey.virtual_key.as_deref(),
            config.api_key.as_deref(),
            config.portkey.cache,
        )
        .with_timeout(timeout);
        router.register("portkey", Arc::new(provider));
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);

        router.register(
            config.default_provider.clone(),
            Arc::new(
                OpenAiCompatProvider::new(&config.default_provider, &base_url, &api_key)
                    .with_timeout(timeout),
            ),
        );
    }

    tracing::debug!(
        default = %config.default_provider,
        providers = ?router.list(),
        "Provider router built"
    );

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "portkey" => "https://api.portkey.ai/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
