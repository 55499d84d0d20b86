//! LLM provider trait definition.

use super::gemini::GeminiProvider;
use super::types::{CompletionOptions, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for LLM providers.
///
/// Every request asks the model for a JSON document and returns its raw text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider's name (e.g., "gemini").
    fn name(&self) -> &str;

    /// Get the model being used.
    fn model(&self) -> &str;

    /// Sends a single prompt and returns the model's JSON answer as text.
    async fn complete_json(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;

    /// Models able to generate content, sorted by name.
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;
}

/// The user-editable part of the settings needed to reach a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    pub api_key: String,
    pub model_name: String,
    pub proxy_url: String,
}

impl AiSettings {
    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Builds providers from the current settings, which can change at runtime.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, settings: &AiSettings) -> Result<Arc<dyn LlmProvider>, LlmError>;
}

pub struct GeminiProviderFactory {
    base_url: String,
    timeout: Duration,
}

impl GeminiProviderFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl ProviderFactory for GeminiProviderFactory {
    fn create(&self, settings: &AiSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
        if !settings.has_key() {
            return Err(LlmError::NotConfigured("API key not set".to_string()));
        }
        let proxy = Some(settings.proxy_url.trim()).filter(|p| !p.is_empty());
        let provider = GeminiProvider::new(
            self.base_url.clone(),
            settings.api_key.trim(),
            settings.model_name.trim(),
            proxy,
            self.timeout,
        )?;
        Ok(Arc::new(provider))
    }
}
