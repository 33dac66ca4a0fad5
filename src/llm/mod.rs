//! Language-model access: the provider trait and its OpenAI-compatible
//! implementation.

pub mod openai;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::LlmError;
pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Settings for constructing a provider.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Build the configured provider behind the trait object the rest of the
/// crate works against.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = openai::OpenAiProvider::new(
        config.api_key.clone(),
        config.api_base.clone(),
        config.model.clone(),
        config.timeout,
    )?;
    Ok(Arc::new(provider))
}
