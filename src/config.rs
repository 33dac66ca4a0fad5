//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_TIMEOUT};

/// Runtime configuration, sourced from the environment.
#[derive(Clone)]
pub struct BotConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_base: String,
    pub db_path: PathBuf,
    pub tuning: Tuning,
}

/// Pipeline tunables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Judgment cache entry lifetime.
    pub cache_ttl: Duration,
    /// Judgment cache soft capacity.
    pub cache_capacity: usize,
    /// Hard bound on one AI moderation call.
    pub judge_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            cache_capacity: 1000,
            judge_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables. `OPENAI_API_KEY`
    /// is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let model = std::env::var("MODSENSE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_base =
            std::env::var("MODSENSE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let db_path = std::env::var("MODSENSE_DB_PATH")
            .unwrap_or_else(|_| "./data/modsense.db".to_string());

        let mut tuning = Tuning::default();
        if let Ok(raw) = std::env::var("MODSENSE_JUDGE_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MODSENSE_JUDGE_TIMEOUT_SECS".to_string(),
                message: format!("expected an integer number of seconds, got '{raw}'"),
            })?;
            tuning.judge_timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            model,
            api_base,
            db_path: PathBuf::from(db_path),
            tuning,
        })
    }
}
