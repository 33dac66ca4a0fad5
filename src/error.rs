//! Error types for modsense.

use std::time::Duration;

/// Top-level error type for the bot core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Admin error: {0}")]
    Admin(#[from] AdminError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-related errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the messaging/transport collaborator.
///
/// Enforcement steps treat every variant as best-effort: failures are
/// logged with the target and action, never propagated to the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Permission denied for {action} on {target}")]
    PermissionDenied { action: String, target: String },

    #[error("Target not found: {target}")]
    NotFound { target: String },

    #[error("Recipient unreachable: {target}")]
    Unreachable { target: String },

    #[error("Transport failure: {0}")]
    Other(String),
}

/// Validation errors from the administrative surface.
///
/// Raised synchronously before any state mutation; the message is meant
/// to be shown to the operator verbatim.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Severity threshold must be between 1 and 10, got {0}")]
    InvalidThreshold(i64),

    #[error("Unknown action '{0}' (expected none, warn, delete, timeout, kick, or ban)")]
    UnknownAction(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the bot core.
pub type Result<T> = std::result::Result<T, Error>;
