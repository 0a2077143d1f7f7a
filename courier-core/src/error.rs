//! Error types for the Courier routing core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the completion service, skills, configuration, routing rules,
//! and the pre-pass transformers.

/// Top-level error type for the Courier core library.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Skill error: {0}")]
    Skill(#[from] SkillError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the generative completion service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from skill registration and execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkillError {
    #[error("Skill not found: {name}")]
    NotFound { name: String },

    #[error("Skill already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid command pattern for skill '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Invalid arguments for skill '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Skill '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Skill '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

impl SkillError {
    /// Short machine-readable kind, used in logs and dispatch results.
    pub fn kind(&self) -> &'static str {
        match self {
            SkillError::NotFound { .. } => "not_found",
            SkillError::AlreadyRegistered { .. } => "already_registered",
            SkillError::InvalidPattern { .. } => "invalid_pattern",
            SkillError::InvalidArguments { .. } => "invalid_arguments",
            SkillError::ExecutionFailed { .. } => "execution_failed",
            SkillError::Timeout { .. } => "timeout",
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    Parse { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        match &err.kind {
            figment::error::Kind::MissingField(field) => ConfigError::MissingField {
                field: if err.path.is_empty() {
                    field.to_string()
                } else {
                    format!("{}.{}", err.path.join("."), field)
                },
            },
            _ => ConfigError::Parse {
                message: err.to_string(),
            },
        }
    }
}

/// Errors from the pattern rule table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("Rule '{rule}' has an invalid pattern: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Rule '{later}' is shadowed by earlier rule '{earlier}' on example \"{example}\"")]
    ShadowedRule {
        earlier: String,
        later: String,
        example: String,
    },
}

/// Failures of the optional pre-pass transformers. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("Intent decomposition failed: {message}")]
    Decomposition { message: String },

    #[error("Conversation state unavailable: {message}")]
    StateUnavailable { message: String },
}

/// A type alias for results using the top-level `CourierError`.
pub type Result<T> = std::result::Result<T, CourierError>;
