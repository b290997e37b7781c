//! Error types for agent operations.

use ragline_core::error::EngineError;
use thiserror::Error;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for agent operations.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model error: {0}")]
    Model(String),

    /// The model's structured payload did not match the requested schema.
    /// Never silently repaired; the calling step fails.
    #[error("Model output did not match the expected schema: {0}")]
    SchemaInvalid(String),

    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AgentError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    /// Create a schema mismatch error
    pub fn schema_invalid(message: impl Into<String>) -> Self {
        Self::SchemaInvalid(message.into())
    }

    /// Create a tool failure error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a retrieval error
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a streaming error
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming(message.into())
    }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Model(_) | Self::Retrieval(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<genai::Error> for AgentError {
    fn from(err: genai::Error) -> Self {
        Self::Model(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Retrieval(err.to_string())
        }
    }
}

// Integration with ragline-core: timeouts map onto the engine's timeout
// variant, everything else rides the report escape hatch and gets wrapped
// into a step failure by the executor.
impl From<AgentError> for EngineError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Timeout(_) => EngineError::Timeout,
            err => EngineError::Generic(eyre::Report::new(err)),
        }
    }
}
