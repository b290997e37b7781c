//! Error types for the ragline workflow engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types that can occur while building or running a workflow.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed workflow definition. Fatal at build time, never recoverable
    /// at run time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A step's underlying call failed or returned invalid data. Aborts the
    /// current run only.
    #[error("Step '{step}' failed: {source}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The executor's defensive step ceiling was hit. Indicates a branch
    /// function that stopped honoring its cycle bound.
    #[error("Cycle bound exceeded after {steps} steps")]
    CycleBoundExceeded {
        /// Number of steps executed before the ceiling was hit.
        steps: usize,
    },

    /// The event subscriber disconnected; the run stops emitting and aborts.
    #[error("Run was cancelled by the caller")]
    Cancelled,

    /// An external call timed out.
    #[error("External call timed out")]
    Timeout,

    /// Serialization/Deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error.
    #[error("Error: {0}")]
    Generic(#[from] eyre::Report),
}

impl EngineError {
    /// Create a new configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap a cause as a step failure.
    pub fn step(
        step: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Step {
            step: step.into(),
            source: source.into(),
        }
    }

    /// Name of the failing step, if this is a step failure.
    pub fn failing_step(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}
