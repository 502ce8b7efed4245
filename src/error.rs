//! Error types for investigator-core.

use thiserror::Error;

/// Result type alias using investigator-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during investigation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An entity identifier or filter value did not match its expected format.
    #[error("invalid format for {field}: {value}")]
    InvalidFormat { field: String, value: String },

    /// A domain analyzer raised during execution; local to that analyzer.
    #[error("analyzer {domain} failed: {message}")]
    AnalyzerFailure { domain: String, message: String },

    /// A comparison could not proceed because one side of the window had no data.
    #[error("insufficient data: {side}")]
    InsufficientData { side: String },

    /// The warehouse could not be reached or returned a connection-level failure.
    #[error("warehouse unavailable: {0}")]
    WarehouseUnavailable(String),

    /// An operation exceeded its allotted time.
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// The LLM collaborator rejected a prompt for exceeding its context window.
    #[error("LLM context length exceeded: {0}")]
    LLMContextLengthExceeded(String),

    /// The requested LLM model is not available from the provider.
    #[error("LLM model not found: {0}")]
    LLMModelNotFound(String),

    /// The LLM provider returned an API-level error.
    #[error("LLM API error: {provider} - {message}")]
    LLMAPIError { provider: String, message: String },

    /// The orchestrator's recursion limit was reached.
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimit { limit: u32 },

    /// The investigation was cancelled before completion.
    #[error("investigation cancelled")]
    Cancelled,

    /// A comparison or report was requested over a window with no analysis data at all.
    #[error("no analysis data available")]
    NoAnalysisData,

    /// A warehouse query failed at the driver or SQL level.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A query returned more rows than the configured safety limit.
    #[error("query returned too many rows (limit {limit})")]
    TooManyRows { limit: usize },

    /// Persistence (investigation state store, artifact registry) failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error not covered by a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_format(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidFormat {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn analyzer_failure(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AnalyzerFailure {
            domain: domain.into(),
            message: message.into(),
        }
    }

    pub fn insufficient_data(side: impl Into<String>) -> Self {
        Self::InsufficientData { side: side.into() }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LLMAPIError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn recursion_limit(limit: u32) -> Self {
        Self::RecursionLimit { limit }
    }

    /// Whether this error should abort the whole investigation or may be
    /// recorded against a single analyzer/detector and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::WarehouseUnavailable(_)
                | Error::RecursionLimit { .. }
                | Error::Cancelled
                | Error::NoAnalysisData
                | Error::Storage(_)
                | Error::Config(_)
                | Error::Internal(_)
        )
    }
}
