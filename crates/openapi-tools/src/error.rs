//! Error types for `unrelated-openapi-tools`.
//!
//! Errors are split by lifetime: [`LoadError`] aborts startup (no usable registry),
//! [`InvocationError`] is scoped to a single tool call and always ends up inside a failed
//! response envelope.

use serde_json::Value;
use thiserror::Error;

/// Load-time errors. The process should not start when one of these is returned.
#[derive(Error, Debug)]
pub enum LoadError {
    /// No configuration layer produced a spec reference, or the referenced file is missing.
    #[error("Spec not found: {0}")]
    SpecNotFound(String),

    #[error("OpenAPI error: failed to fetch spec from '{location}': {message}")]
    SpecFetch { location: String, message: String },

    /// Structurally invalid spec. `location` is a JSON pointer into the document when known.
    #[error("OpenAPI error: failed to parse spec at '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// Two source fields map to the same tool argument name.
    #[error("Parameter collision: {0}")]
    ParamCollision(String),

    #[error("Spec hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Configuration errors (invalid values, missing base URL in real mode).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoadError {
    pub(crate) fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpecParse {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Stable error kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpecNotFound(_) => "SpecNotFoundError",
            Self::SpecFetch { .. } => "SpecFetchError",
            Self::SpecParse { .. } | Self::ParamCollision(_) | Self::HashMismatch { .. } => {
                "SpecParseError"
            }
            Self::Config(_) => "ConfigError",
        }
    }
}

/// Per-invocation errors. Always recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Argument '{field}' expected {expected}, got {received}")]
    TypeMismatch {
        field: String,
        expected: String,
        received: Value,
    },

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("API returned {status}: {body}")]
    Upstream { status: u16, body: Value },

    #[error("Network error: {0}")]
    Network(String),
}

impl InvocationError {
    /// Stable error kind name, as reported in the envelope's `error.kind`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "UnknownToolError",
            Self::MissingArgument(_) => "MissingArgumentError",
            Self::TypeMismatch { .. } => "TypeMismatchError",
            Self::UnknownArgument(_) => "UnknownArgumentError",
            Self::Upstream { .. } => "UpstreamError",
            Self::Network(_) => "NetworkError",
        }
    }
}

/// Result type alias for load-time operations.
pub type Result<T> = std::result::Result<T, LoadError>;
