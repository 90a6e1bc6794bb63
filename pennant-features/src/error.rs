//! Error types for the decision engine.
//!
//! Evaluation never surfaces these to callers; they are returned from the
//! definition-loading and analysis paths only.

use pennant_config::ConfigError;
use thiserror::Error;

/// Result type for engine operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Engine errors.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A flag or experiment definition is internally inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Sample counts handed to the statistics engine are unusable
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// A planning parameter (rate, alpha, power, effect) is out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Identity or definition collaborator could not be reached
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A collaborator call exceeded its budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Event sink rejected an interaction
    #[error("Event sink error: {0}")]
    Sink(String),

    /// Definition document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Settings could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FeatureError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid sample error
    pub fn invalid_sample<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSample(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create an upstream unavailable error
    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    /// Whether the error stems from a collaborator rather than bad input
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for FeatureError {
    fn from(err: serde_json::Error) -> Self {
        FeatureError::Serialization(err.to_string())
    }
}
