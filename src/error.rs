//! Error types for the generate → score → select pipeline.

use thiserror::Error;

/// Classifies a failure as transient (worth retrying) or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// HTTP statuses that signal a transient upstream condition.
pub const RETRYABLE_STATUSES: [u16; 4] = [408, 409, 425, 429];

const RETRY_SIGNALS: [&str; 7] = [
    "throttling",
    "rate limit",
    "too many requests",
    "temporarily",
    "retry",
    "timed out",
    "connection reset",
];

/// Whether a status code is retryable: 408/409/425/429 and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status) || (500..600).contains(&status)
}

/// Whether a free-form upstream message reads like a transient condition.
pub fn message_signals_retry(message: &str) -> bool {
    let lowered = message.to_lowercase();
    RETRY_SIGNALS.iter().any(|signal| lowered.contains(signal))
}

/// Typed failure of one provider call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Provider credentials missing: {0}")]
    MissingCredentials(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider connection error: {0}")]
    Connection(String),

    #[error("Provider request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed provider request: {0}")]
    MalformedRequest(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Provider error: {0}")]
    Other(String),
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::MissingCredentials(_) => false,
            ProviderError::MalformedRequest(_) => false,
            ProviderError::MalformedResponse(_) => false,
            ProviderError::RateLimited(_) => true,
            ProviderError::Timeout(_) => true,
            ProviderError::Connection(_) => true,
            ProviderError::Unavailable(_) => true,
            ProviderError::Status { status, .. } => is_retryable_status(*status),
            ProviderError::Other(message) => message_signals_retry(message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout(error.to_string())
        } else if error.is_connect() {
            ProviderError::Connection(error.to_string())
        } else if let Some(status) = error.status() {
            ProviderError::Status {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            ProviderError::MalformedResponse(error.to_string())
        } else if error.is_builder() {
            ProviderError::MalformedRequest(error.to_string())
        } else {
            ProviderError::Other(error.to_string())
        }
    }
}

/// Failure of one scoring call (vision evaluator or a single module).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    #[error("Scorer disabled: {0}")]
    Disabled(String),

    #[error("Scorer request failed: {0}")]
    Remote(#[from] ProviderError),

    #[error("Scorer response unusable: {0}")]
    MalformedResponse(String),

    #[error("Upstream evaluation error: {0}")]
    Upstream(String),
}

impl Retryable for ScoringError {
    fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Disabled(_) => false,
            ScoringError::Remote(err) => err.is_retryable(),
            ScoringError::MalformedResponse(_) => false,
            ScoringError::Upstream(message) => message_signals_retry(message),
        }
    }
}

/// Crate-wide error surfaced by the generator, selector, and pipeline.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No candidates were generated (providers: {})", providers.join(", "))]
    NoCandidates { providers: Vec<String> },

    #[error("Cannot select from an empty candidate set")]
    EmptyCandidateSet,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Pipeline run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
