use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendType;
use crate::types::TranslationRequest;

#[derive(Error, Debug)]
pub enum RelingoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Backend not registered: {0}")]
    NotRegistered(BackendType),

    #[error("Translator not initialized: {0}")]
    NotInitialized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{backend} error: {message}")]
    Backend { backend: BackendType, message: String },

    #[error(transparent)]
    Translation(#[from] Box<TranslationFailure>),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Batch task not found: {0}")]
    TaskNotFound(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, RelingoError>;

/// Failure surfaced by the HTTP transport after retries are exhausted,
/// or immediately for non-retryable responses.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// HTTP status, absent for network-level failures
    pub status: Option<u16>,
    pub body: Option<String>,
    /// Number of attempts made before giving up
    pub attempts: u32,
}

impl TransportError {
    /// Connection failures, timeouts and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => (500..600).contains(&status),
        }
    }
}

/// Stable error codes attached to failed translations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidApiKey,
    NetworkError,
    RateLimitExceeded,
    QuotaExceeded,
    UnsupportedLanguage,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Structured error raised by the translator pipeline, carrying the request
/// that failed and its classified error code.
#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct TranslationFailure {
    pub code: ErrorCode,
    pub message: String,
    pub request: TranslationRequest,
}

impl RelingoError {
    /// Error code for responses and logs. Pipeline failures keep the code
    /// assigned when they were wrapped.
    pub fn code(&self) -> ErrorCode {
        match self {
            RelingoError::Translation(failure) => failure.code,
            other => classify_error(other),
        }
    }
}

/// Map an error onto the fixed error-code taxonomy.
///
/// Structured transport statuses are checked first. Everything else falls
/// back to matching well-known fragments of the message, which is a
/// heuristic over provider wording and the single place to replace once
/// providers expose structured codes.
pub fn classify_error(error: &RelingoError) -> ErrorCode {
    match error {
        RelingoError::Translation(failure) => return failure.code,
        RelingoError::Transport(transport) => {
            let body = transport.body.as_deref().unwrap_or_default().to_lowercase();
            match transport.status {
                Some(401) | Some(403) => return ErrorCode::InvalidApiKey,
                Some(429) if body.contains("quota") => return ErrorCode::QuotaExceeded,
                Some(429) => return ErrorCode::RateLimitExceeded,
                None => return ErrorCode::NetworkError,
                _ => {}
            }
        }
        _ => {}
    }

    classify_message(&error.to_string())
}

fn classify_message(message: &str) -> ErrorCode {
    let message = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["api key", "api_key", "apikey", "401", "unauthorized", "authentication"]) {
        ErrorCode::InvalidApiKey
    } else if has(&["quota", "insufficient", "billing"]) {
        ErrorCode::QuotaExceeded
    } else if has(&["rate limit", "rate_limit", "429", "too many requests"]) {
        ErrorCode::RateLimitExceeded
    } else if has(&["network", "timeout", "timed out", "connect", "fetch", "dns"]) {
        ErrorCode::NetworkError
    } else if has(&[
        "unsupported language",
        "unsupported source language",
        "unsupported target language",
        "language not supported",
        "unsupported_language",
    ]) {
        ErrorCode::UnsupportedLanguage
    } else {
        ErrorCode::UnknownError
    }
}
