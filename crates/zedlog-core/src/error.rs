//! Structured errors for log loading, persistence and replay

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedLog,
    UnknownLoggerType,
    InvalidPath,
    Io,
    ReplayAlreadyStarted,
    ActuationFailed,
}

/// Low-level failure while decoding an event from a node or token stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing attribute `{attr}` on <{tag}>")]
    MissingAttribute { tag: String, attr: String },
    #[error("attribute `{attr}` has invalid value {value:?}")]
    InvalidValue { attr: String, value: String },
    #[error("unknown event type {0:?}")]
    UnknownEventType(String),
    #[error("expected <{expected}>, found <{found}>")]
    UnexpectedTag { expected: String, found: String },
    #[error("token stream ended before `{0}`")]
    UnexpectedEnd(&'static str),
    #[error("invalid token {token:?} for `{field}`")]
    InvalidToken { field: &'static str, token: String },
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn malformed_log(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedLog, message)
    }

    pub fn unknown_logger_type(tag: &str, known: Vec<String>) -> Self {
        Self::new(
            ErrorCode::UnknownLoggerType,
            format!("No data logger registered for type: {}", tag),
        )
        .with_suggestions(known)
    }

    pub fn invalid_path(path: &Path, reason: &str) -> Self {
        Self::new(
            ErrorCode::InvalidPath,
            format!("{}: {}", path.display(), reason),
        )
        .with_context(serde_json::json!({ "path": path.display().to_string() }))
    }

    pub fn replay_already_started() -> Self {
        Self::new(
            ErrorCode::ReplayAlreadyStarted,
            "Replay tool already ran; construct a new one to replay again",
        )
    }

    pub fn actuation_failed(event: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::ActuationFailed,
            format!("Simulating {} failed: {}", event, reason),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::malformed_log(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Self::malformed_log(format!("XML: {}", e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}
