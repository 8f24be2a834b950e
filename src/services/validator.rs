//! Inbound `message` payload validation.
//!
//! Pure function of its input. Content is returned verbatim; trimming is only
//! used to decide whether it is blank.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ack::ErrorCode;

/// A validated `{content, public}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub content: String,
    pub public: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
    #[error("content too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

impl ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "E_INVALID_PAYLOAD",
            Self::PayloadTooLarge { .. } => "E_PAYLOAD_TOO_LARGE",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
        }
    }
}

/// Check a raw event argument and extract the payload.
///
/// # Errors
///
/// - [`ValidationError::InvalidPayload`] if the payload is missing or not an
///   object, `content` is missing, not a string or blank, or `public` is
///   missing or not a boolean.
/// - [`ValidationError::PayloadTooLarge`] if `content` exceeds `max_content_bytes`.
pub fn validate(raw: Option<&Value>, max_content_bytes: usize) -> Result<MessagePayload, ValidationError> {
    let Some(object) = raw.and_then(Value::as_object) else {
        return Err(ValidationError::InvalidPayload("payload must be an object"));
    };

    let content = match object.get("content") {
        None => return Err(ValidationError::InvalidPayload("content required")),
        Some(Value::String(s)) => s,
        Some(_) => return Err(ValidationError::InvalidPayload("content must be a string")),
    };

    let public = match object.get("public") {
        None => return Err(ValidationError::InvalidPayload("public required")),
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(ValidationError::InvalidPayload("public must be a boolean")),
    };

    if content.len() > max_content_bytes {
        return Err(ValidationError::PayloadTooLarge { len: content.len(), max: max_content_bytes });
    }

    if content.trim().is_empty() {
        return Err(ValidationError::InvalidPayload("content must not be empty"));
    }

    Ok(MessagePayload { content: content.clone(), public })
}

#[cfg(test)]
#[path = "validator_test.rs"]
mod tests;
