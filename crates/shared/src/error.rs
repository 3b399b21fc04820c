use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON error envelope the masking service emits for rejected requests,
/// both as non-2xx bodies and inside HTTP 200 `status: "error"` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_error: Option<String>,
    #[serde(default)]
    pub fallback_used: bool,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            debug_error: None,
            fallback_used: false,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceException {
    pub message: String,
    pub debug_error: Option<String>,
}

impl ServiceException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            debug_error: None,
        }
    }
}

impl From<ServiceError> for ServiceException {
    fn from(value: ServiceError) -> Self {
        Self {
            message: value.message,
            debug_error: value.debug_error,
        }
    }
}
