//! Error taxonomy shared by the registries and the HTTP handler.

use serde::{Deserialize, Serialize};

/// Failures raised by an object store adapter or the codec layered on it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("decoding value at {key}: {message}")]
    Decode { key: String, message: String },
    #[error("encoding value for {key}: {message}")]
    Encode { key: String, message: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool { matches!(self, StoreError::NotFound(_)) }
}

/// Client-facing errors; the handler is the only place these become HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self { ApiError::BadRequest(msg.into()) }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ApiError::NotFound { kind, name: name.into() }
    }

    pub fn code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound { .. } => 404,
            ApiError::Conflict(_) => 409,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::NotFound { .. } => "NotFound",
            ApiError::Conflict(_) => "AlreadyExists",
            ApiError::PayloadTooLarge(_) => "RequestEntityTooLarge",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> Status {
        Status::failure(self.code(), self.reason(), self.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => ApiError::not_found("key", key),
            // Causes below are logged by the caller; clients get a generic message.
            StoreError::Decode { .. } | StoreError::Encode { .. } => ApiError::Internal("stored object could not be processed".into()),
            StoreError::Backend(_) => ApiError::Internal("storage backend failure".into()),
        }
    }
}

/// JSON status object returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub kind: String,
    pub status: String,
    pub message: String,
    pub reason: String,
    pub code: u16,
}

impl Status {
    pub fn failure(code: u16, reason: &str, message: impl Into<String>) -> Self {
        Self {
            kind: "Status".into(),
            status: "Failure".into(),
            message: message.into(),
            reason: reason.to_string(),
            code,
        }
    }
}
