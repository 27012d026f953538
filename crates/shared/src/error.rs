use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload returned by the backend for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct TdError {
    pub code: i32,
    pub message: String,
}

impl TdError {
    pub const BAD_REQUEST: i32 = 400;
    pub const UNAUTHORIZED: i32 = 401;
    pub const NOT_FOUND: i32 = 404;
    pub const ABORTED: i32 = 500;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Result delivered for requests still pending when the handle closes.
    pub fn aborted() -> Self {
        Self::new(Self::ABORTED, "Request aborted")
    }
}
