use shared::{
    domain::{AuthPhase, FileId},
    error::TdError,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("{request} failed: {error}")]
    Transport {
        request: &'static str,
        error: TdError,
    },
    #[error("{operation} requires auth phase {expected:?}, current phase is {actual:?}")]
    InvalidState {
        operation: &'static str,
        expected: AuthPhase,
        actual: AuthPhase,
    },
    #[error("transport dropped the callback for {request} without a result")]
    ResponseDropped { request: &'static str },
    #[error("client is closed")]
    Closed,
    #[error("unexpected {received} result for {request}")]
    UnexpectedResponse {
        request: &'static str,
        received: &'static str,
    },
    #[error("download of file {file_id} was rejected")]
    DownloadRejected { file_id: FileId },
}

impl ClientError {
    /// Backend error payload, when the failure came from the remote side.
    pub fn td_error(&self) -> Option<&TdError> {
        match self {
            ClientError::Transport { error, .. } => Some(error),
            _ => None,
        }
    }
}
