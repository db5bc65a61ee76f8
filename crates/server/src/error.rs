use blobdvm_relay_client::RelayClientError;
use blobdvm_wire_protocol::{ErrorCode, WireError};

/// Failures that abort the server run loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("relay error: {0}")]
    Relay(#[from] RelayClientError),

    #[error("codec error: {0}")]
    Wire(#[from] WireError),
}

/// Request-handler failures surfaced to the requester as `error_code` tags.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("file exceeds maximum size limit")]
    FileTooLarge,

    #[error("requested file not found")]
    FileNotFound,

    #[error("storage capacity exceeded")]
    StorageFull,

    #[error("refusing to store an empty payload")]
    EmptyPayload,

    #[error("invalid base64 payload: {0}")]
    BadPayload(#[from] base64::DecodeError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayClientError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Protocol error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::FileTooLarge => ErrorCode::FileTooLarge,
            HandlerError::FileNotFound => ErrorCode::FileNotFound,
            HandlerError::StorageFull => ErrorCode::StorageFull,
            HandlerError::EmptyPayload | HandlerError::BadPayload(_) => ErrorCode::MalformedRequest,
            HandlerError::Relay(_) | HandlerError::Internal(_) => ErrorCode::InternalError,
        }
    }
}
