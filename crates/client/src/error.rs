use blobdvm_relay_client::RelayClientError;
use blobdvm_wire_protocol::{ErrorCode, WireError};

/// Failures surfaced by the client engine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no blob storage servers found")]
    NoServers,

    #[error("refusing to store an empty file")]
    EmptyFile,

    #[error("invalid file hash: {0}")]
    InvalidHash(String),

    #[error("server rejected request {request_id}: {code}: {message}")]
    Server {
        request_id: String,
        code: ErrorCode,
        message: String,
    },

    #[error("timed out waiting for a response to {request_id}")]
    ResponseTimeout { request_id: String },

    #[error("timed out collecting chunks: got {received}/{expected}")]
    ChunkMissing { received: usize, expected: usize },

    #[error("integrity check failed: {0}")]
    IntegrityFailed(String),

    #[error("notification stream closed")]
    StreamClosed,

    #[error(transparent)]
    Relay(#[from] RelayClientError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl ClientError {
    /// Protocol error code for this failure, for CLI surfacing.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Server { code, .. } => *code,
            ClientError::ResponseTimeout { .. } => ErrorCode::ResponseTimeout,
            ClientError::ChunkMissing { .. } => ErrorCode::ChunkMissing,
            ClientError::IntegrityFailed(_) => ErrorCode::IntegrityFailed,
            ClientError::InvalidHash(_) | ClientError::Wire(WireError::InvalidHash(_)) => {
                ErrorCode::InvalidHash
            }
            ClientError::EmptyFile | ClientError::Wire(_) => ErrorCode::MalformedRequest,
            ClientError::NoServers | ClientError::StreamClosed | ClientError::Relay(_) => {
                ErrorCode::InternalError
            }
        }
    }
}
