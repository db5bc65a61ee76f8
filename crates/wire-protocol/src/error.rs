use serde::{Deserialize, Serialize};

/// Protocol error codes carried in `error_code` tags of status events.
///
/// The same set is used internally on both sides of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    FileTooLarge,
    InvalidHash,
    FileNotFound,
    ChunkMissing,
    IntegrityFailed,
    StorageFull,
    ResponseTimeout,
    MalformedRequest,
    InternalError,
}

impl ErrorCode {
    /// Wire form, e.g. `FILE_TOO_LARGE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::InvalidHash => "INVALID_HASH",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::ChunkMissing => "CHUNK_MISSING",
            ErrorCode::IntegrityFailed => "INTEGRITY_FAILED",
            ErrorCode::StorageFull => "STORAGE_FULL",
            ErrorCode::ResponseTimeout => "RESPONSE_TIMEOUT",
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Parse the wire form back into a code.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FILE_TOO_LARGE" => Some(ErrorCode::FileTooLarge),
            "INVALID_HASH" => Some(ErrorCode::InvalidHash),
            "FILE_NOT_FOUND" => Some(ErrorCode::FileNotFound),
            "CHUNK_MISSING" => Some(ErrorCode::ChunkMissing),
            "INTEGRITY_FAILED" => Some(ErrorCode::IntegrityFailed),
            "STORAGE_FULL" => Some(ErrorCode::StorageFull),
            "RESPONSE_TIMEOUT" => Some(ErrorCode::ResponseTimeout),
            "MALFORMED_REQUEST" => Some(ErrorCode::MalformedRequest),
            "INTERNAL_ERROR" => Some(ErrorCode::InternalError),
            _ => None,
        }
    }

    /// Default human-readable description.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::FileTooLarge => "File exceeds maximum size limit",
            ErrorCode::InvalidHash => "Invalid SHA256 hash format",
            ErrorCode::FileNotFound => "Requested file not found",
            ErrorCode::ChunkMissing => "One or more chunks missing",
            ErrorCode::IntegrityFailed => "File integrity verification failed",
            ErrorCode::StorageFull => "Storage capacity exceeded",
            ErrorCode::ResponseTimeout => "Timed out waiting for a response",
            ErrorCode::MalformedRequest => "Malformed request payload",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building or parsing protocol events.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed content: {0}")]
    MalformedContent(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("missing required tag: {0}")]
    MissingTag(&'static str),

    #[error("invalid value for tag {tag}: {value}")]
    InvalidTag { tag: &'static str, value: String },

    #[error("invalid file hash: {0}")]
    InvalidHash(String),

    #[error("unexpected event kind {0}")]
    UnexpectedKind(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: [ErrorCode; 9] = [
        ErrorCode::FileTooLarge,
        ErrorCode::InvalidHash,
        ErrorCode::FileNotFound,
        ErrorCode::ChunkMissing,
        ErrorCode::IntegrityFailed,
        ErrorCode::StorageFull,
        ErrorCode::ResponseTimeout,
        ErrorCode::MalformedRequest,
        ErrorCode::InternalError,
    ];

    #[test]
    fn codes_round_trip_through_wire_form() {
        for code in ALL_CODES {
            assert_eq!(ErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::parse("NOT_A_CODE"), None);
    }

    #[test]
    fn codes_round_trip_through_serde() {
        for code in ALL_CODES {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }
}
