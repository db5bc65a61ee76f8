//! Kind-21999 status and error notices.

use crate::error::{ErrorCode, WireError};
use crate::event::{Event, EventDraft, Tag};
use crate::STATUS_KIND;

/// `status` tag keyword for in-progress notices.
pub const STATUS_PROCESSING: &str = "processing";

/// `status` tag keyword for terminal errors.
pub const STATUS_ERROR: &str = "error";

/// A parsed status notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotice {
    /// Request id this notice refers to.
    pub request_id: String,
    /// Requester public key the notice is tagged to.
    pub recipient: String,
    /// `status` tag keyword, e.g. `processing` or `error`.
    pub status: String,
    /// Error code, present only on terminal errors.
    pub error_code: Option<ErrorCode>,
    /// Human-readable message from the event content.
    pub message: String,
}

impl StatusNotice {
    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

/// Build a `processing` notice for a request being worked on.
pub fn build_processing(request_id: &str, requester: &str) -> EventDraft {
    EventDraft::new(
        STATUS_KIND,
        vec![
            Tag::new(["e", request_id]),
            Tag::new(["p", requester]),
            Tag::new(["status", STATUS_PROCESSING]),
        ],
        "Processing request",
    )
}

/// Build a terminal error notice carrying `error_code`.
pub fn build_error(request_id: &str, requester: &str, code: ErrorCode, message: &str) -> EventDraft {
    EventDraft::new(
        STATUS_KIND,
        vec![
            Tag::new(["e", request_id]),
            Tag::new(["p", requester]),
            Tag::new(["status", STATUS_ERROR]),
            Tag::new(["error_code", code.as_str()]),
        ],
        message,
    )
}

/// Parse a status event.
pub fn parse_status(event: &Event) -> Result<StatusNotice, WireError> {
    if event.kind != STATUS_KIND {
        return Err(WireError::UnexpectedKind(event.kind));
    }

    let request_id = event
        .tag_value("e")
        .ok_or(WireError::MissingTag("e"))?
        .to_string();
    let recipient = event
        .tag_value("p")
        .ok_or(WireError::MissingTag("p"))?
        .to_string();
    let status = event
        .tag_value("status")
        .ok_or(WireError::MissingTag("status"))?
        .to_string();
    let error_code = match event.tag_value("error_code") {
        Some(value) => Some(ErrorCode::parse(value).ok_or_else(|| WireError::InvalidTag {
            tag: "error_code",
            value: value.to_string(),
        })?),
        None => None,
    };

    Ok(StatusNotice {
        request_id,
        recipient,
        status,
        error_code,
        message: event.content.clone(),
    })
}

/// Request id a status notice correlates to, from its `e` tag.
pub fn status_request_id(event: &Event) -> Option<&str> {
    event.tag_value("e")
}
