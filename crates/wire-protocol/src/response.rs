//! Kind-24211 response events.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::event::{Event, EventDraft, Tag};
use crate::RESPONSE_KIND;

/// Terminal status of a successfully handled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Stored,
    Available,
    Deleted,
}

/// Content payload of a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponsePayload {
    /// Content address of the file.
    pub hash: String,
    /// File size in bytes.
    pub size: u64,
    /// Number of chunks the file splits into.
    pub chunks: u32,
    /// Unix-seconds expiration of the stored record.
    pub expires: u64,
    pub status: ResponseStatus,
}

/// Build a signable response draft correlated to a request.
pub fn build_response(
    request_id: &str,
    requester: &str,
    payload: &ResponsePayload,
) -> Result<EventDraft, WireError> {
    Ok(EventDraft::new(
        RESPONSE_KIND,
        vec![
            Tag::new(["e", request_id]),
            Tag::new(["p", requester]),
            Tag::new(["file_hash", payload.hash.as_str()]),
            Tag::new(["expires", payload.expires.to_string().as_str()]),
        ],
        serde_json::to_string(payload)?,
    ))
}

/// Parse a response event's content payload.
pub fn parse_response(event: &Event) -> Result<ResponsePayload, WireError> {
    if event.kind != RESPONSE_KIND {
        return Err(WireError::UnexpectedKind(event.kind));
    }
    Ok(serde_json::from_str(&event.content)?)
}

/// Request id a response correlates to, from its `e` tag.
pub fn response_request_id(event: &Event) -> Option<&str> {
    event.tag_value("e")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ResponsePayload {
        ResponsePayload {
            hash: "ab".repeat(32),
            size: 1024,
            chunks: 1,
            expires: 1_700_086_400,
            status: ResponseStatus::Stored,
        }
    }

    #[test]
    fn response_round_trips() {
        let draft = build_response("req-id", "requester-pk", &payload()).unwrap();
        assert_eq!(draft.kind, RESPONSE_KIND);

        let event = Event {
            id: "00".repeat(32),
            pubkey: "ff".repeat(32),
            created_at: 1_700_000_000,
            kind: RESPONSE_KIND,
            tags: draft.tags.clone(),
            content: draft.content.clone(),
            sig: "11".repeat(64),
        };

        assert_eq!(response_request_id(&event), Some("req-id"));
        assert_eq!(event.tag_value("p"), Some("requester-pk"));
        assert_eq!(event.tag_value("file_hash"), Some("ab".repeat(32).as_str()));
        assert_eq!(event.tag_value("expires"), Some("1700086400"));
        assert_eq!(parse_response(&event).unwrap(), payload());
    }

    #[test]
    fn status_strings_match_the_schema() {
        for (status, expected) in [
            (ResponseStatus::Stored, "stored"),
            (ResponseStatus::Available, "available"),
            (ResponseStatus::Deleted, "deleted"),
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{expected}\""));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let event = Event {
            id: "00".repeat(32),
            pubkey: "ff".repeat(32),
            created_at: 0,
            kind: RESPONSE_KIND,
            tags: vec![],
            content: r#"{"hash":"","size":0,"chunks":0,"expires":0,"status":"lost"}"#.into(),
            sig: String::new(),
        };
        assert!(matches!(
            parse_response(&event),
            Err(WireError::MalformedContent(_))
        ));
    }
}
