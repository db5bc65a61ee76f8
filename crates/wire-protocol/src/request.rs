//! Kind-24210 request events.

use serde::{Deserialize, Serialize};

use crate::chunker::is_valid_file_hash;
use crate::error::WireError;
use crate::event::{Event, EventDraft, Tag};
use crate::{ANNOUNCEMENT_KIND, REQUEST_KIND, SERVICE_D_TAG};

/// Content payload of a request, dispatched on the `action` field.
///
/// Unknown extra fields are tolerated; an unknown action is a parse error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RequestPayload {
    Store {
        /// Base64-encoded file bytes (RFC 4648, padded).
        data: String,
        /// Advisory original file name, not part of the identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Retrieve {
        hash: String,
    },
    Delete {
        hash: String,
    },
}

/// A request parsed off the wire, with its correlation handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Event id of the request, used to correlate the response.
    pub request_id: String,
    /// Requester public key (hex).
    pub requester: String,
    pub payload: RequestPayload,
}

/// Addressable coordinate of a server announcement, as used in `a` tags.
pub fn server_address(server_pubkey: &str) -> String {
    format!("{ANNOUNCEMENT_KIND}:{server_pubkey}:{SERVICE_D_TAG}")
}

/// Build a signable request draft addressed to `server_pubkey`.
pub fn build_request(
    server_pubkey: &str,
    payload: &RequestPayload,
) -> Result<EventDraft, WireError> {
    if let RequestPayload::Retrieve { hash } | RequestPayload::Delete { hash } = payload {
        if !is_valid_file_hash(hash) {
            return Err(WireError::InvalidHash(hash.clone()));
        }
    }

    Ok(EventDraft::new(
        REQUEST_KIND,
        vec![Tag::new(["a", server_address(server_pubkey).as_str()])],
        serde_json::to_string(payload)?,
    ))
}

/// Parse and validate a request event.
pub fn parse_request(event: &Event) -> Result<ParsedRequest, WireError> {
    if event.kind != REQUEST_KIND {
        return Err(WireError::UnexpectedKind(event.kind));
    }

    let payload: RequestPayload = serde_json::from_str(&event.content)?;
    if let RequestPayload::Retrieve { hash } | RequestPayload::Delete { hash } = &payload {
        if !is_valid_file_hash(hash) {
            return Err(WireError::InvalidHash(hash.clone()));
        }
    }

    Ok(ParsedRequest {
        request_id: event.id.clone(),
        requester: event.pubkey.clone(),
        payload,
    })
}

/// True when the request's `a` tag addresses the given server.
pub fn addresses_server(event: &Event, server_pubkey: &str) -> bool {
    let address = server_address(server_pubkey);
    event.tag_values("a").any(|value| value == address)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_event(content: &str) -> Event {
        Event {
            id: "aa".repeat(32),
            pubkey: "bb".repeat(32),
            created_at: 1_700_000_000,
            kind: REQUEST_KIND,
            tags: vec![Tag::new(["a", server_address(&"cc".repeat(32)).as_str()])],
            content: content.to_string(),
            sig: "dd".repeat(64),
        }
    }

    #[test]
    fn store_request_round_trips() {
        let payload = RequestPayload::Store {
            data: "aGVsbG8=".to_string(),
            filename: Some("hello.txt".to_string()),
        };
        let draft = build_request(&"cc".repeat(32), &payload).unwrap();
        assert_eq!(draft.kind, REQUEST_KIND);
        assert_eq!(
            draft.tags[0].value().unwrap(),
            format!("31999:{}:blob-storage-v1", "cc".repeat(32))
        );

        let parsed = parse_request(&request_event(&draft.content)).unwrap();
        assert_eq!(parsed.payload, payload);
        assert_eq!(parsed.request_id, "aa".repeat(32));
        assert_eq!(parsed.requester, "bb".repeat(32));
    }

    #[test]
    fn retrieve_request_validates_hash() {
        let good = RequestPayload::Retrieve {
            hash: "ab".repeat(32),
        };
        assert!(build_request("pk", &good).is_ok());

        let bad = RequestPayload::Retrieve {
            hash: "not-a-hash".to_string(),
        };
        assert!(matches!(
            build_request("pk", &bad),
            Err(WireError::InvalidHash(_))
        ));

        let event = request_event(r#"{"action":"retrieve","hash":"XYZ"}"#);
        assert!(matches!(
            parse_request(&event),
            Err(WireError::InvalidHash(_))
        ));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let event = request_event(r#"{"action":"shred","hash":"00"}"#);
        assert!(matches!(
            parse_request(&event),
            Err(WireError::MalformedContent(_))
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let event = request_event("{not json");
        assert!(matches!(
            parse_request(&event),
            Err(WireError::MalformedContent(_))
        ));
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let hash = "ef".repeat(32);
        let event = request_event(&format!(
            r#"{{"action":"delete","hash":"{hash}","reason":"cleanup"}}"#
        ));
        let parsed = parse_request(&event).unwrap();
        assert_eq!(parsed.payload, RequestPayload::Delete { hash });
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut event = request_event(r#"{"action":"retrieve","hash":""}"#);
        event.kind = 1;
        assert!(matches!(
            parse_request(&event),
            Err(WireError::UnexpectedKind(1))
        ));
    }

    #[test]
    fn addressing_matches_only_the_target_server() {
        let server = "cc".repeat(32);
        let event = request_event("{}");
        assert!(addresses_server(&event, &server));
        assert!(!addresses_server(&event, &"ee".repeat(32)));
    }
}
