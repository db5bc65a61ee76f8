//! Kind-31999 server announcement events.

use serde_json::json;

use crate::error::WireError;
use crate::event::{Event, EventDraft, Tag};
use crate::{ANNOUNCEMENT_KIND, REQUEST_KIND, RESPONSE_KIND, SERVICE_D_TAG};

/// Parameters a server advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementInfo {
    pub name: String,
    pub about: String,
    pub max_file_size: u64,
    pub chunk_size: u64,
    pub retention_hours: u64,
}

/// A discovered server, parsed from an announcement event.
///
/// All advertised parameters are advisory; a missing or malformed number
/// simply leaves the field unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    /// Provider public key (hex).
    pub pubkey: String,
    /// Announcement `d` tag identifier.
    pub d_tag: String,
    pub name: Option<String>,
    pub about: Option<String>,
    pub max_file_size: Option<u64>,
    pub chunk_size: Option<u64>,
    pub retention_hours: Option<u64>,
    /// Creation time of the announcement, for freshness ranking.
    pub created_at: u64,
}

/// Build a signable announcement draft.
///
/// The content documents the accepted request shapes; only the tags are
/// load-bearing for discovery.
pub fn build_announcement(info: &AnnouncementInfo) -> Result<EventDraft, WireError> {
    let content = json!({
        "input_schema": {
            "type": "object",
            "oneOf": [
                {
                    "required": ["action", "data"],
                    "properties": {
                        "action": {"const": "store"},
                        "data": {"type": "string", "description": "base64 encoded file"},
                        "filename": {"type": "string", "optional": true}
                    }
                },
                {
                    "required": ["action", "hash"],
                    "properties": {
                        "action": {"const": "retrieve"},
                        "hash": {"type": "string", "pattern": "^[a-f0-9]{64}$"}
                    }
                },
                {
                    "required": ["action", "hash"],
                    "properties": {
                        "action": {"const": "delete"},
                        "hash": {"type": "string", "pattern": "^[a-f0-9]{64}$"}
                    }
                }
            ]
        }
    });

    Ok(EventDraft::new(
        ANNOUNCEMENT_KIND,
        vec![
            Tag::new(["d", SERVICE_D_TAG]),
            Tag::new(["k", REQUEST_KIND.to_string().as_str()]),
            Tag::new(["response_kind", RESPONSE_KIND.to_string().as_str()]),
            Tag::new(["name", info.name.as_str()]),
            Tag::new(["about", info.about.as_str()]),
            Tag::new(["max_file_size", info.max_file_size.to_string().as_str()]),
            Tag::new(["chunk_size", info.chunk_size.to_string().as_str()]),
            Tag::new(["retention_hours", info.retention_hours.to_string().as_str()]),
        ],
        serde_json::to_string(&content)?,
    ))
}

/// Parse an announcement into a [`ServerDescriptor`].
///
/// Rejects events that do not advertise handling of the request kind.
pub fn parse_announcement(event: &Event) -> Result<ServerDescriptor, WireError> {
    if event.kind != ANNOUNCEMENT_KIND {
        return Err(WireError::UnexpectedKind(event.kind));
    }

    let d_tag = event
        .tag_value("d")
        .ok_or(WireError::MissingTag("d"))?
        .to_string();

    let request_kind = REQUEST_KIND.to_string();
    if !event.tag_values("k").any(|value| value == request_kind) {
        return Err(WireError::MissingTag("k"));
    }

    Ok(ServerDescriptor {
        pubkey: event.pubkey.clone(),
        d_tag,
        name: event.tag_value("name").map(str::to_string),
        about: event.tag_value("about").map(str::to_string),
        max_file_size: numeric_tag(event, "max_file_size"),
        chunk_size: numeric_tag(event, "chunk_size"),
        retention_hours: numeric_tag(event, "retention_hours"),
        created_at: event.created_at,
    })
}

fn numeric_tag(event: &Event, name: &str) -> Option<u64> {
    event.tag_value(name).and_then(|value| value.parse().ok())
}
