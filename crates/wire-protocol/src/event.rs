//! Relay event model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Simple tag wrapper preserving tag fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(fields.into_iter().map(Into::into).collect())
    }

    /// Tag name, i.e. the first field.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Primary tag value, i.e. the second field.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Signed relay event with the canonical `id, pubkey, kind, created_at,
/// tags, content, sig` shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 of the canonical serialization).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp of creation, in seconds.
    pub created_at: u64,
    /// Kind number, e.g. `24210`.
    pub kind: u16,
    /// Arbitrary tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Signature over the event hash (hex).
    pub sig: String,
}

impl Event {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name() == Some(name))
            .and_then(Tag::value)
    }

    /// Values of every tag named `name`, in order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.name() == Some(name))
            .filter_map(Tag::value)
    }
}

/// An event awaiting identity: everything the author provides before the
/// relay-client assigns `id`, `pubkey`, `created_at` and `sig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl EventDraft {
    pub fn new<S: Into<String>>(kind: u16, tags: Vec<Tag>, content: S) -> Self {
        Self {
            kind,
            tags,
            content: content.into(),
        }
    }
}

/// Hex SHA-256 of the canonical `[0, pubkey, created_at, kind, tags, content]`
/// serialization, as relays compute event ids.
pub fn canonical_event_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Tag],
    content: &str,
) -> String {
    let canonical = serde_json::to_string(&(0u8, pubkey, created_at, kind, tags, content))
        .unwrap_or_default();
    sha256_hex(canonical.as_bytes())
}

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Current wall-clock time as unsigned Unix seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Kinds in `[20000, 30000)` are forwarded but not retained by relays.
pub fn is_ephemeral_kind(kind: u16) -> bool {
    (20_000..30_000).contains(&kind)
}

/// Kinds in `[30000, 40000)` are addressed by `(kind, pubkey, d-tag)` and
/// superseded by later events with the same triple.
pub fn is_parameterized_replaceable_kind(kind: u16) -> bool {
    (30_000..40_000).contains(&kind)
}
