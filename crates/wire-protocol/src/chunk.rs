//! Kind-24212 ephemeral chunk carrier events.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::chunker::{is_valid_file_hash, Chunk};
use crate::error::WireError;
use crate::event::{Event, EventDraft, Tag};
use crate::CHUNK_KIND;

/// A chunk recovered from a carrier event. The payload hash has not been
/// verified yet; callers check [`Chunk::verify`] before accepting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedChunk {
    /// Content address of the file this chunk belongs to.
    pub file_hash: String,
    pub chunk: Chunk,
    /// Unix-seconds expiration advertised for the carrier event.
    pub expiration: u64,
}

/// Build a signable carrier draft for one chunk of `file_hash`.
pub fn build_chunk_event(file_hash: &str, chunk: &Chunk, expiration: u64) -> EventDraft {
    EventDraft::new(
        CHUNK_KIND,
        vec![
            Tag::new(["file_hash", file_hash]),
            Tag::new(["chunk_index", chunk.index.to_string().as_str()]),
            Tag::new(["chunk_total", chunk.total.to_string().as_str()]),
            Tag::new(["chunk_hash", chunk.hash.as_str()]),
            Tag::new(["expiration", expiration.to_string().as_str()]),
        ],
        BASE64.encode(&chunk.bytes),
    )
}

/// Parse a carrier event back into a [`ReceivedChunk`].
pub fn parse_chunk_event(event: &Event) -> Result<ReceivedChunk, WireError> {
    if event.kind != CHUNK_KIND {
        return Err(WireError::UnexpectedKind(event.kind));
    }

    let file_hash = required_tag(event, "file_hash")?;
    if !is_valid_file_hash(file_hash) {
        return Err(WireError::InvalidHash(file_hash.to_string()));
    }

    let index = parse_numeric_tag(event, "chunk_index")? as u32;
    let total = parse_numeric_tag(event, "chunk_total")? as u32;
    let hash = required_tag(event, "chunk_hash")?.to_string();
    let expiration = parse_numeric_tag(event, "expiration")?;

    let bytes = BASE64.decode(&event.content)?;

    Ok(ReceivedChunk {
        file_hash: file_hash.to_string(),
        chunk: Chunk {
            index,
            total,
            bytes,
            hash,
        },
        expiration,
    })
}

fn required_tag<'a>(event: &'a Event, name: &'static str) -> Result<&'a str, WireError> {
    event.tag_value(name).ok_or(WireError::MissingTag(name))
}

fn parse_numeric_tag(event: &Event, name: &'static str) -> Result<u64, WireError> {
    let value = required_tag(event, name)?;
    value.parse().map_err(|_| WireError::InvalidTag {
        tag: name,
        value: value.to_string(),
    })
}
