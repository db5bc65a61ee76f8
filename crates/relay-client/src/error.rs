/// Errors surfaced by relay transports.
///
/// Upstream error types are wrapped directly so callers keep the full
/// `source()` chain.
#[derive(Debug, thiserror::Error)]
pub enum RelayClientError {
    #[error("key error: {0}")]
    Keys(#[from] nostr_sdk::key::Error),

    #[error("relay error: {0}")]
    Client(#[from] nostr_sdk::client::Error),

    #[error("event building error: {0}")]
    Builder(#[from] nostr_sdk::event::builder::Error),

    #[error("tag error: {0}")]
    Tag(#[from] nostr_sdk::event::tag::Error),

    #[error("event error: {0}")]
    Event(#[from] nostr_sdk::event::Error),

    #[error("event codec error: {0}")]
    Json(#[from] serde_json::Error),
}
