//! The relay-client surface the protocol engines consume.

use std::future::Future;

use tokio::sync::broadcast;

use blobdvm_wire_protocol::{Event, EventDraft};

use crate::error::RelayClientError;

/// Identifier for an active subscription.
pub type SubscriptionId = String;

/// Subset of relay filter semantics the engines rely on: kinds, `since`,
/// `limit` and `#e` tag constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub kinds: Vec<u16>,
    pub since: Option<u64>,
    pub limit: Option<usize>,
    /// `#e` tag constraint: event ids the results must reference.
    pub event_refs: Vec<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn event_ref<S: Into<String>>(mut self, event_id: S) -> Self {
        self.event_refs.push(event_id.into());
        self
    }

    /// Whether `event` satisfies every constraint of this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if !self.event_refs.is_empty() {
            let mut refs = event.tag_values("e");
            if !refs.any(|value| self.event_refs.iter().any(|wanted| wanted == value)) {
                return false;
            }
        }
        true
    }
}

/// Notification delivered from a relay subscription.
#[derive(Debug, Clone)]
pub struct RelayNotification {
    pub relay_url: String,
    pub subscription_id: SubscriptionId,
    pub event: Event,
}

/// Connect, sign, publish, subscribe and query against a relay set.
///
/// Implementations own the signing key; engines never see key material.
pub trait RelayTransport: Send + Sync + 'static {
    /// Hex public key this transport signs with.
    fn public_key(&self) -> String;

    /// Connect to the configured relay set.
    fn connect(&self) -> impl Future<Output = Result<(), RelayClientError>> + Send;

    /// Sign a draft, assigning `id`, `pubkey`, `created_at` and `sig`.
    fn sign(&self, draft: EventDraft) -> impl Future<Output = Result<Event, RelayClientError>> + Send;

    /// Publish a signed event to all connected relays.
    fn publish(&self, event: &Event) -> impl Future<Output = Result<(), RelayClientError>> + Send;

    /// Open a standing subscription.
    fn subscribe(
        &self,
        filter: Filter,
    ) -> impl Future<Output = Result<SubscriptionId, RelayClientError>> + Send;

    /// Close a standing subscription.
    fn unsubscribe(&self, subscription: &SubscriptionId) -> impl Future<Output = ()> + Send;

    /// One-shot historical query.
    fn query(
        &self,
        filter: Filter,
    ) -> impl Future<Output = Result<Vec<Event>, RelayClientError>> + Send;

    /// Stream of events arriving on any subscription of this transport.
    fn notifications(&self) -> broadcast::Receiver<RelayNotification>;
}
