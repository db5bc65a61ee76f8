//! In-process relay hub.
//!
//! A [`MemoryRelayHub`] behaves like a single relay shared by every
//! [`MemoryRelayClient`] attached to it: published events are matched
//! against each client's standing subscriptions and retained for
//! historical queries according to their kind class. Integration tests
//! run real server and client engines against it without any network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use blobdvm_wire_protocol::{
    canonical_event_id, is_ephemeral_kind, is_parameterized_replaceable_kind, unix_now, Event,
    EventDraft,
};

use crate::error::RelayClientError;
use crate::transport::{Filter, RelayNotification, RelayTransport, SubscriptionId};

const MEMORY_RELAY_URL: &str = "memory://hub";
const NOTIFICATION_BUFFER: usize = 1024;

/// Shared in-memory relay.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelayHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Debug, Default)]
struct HubState {
    retained: Vec<Event>,
    clients: HashMap<u64, ClientState>,
    next_client_id: u64,
    next_subscription_id: u64,
}

#[derive(Debug)]
struct ClientState {
    subscriptions: HashMap<SubscriptionId, Filter>,
    sender: broadcast::Sender<RelayNotification>,
}

impl MemoryRelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new client with a fresh random identity.
    pub fn client(&self) -> MemoryRelayClient {
        let pubkey = hex::encode(rand::random::<[u8; 32]>());
        let (sender, _) = broadcast::channel(NOTIFICATION_BUFFER);

        let mut state = self.inner.lock().expect("relay hub poisoned");
        let client_id = state.next_client_id;
        state.next_client_id += 1;
        state.clients.insert(
            client_id,
            ClientState {
                subscriptions: HashMap::new(),
                sender: sender.clone(),
            },
        );

        MemoryRelayClient {
            hub: self.clone(),
            client_id,
            pubkey,
            sender,
        }
    }

    /// Events currently retained for historical queries.
    pub fn retained_events(&self) -> Vec<Event> {
        self.inner
            .lock()
            .expect("relay hub poisoned")
            .retained
            .clone()
    }

    fn publish(&self, event: &Event) {
        let mut state = self.inner.lock().expect("relay hub poisoned");

        if !is_ephemeral_kind(event.kind) {
            if state.retained.iter().any(|stored| stored.id == event.id) {
                // Duplicate of a retained event; relays neither store nor
                // re-forward it.
                return;
            }
            if is_parameterized_replaceable_kind(event.kind) {
                let d_tag = event.tag_value("d").unwrap_or_default().to_string();
                state.retained.retain(|stored| {
                    stored.kind != event.kind
                        || stored.pubkey != event.pubkey
                        || stored.tag_value("d").unwrap_or_default() != d_tag
                });
            }
            state.retained.push(event.clone());
        }

        for client in state.clients.values() {
            for (subscription_id, filter) in &client.subscriptions {
                if filter.matches(event) {
                    let _ = client.sender.send(RelayNotification {
                        relay_url: MEMORY_RELAY_URL.to_string(),
                        subscription_id: subscription_id.clone(),
                        event: event.clone(),
                    });
                }
            }
        }
    }

    fn subscribe(&self, client_id: u64, filter: Filter) -> SubscriptionId {
        let mut state = self.inner.lock().expect("relay hub poisoned");
        let subscription_id = format!("sub-{}", state.next_subscription_id);
        state.next_subscription_id += 1;
        if let Some(client) = state.clients.get_mut(&client_id) {
            client.subscriptions.insert(subscription_id.clone(), filter);
        }
        subscription_id
    }

    fn unsubscribe(&self, client_id: u64, subscription_id: &SubscriptionId) {
        let mut state = self.inner.lock().expect("relay hub poisoned");
        if let Some(client) = state.clients.get_mut(&client_id) {
            client.subscriptions.remove(subscription_id);
        }
    }

    fn query(&self, filter: &Filter) -> Vec<Event> {
        let state = self.inner.lock().expect("relay hub poisoned");
        let mut hits: Vec<Event> = state
            .retained
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        // Newest first, as relays order historical results.
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            hits.truncate(limit);
        }
        hits
    }
}

/// A client attached to a [`MemoryRelayHub`].
#[derive(Debug, Clone)]
pub struct MemoryRelayClient {
    hub: MemoryRelayHub,
    client_id: u64,
    pubkey: String,
    sender: broadcast::Sender<RelayNotification>,
}

impl MemoryRelayClient {
    pub fn hub(&self) -> &MemoryRelayHub {
        &self.hub
    }
}

impl RelayTransport for MemoryRelayClient {
    fn public_key(&self) -> String {
        self.pubkey.clone()
    }

    async fn connect(&self) -> Result<(), RelayClientError> {
        Ok(())
    }

    async fn sign(&self, draft: EventDraft) -> Result<Event, RelayClientError> {
        let created_at = unix_now();
        let id = canonical_event_id(&self.pubkey, created_at, draft.kind, &draft.tags, &draft.content);
        Ok(Event {
            id,
            pubkey: self.pubkey.clone(),
            created_at,
            kind: draft.kind,
            tags: draft.tags,
            content: draft.content,
            sig: "0".repeat(128),
        })
    }

    async fn publish(&self, event: &Event) -> Result<(), RelayClientError> {
        self.hub.publish(event);
        Ok(())
    }

    async fn subscribe(&self, filter: Filter) -> Result<SubscriptionId, RelayClientError> {
        Ok(self.hub.subscribe(self.client_id, filter))
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) {
        self.hub.unsubscribe(self.client_id, subscription);
    }

    async fn query(&self, filter: Filter) -> Result<Vec<Event>, RelayClientError> {
        Ok(self.hub.query(&filter))
    }

    fn notifications(&self) -> broadcast::Receiver<RelayNotification> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobdvm_wire_protocol::Tag;

    async fn signed(client: &MemoryRelayClient, kind: u16, tags: Vec<Tag>, content: &str) -> Event {
        client
            .sign(EventDraft::new(kind, tags, content))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_matching_events() {
        let hub = MemoryRelayHub::new();
        let publisher = hub.client();
        let subscriber = hub.client();

        let mut notifications = subscriber.notifications();
        let subscription = subscriber
            .subscribe(Filter::new().kind(24210))
            .await
            .unwrap();

        let hit = signed(&publisher, 24210, vec![], "hit").await;
        let miss = signed(&publisher, 24211, vec![], "miss").await;
        publisher.publish(&miss).await.unwrap();
        publisher.publish(&hit).await.unwrap();

        let delivered = notifications.recv().await.unwrap();
        assert_eq!(delivered.event, hit);
        assert_eq!(delivered.subscription_id, subscription);
        assert!(notifications.try_recv().is_err(), "only one event matched");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = MemoryRelayHub::new();
        let publisher = hub.client();
        let subscriber = hub.client();

        let mut notifications = subscriber.notifications();
        let subscription = subscriber.subscribe(Filter::new().kind(1)).await.unwrap();
        subscriber.unsubscribe(&subscription).await;

        let event = signed(&publisher, 1, vec![], "late").await;
        publisher.publish(&event).await.unwrap();

        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn ephemeral_kinds_are_not_retained() {
        let hub = MemoryRelayHub::new();
        let publisher = hub.client();

        let chunk = signed(&publisher, 24212, vec![], "payload").await;
        publisher.publish(&chunk).await.unwrap();

        let found = publisher.query(Filter::new().kind(24212)).await.unwrap();
        assert!(found.is_empty(), "ephemeral events must not be queryable");
    }

    #[tokio::test]
    async fn replaceable_events_supersede_older_ones() {
        let hub = MemoryRelayHub::new();
        let publisher = hub.client();

        let old = Event {
            created_at: 100,
            ..signed(&publisher, 31999, vec![Tag::new(["d", "svc"])], "v1").await
        };
        let new = Event {
            created_at: 200,
            id: "ff".repeat(32),
            ..signed(&publisher, 31999, vec![Tag::new(["d", "svc"])], "v2").await
        };
        publisher.publish(&old).await.unwrap();
        publisher.publish(&new).await.unwrap();

        let found = publisher.query(Filter::new().kind(31999)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "v2");
    }

    #[tokio::test]
    async fn query_orders_newest_first_and_limits() {
        let hub = MemoryRelayHub::new();
        let publisher = hub.client();

        for (i, created_at) in [(0u32, 300u64), (1, 100), (2, 200)] {
            let mut event = signed(&publisher, 1, vec![], &format!("note {i}")).await;
            event.created_at = created_at;
            event.id = format!("{i:064}");
            publisher.publish(&event).await.unwrap();
        }

        let found = publisher
            .query(Filter::new().kind(1).limit(2))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].created_at, 300);
        assert_eq!(found[1].created_at, 200);
    }
}
