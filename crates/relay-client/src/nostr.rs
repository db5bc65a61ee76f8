//! `nostr-sdk` backed relay transport.
//!
//! All `nostr-sdk` API usage lives in this module; the engines only ever
//! see [`RelayTransport`].

use std::time::Duration;

use nostr_sdk::prelude::ToBech32;
use nostr_sdk::{
    Client, Event as NostrEvent, EventBuilder, EventId, Filter as NostrFilter, JsonUtil, Keys,
    Kind, RelayPoolNotification, SubscriptionId as NostrSubscriptionId, Tag as NostrTag, Timestamp,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use blobdvm_wire_protocol::{Event, EventDraft};

use crate::error::RelayClientError;
use crate::transport::{Filter, RelayNotification, RelayTransport, SubscriptionId};

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const NOTIFICATION_BUFFER: usize = 1024;

/// Relay transport speaking to real relays through `nostr-sdk`.
pub struct NostrRelayClient {
    keys: Keys,
    client: Client,
    relays: Vec<String>,
    notifications: broadcast::Sender<RelayNotification>,
}

impl NostrRelayClient {
    pub fn new(keys: Keys, relays: Vec<String>) -> Self {
        let client = Client::new(keys.clone());
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            keys,
            client,
            relays,
            notifications,
        }
    }

    /// Parse an nsec or hex private key.
    pub fn parse_keys(input: &str) -> Result<Keys, RelayClientError> {
        Ok(Keys::parse(input)?)
    }

    /// Generate a throwaway key pair.
    pub fn generate_keys() -> Keys {
        Keys::generate()
    }

    /// Bech32 `nsec` form of a secret key, for display.
    pub fn secret_key_display(keys: &Keys) -> String {
        keys.secret_key()
            .to_bech32()
            .unwrap_or_else(|_| keys.secret_key().to_secret_hex())
    }

    fn to_nostr_filter(filter: &Filter) -> Result<NostrFilter, RelayClientError> {
        let mut nostr_filter = NostrFilter::new();
        if !filter.kinds.is_empty() {
            nostr_filter = nostr_filter.kinds(filter.kinds.iter().map(|kind| Kind::Custom(*kind)));
        }
        if let Some(since) = filter.since {
            nostr_filter = nostr_filter.since(Timestamp::from(since));
        }
        if let Some(limit) = filter.limit {
            nostr_filter = nostr_filter.limit(limit);
        }
        for event_id in &filter.event_refs {
            nostr_filter = nostr_filter.event(EventId::from_hex(event_id)?);
        }
        Ok(nostr_filter)
    }

    fn from_nostr_event(event: &NostrEvent) -> Result<Event, RelayClientError> {
        Ok(serde_json::from_str(&event.as_json())?)
    }
}

impl RelayTransport for NostrRelayClient {
    fn public_key(&self) -> String {
        self.keys.public_key().to_hex()
    }

    async fn connect(&self) -> Result<(), RelayClientError> {
        for url in &self.relays {
            self.client.add_relay(url.clone()).await?;
        }
        self.client.connect().await;
        debug!("connected to {} relay(s)", self.relays.len());

        // Pump pool notifications into our broadcast channel.
        let mut pool = self.client.notifications();
        let sender = self.notifications.clone();
        tokio::spawn(async move {
            while let Ok(notification) = pool.recv().await {
                if let RelayPoolNotification::Event {
                    relay_url,
                    subscription_id,
                    event,
                } = notification
                {
                    let event: Event = match serde_json::from_str(&event.as_json()) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("dropping undecodable relay event: {e}");
                            continue;
                        }
                    };
                    let _ = sender.send(RelayNotification {
                        relay_url: relay_url.to_string(),
                        subscription_id: subscription_id.to_string(),
                        event,
                    });
                }
            }
        });

        Ok(())
    }

    async fn sign(&self, draft: EventDraft) -> Result<Event, RelayClientError> {
        let mut tags = Vec::with_capacity(draft.tags.len());
        for tag in &draft.tags {
            tags.push(NostrTag::parse(&tag.0)?);
        }
        let signed = EventBuilder::new(Kind::Custom(draft.kind), draft.content)
            .tags(tags)
            .sign_with_keys(&self.keys)?;
        Self::from_nostr_event(&signed)
    }

    async fn publish(&self, event: &Event) -> Result<(), RelayClientError> {
        let nostr_event = NostrEvent::from_json(serde_json::to_string(event)?)?;
        self.client.send_event(nostr_event).await?;
        Ok(())
    }

    async fn subscribe(&self, filter: Filter) -> Result<SubscriptionId, RelayClientError> {
        let output = self
            .client
            .subscribe(Self::to_nostr_filter(&filter)?, None)
            .await?;
        Ok(output.val.to_string())
    }

    async fn unsubscribe(&self, subscription: &SubscriptionId) {
        self.client
            .unsubscribe(NostrSubscriptionId::new(subscription.clone()))
            .await;
    }

    async fn query(&self, filter: Filter) -> Result<Vec<Event>, RelayClientError> {
        let events = self
            .client
            .fetch_events(Self::to_nostr_filter(&filter)?, QUERY_TIMEOUT)
            .await?;
        events
            .into_iter()
            .map(|event| Self::from_nostr_event(&event))
            .collect()
    }

    fn notifications(&self) -> broadcast::Receiver<RelayNotification> {
        self.notifications.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_accepts_hex_and_rejects_garbage() {
        let hex_key = "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa";
        let keys = NostrRelayClient::parse_keys(hex_key).unwrap();
        assert_eq!(keys.public_key().to_hex().len(), 64);

        assert!(matches!(
            NostrRelayClient::parse_keys("definitely not a key"),
            Err(RelayClientError::Keys(_))
        ));
    }

    #[tokio::test]
    async fn sign_produces_a_decodable_event() {
        let transport = NostrRelayClient::new(
            NostrRelayClient::generate_keys(),
            vec!["wss://relay.example".to_string()],
        );
        let draft = EventDraft::new(
            24210,
            vec![blobdvm_wire_protocol::Tag::new(["a", "31999:pk:blob-storage-v1"])],
            r#"{"action":"retrieve","hash":""}"#,
        );

        let event = transport.sign(draft).await.unwrap();
        assert_eq!(event.kind, 24210);
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.pubkey, transport.public_key());
        assert_eq!(event.tag_value("a"), Some("31999:pk:blob-storage-v1"));
    }
}
