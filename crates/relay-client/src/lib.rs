pub mod error;
pub mod memory;
pub mod nostr;
pub mod transport;

pub use error::RelayClientError;
pub use memory::{MemoryRelayClient, MemoryRelayHub};
pub use nostr::NostrRelayClient;
pub use transport::{Filter, RelayNotification, RelayTransport, SubscriptionId};

/// Re-export the key type clients and servers are configured with.
pub use nostr_sdk::Keys;
