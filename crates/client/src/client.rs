//! The client engine: discovery, request dispatch, response correlation,
//! chunk collection and reassembly.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use blobdvm_relay_client::{Filter, RelayNotification, RelayTransport, SubscriptionId};
use blobdvm_wire_protocol::{
    build_request, is_valid_file_hash, parse_announcement, parse_chunk_event, parse_response,
    parse_status, response_request_id, status_request_id, unix_now, verify_and_assemble, Chunk,
    Event, RequestPayload, ResponsePayload, ServerDescriptor, ANNOUNCEMENT_KIND, CHUNK_KIND,
    RESPONSE_KIND, STATUS_KIND,
};

use crate::error::ClientError;

/// Client-side timeouts and tunables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for the correlated response.
    pub response_timeout: Duration,
    /// How long to wait for the full chunk set.
    pub chunk_timeout: Duration,
    /// Slack subtracted from `since` when subscribing, to absorb clock
    /// skew between us and the relays.
    pub subscription_lead: Duration,
    /// Maximum number of announcements fetched during discovery.
    pub discovery_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
            chunk_timeout: Duration::from_secs(60),
            subscription_lead: Duration::from_secs(5),
            discovery_limit: 50,
        }
    }
}

/// A client of blob storage servers reachable over the relay set.
pub struct BlobDvmClient<R: RelayTransport> {
    transport: R,
    config: ClientConfig,
}

impl<R: RelayTransport> BlobDvmClient<R> {
    pub fn new(transport: R) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: R, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Public key requests are signed with.
    pub fn public_key(&self) -> String {
        self.transport.public_key()
    }

    /// Connect to the configured relay set.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport.connect().await?;
        Ok(())
    }

    /// Query the relay set for storage announcements, deduplicated by
    /// `(pubkey, d-tag)` keeping the most recent.
    pub async fn discover_servers(&self) -> Result<Vec<ServerDescriptor>, ClientError> {
        let filter = Filter::new()
            .kind(ANNOUNCEMENT_KIND)
            .limit(self.config.discovery_limit);
        let events = self.transport.query(filter).await?;

        let mut freshest: HashMap<(String, String), ServerDescriptor> = HashMap::new();
        for event in &events {
            let descriptor = match parse_announcement(event) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    debug!("ignoring unusable announcement {}: {err}", event.id);
                    continue;
                }
            };
            let key = (descriptor.pubkey.clone(), descriptor.d_tag.clone());
            match freshest.get(&key) {
                Some(existing) if existing.created_at >= descriptor.created_at => {}
                _ => {
                    freshest.insert(key, descriptor);
                }
            }
        }

        let mut servers: Vec<ServerDescriptor> = freshest.into_values().collect();
        servers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        info!("discovered {} storage server(s)", servers.len());
        Ok(servers)
    }

    /// Store `bytes` on a server, returning the server's receipt.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: Option<String>,
        server: Option<String>,
    ) -> Result<ResponsePayload, ClientError> {
        if bytes.is_empty() {
            return Err(ClientError::EmptyFile);
        }

        let server_pubkey = self.select_server(server).await?;
        let payload = RequestPayload::Store {
            data: BASE64.encode(bytes),
            filename,
        };

        let mut notifications = self.transport.notifications();
        let (request, subscription) = self.dispatch(&server_pubkey, &payload).await?;
        info!("upload request {} sent to {server_pubkey}", request.id);

        let result = self.await_response(&request.id, &mut notifications).await;
        self.transport.unsubscribe(&subscription).await;
        result
    }

    /// Fetch the file addressed by `file_hash`, verifying integrity.
    pub async fn download(
        &self,
        file_hash: &str,
        server: Option<String>,
    ) -> Result<Vec<u8>, ClientError> {
        if !is_valid_file_hash(file_hash) {
            return Err(ClientError::InvalidHash(file_hash.to_string()));
        }

        let server_pubkey = self.select_server(server).await?;
        let mut notifications = self.transport.notifications();

        // Chunks may start arriving the moment the server sees the
        // request, so the chunk subscription opens before it is sent.
        let chunk_subscription = self
            .transport
            .subscribe(Filter::new().kind(CHUNK_KIND).since(self.since()))
            .await?;

        let result = self
            .retrieve_and_collect(&server_pubkey, file_hash, &mut notifications)
            .await;
        self.transport.unsubscribe(&chunk_subscription).await;
        result
    }

    async fn retrieve_and_collect(
        &self,
        server_pubkey: &str,
        file_hash: &str,
        notifications: &mut broadcast::Receiver<RelayNotification>,
    ) -> Result<Vec<u8>, ClientError> {
        let payload = RequestPayload::Retrieve {
            hash: file_hash.to_string(),
        };
        let (request, subscription) = self.dispatch(server_pubkey, &payload).await?;
        info!("download request {} sent to {server_pubkey}", request.id);

        let result = self
            .collect_file(&request.id, file_hash, notifications)
            .await;
        self.transport.unsubscribe(&subscription).await;
        result
    }

    /// Remove the file addressed by `file_hash` from a server.
    pub async fn delete(
        &self,
        file_hash: &str,
        server: Option<String>,
    ) -> Result<ResponsePayload, ClientError> {
        if !is_valid_file_hash(file_hash) {
            return Err(ClientError::InvalidHash(file_hash.to_string()));
        }

        let server_pubkey = self.select_server(server).await?;
        let payload = RequestPayload::Delete {
            hash: file_hash.to_string(),
        };

        let mut notifications = self.transport.notifications();
        let (request, subscription) = self.dispatch(&server_pubkey, &payload).await?;
        info!("delete request {} sent to {server_pubkey}", request.id);

        let result = self.await_response(&request.id, &mut notifications).await;
        self.transport.unsubscribe(&subscription).await;
        result
    }

    async fn select_server(&self, server: Option<String>) -> Result<String, ClientError> {
        if let Some(pubkey) = server {
            return Ok(pubkey);
        }
        let servers = self.discover_servers().await?;
        servers
            .into_iter()
            .next()
            .map(|descriptor| descriptor.pubkey)
            .ok_or(ClientError::NoServers)
    }

    /// Sign the request, subscribe to its correlated responses, then
    /// publish it. The subscription opens first so a fast server cannot
    /// answer into the void.
    async fn dispatch(
        &self,
        server_pubkey: &str,
        payload: &RequestPayload,
    ) -> Result<(Event, SubscriptionId), ClientError> {
        let draft = build_request(server_pubkey, payload)?;
        let request = self.transport.sign(draft).await?;
        let filter = Filter::new()
            .kind(RESPONSE_KIND)
            .kind(STATUS_KIND)
            .event_ref(request.id.clone())
            .since(self.since());
        let subscription = self.transport.subscribe(filter).await?;
        self.transport.publish(&request).await?;
        Ok((request, subscription))
    }

    async fn await_response(
        &self,
        request_id: &str,
        notifications: &mut broadcast::Receiver<RelayNotification>,
    ) -> Result<ResponsePayload, ClientError> {
        let deadline = tokio::time::Instant::now() + self.config.response_timeout;
        loop {
            let received = tokio::time::timeout_at(deadline, notifications.recv())
                .await
                .map_err(|_| ClientError::ResponseTimeout {
                    request_id: request_id.to_string(),
                })?;
            match received {
                Ok(notification) => {
                    if let Some(payload) = self.correlate(&notification.event, request_id)? {
                        return Ok(payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("notification stream lagged, {skipped} event(s) lost");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ClientError::StreamClosed),
            }
        }
    }

    /// Accumulate chunks and the correlated response until the file is
    /// complete, then verify and reassemble it.
    async fn collect_file(
        &self,
        request_id: &str,
        file_hash: &str,
        notifications: &mut broadcast::Receiver<RelayNotification>,
    ) -> Result<Vec<u8>, ClientError> {
        let started = tokio::time::Instant::now();
        let response_deadline = started + self.config.response_timeout;
        let chunk_deadline = started + self.config.chunk_timeout;

        let mut response: Option<ResponsePayload> = None;
        let mut total: Option<u32> = None;
        let mut received: HashMap<u32, Chunk> = HashMap::new();

        loop {
            if let (Some(payload), Some(total)) = (&response, total) {
                if received.len() as u32 == total {
                    if payload.chunks != total {
                        return Err(ClientError::IntegrityFailed(format!(
                            "response advertises {} chunks but the stream carried {total}",
                            payload.chunks
                        )));
                    }
                    if payload.hash != file_hash {
                        return Err(ClientError::IntegrityFailed(format!(
                            "response is for {} instead of {file_hash}",
                            payload.hash
                        )));
                    }
                    let chunks: Vec<Chunk> = received.into_values().collect();
                    let bytes = verify_and_assemble(&chunks, file_hash)
                        .map_err(|err| ClientError::IntegrityFailed(err.to_string()))?;
                    info!("downloaded {file_hash} ({} bytes)", bytes.len());
                    return Ok(bytes);
                }
            }

            let deadline = if response.is_none() {
                response_deadline
            } else {
                chunk_deadline
            };
            let received_notification = tokio::time::timeout_at(deadline, notifications.recv())
                .await
                .map_err(|_| {
                    if response.is_none() {
                        ClientError::ResponseTimeout {
                            request_id: request_id.to_string(),
                        }
                    } else {
                        let expected = total
                            .or(response.as_ref().map(|payload| payload.chunks))
                            .unwrap_or(0) as usize;
                        ClientError::ChunkMissing {
                            received: received.len(),
                            expected,
                        }
                    }
                })?;

            let event = match received_notification {
                Ok(notification) => notification.event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("notification stream lagged, {skipped} event(s) lost");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ClientError::StreamClosed),
            };

            if event.kind == CHUNK_KIND {
                let chunk = match parse_chunk_event(&event) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        debug!("ignoring malformed chunk event {}: {err}", event.id);
                        continue;
                    }
                };
                if chunk.file_hash != file_hash {
                    continue;
                }
                if !chunk.chunk.verify() {
                    warn!(
                        "discarding chunk {} of {file_hash}: payload hash mismatch",
                        chunk.chunk.index
                    );
                    continue;
                }
                match total {
                    Some(expected) if expected != chunk.chunk.total => {
                        return Err(ClientError::IntegrityFailed(format!(
                            "chunk_total flipped from {expected} to {}",
                            chunk.chunk.total
                        )));
                    }
                    None => total = Some(chunk.chunk.total),
                    _ => {}
                }
                // A later duplicate of an already-verified index is ignored.
                received.entry(chunk.chunk.index).or_insert(chunk.chunk);
            } else if let Some(payload) = self.correlate(&event, request_id)? {
                response = Some(payload);
            }
        }
    }

    /// Match an event against the awaited request: the first correlated
    /// response resolves it, a correlated error status fails it.
    fn correlate(
        &self,
        event: &Event,
        request_id: &str,
    ) -> Result<Option<ResponsePayload>, ClientError> {
        if event.kind == RESPONSE_KIND && response_request_id(event) == Some(request_id) {
            return Ok(Some(parse_response(event)?));
        }
        if event.kind == STATUS_KIND && status_request_id(event) == Some(request_id) {
            match parse_status(event) {
                Ok(notice) => {
                    if let Some(code) = notice.error_code {
                        return Err(ClientError::Server {
                            request_id: request_id.to_string(),
                            code,
                            message: notice.message,
                        });
                    }
                    debug!("request {request_id} status: {}", notice.status);
                }
                Err(err) => debug!("ignoring malformed status event {}: {err}", event.id),
            }
        }
        Ok(None)
    }

    fn since(&self) -> u64 {
        unix_now().saturating_sub(self.config.subscription_lead.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_the_protocol() {
        let config = ClientConfig::default();
        assert_eq!(config.response_timeout.as_secs(), 30);
        assert_eq!(config.chunk_timeout.as_secs(), 60);
        assert_eq!(config.discovery_limit, 50);
    }
}
