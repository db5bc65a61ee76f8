//! The server engine: announcement, request fan-in, handlers and the
//! chunk broadcaster.

use std::collections::HashSet;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use blobdvm_blob_store::{ContentStore, FileRecord};
use blobdvm_relay_client::{Filter, RelayTransport};
use blobdvm_wire_protocol::{
    addresses_server, build_announcement, build_chunk_event, build_error, build_processing,
    build_response, parse_request, sha256_hex, split, unix_now, ErrorCode, Event, EventDraft,
    ParsedRequest, RequestPayload, ResponsePayload, ResponseStatus, WireError, REQUEST_KIND,
};

use crate::config::ServerConfig;
use crate::error::{HandlerError, ServerError};

/// A blob storage provider serving requests arriving over the relay set.
pub struct BlobDvmServer<R: RelayTransport> {
    transport: R,
    config: ServerConfig,
    store: ContentStore,
    handled: Mutex<HashSet<String>>,
}

impl<R: RelayTransport> BlobDvmServer<R> {
    pub fn new(transport: R, config: ServerConfig) -> Self {
        Self {
            transport,
            config,
            store: ContentStore::new(),
            handled: Mutex::new(HashSet::new()),
        }
    }

    /// Public key this server announces under.
    pub fn public_key(&self) -> String {
        self.transport.public_key()
    }

    /// The server's content store.
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Connect, announce, and serve requests until the task is cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.transport.connect().await?;
        self.publish_announcement().await?;

        // The receiver exists before the subscription opens, so no request
        // can slip between the two.
        let mut notifications = self.transport.notifications();
        self.transport
            .subscribe(Filter::new().kind(REQUEST_KIND).since(unix_now()))
            .await?;

        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel();
        let server_pubkey = self.transport.public_key();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => {
                        let event = notification.event;
                        if event.kind == REQUEST_KIND && addresses_server(&event, &server_pubkey) {
                            if jobs_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("notification stream lagged, {skipped} event(s) lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let sweeper = self.store.spawn_sweeper(self.config.sweep_interval);

        info!("blobdvm server {} ready", self.transport.public_key());
        while let Some(event) = jobs_rx.recv().await {
            self.handle_request(&event).await;
        }

        sweeper.abort();
        Ok(())
    }

    async fn publish_announcement(&self) -> Result<(), ServerError> {
        let draft = build_announcement(&self.config.announcement_info())?;
        let event = self.transport.sign(draft).await?;
        self.transport.publish(&event).await?;
        info!("published service announcement");
        Ok(())
    }

    async fn handle_request(&self, event: &Event) {
        if !self.mark_handled(&event.id) {
            debug!("dropping duplicate request {}", event.id);
            return;
        }

        self.send_status(build_processing(&event.id, &event.pubkey))
            .await;

        let request = match parse_request(event) {
            Ok(request) => request,
            Err(err) => {
                warn!("rejecting malformed request {}: {err}", event.id);
                let code = match &err {
                    WireError::InvalidHash(_) => ErrorCode::InvalidHash,
                    _ => ErrorCode::MalformedRequest,
                };
                self.send_status(build_error(&event.id, &event.pubkey, code, &err.to_string()))
                    .await;
                return;
            }
        };

        let result = match &request.payload {
            RequestPayload::Store { data, filename } => {
                self.handle_store(data, filename.clone()).await
            }
            RequestPayload::Retrieve { hash } => self.handle_retrieve(hash).await,
            RequestPayload::Delete { hash } => self.handle_delete(hash).await,
        };

        match result {
            Ok(payload) => {
                if let Err(err) = self.send_response(&request, &payload).await {
                    error!("failed to publish response for {}: {err}", request.request_id);
                }
            }
            Err(failure) => {
                warn!("request {} failed: {failure}", request.request_id);
                self.send_status(build_error(
                    &request.request_id,
                    &request.requester,
                    failure.code(),
                    &failure.to_string(),
                ))
                .await;
            }
        }
    }

    async fn handle_store(
        &self,
        data_b64: &str,
        filename: Option<String>,
    ) -> Result<ResponsePayload, HandlerError> {
        let bytes = BASE64.decode(data_b64)?;
        if bytes.is_empty() {
            return Err(HandlerError::EmptyPayload);
        }
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(HandlerError::FileTooLarge);
        }

        let file_hash = sha256_hex(&bytes);
        let record = match self.store.get(&file_hash) {
            Some(existing) => {
                // Already held: re-storing identical bytes is a no-op
                // that adds nothing, so the capacity gate does not apply
                // and the retained record keeps its original expiry.
                debug!("store of {file_hash} is an idempotent no-op");
                existing
            }
            None => {
                if let Some(limit) = self.config.capacity {
                    if self.store.live_bytes() + bytes.len() as u64 > limit {
                        return Err(HandlerError::StorageFull);
                    }
                }
                let record = FileRecord {
                    size: bytes.len() as u64,
                    chunks: split(&bytes),
                    filename,
                    expires_at: unix_now() + self.config.retention.as_secs(),
                };
                self.store.put(&file_hash, record);
                self.store
                    .get(&file_hash)
                    .ok_or_else(|| HandlerError::Internal("stored record vanished".to_string()))?
            }
        };

        self.publish_chunks(&file_hash, &record).await?;
        info!("stored file {file_hash} ({} chunks)", record.chunks.len());

        Ok(ResponsePayload {
            hash: file_hash,
            size: record.size,
            chunks: record.chunks.len() as u32,
            expires: record.expires_at,
            status: ResponseStatus::Stored,
        })
    }

    async fn handle_retrieve(&self, hash: &str) -> Result<ResponsePayload, HandlerError> {
        let record = self.store.get(hash).ok_or(HandlerError::FileNotFound)?;

        self.publish_chunks(hash, &record).await?;
        info!("retrieved file {hash} ({} chunks)", record.chunks.len());

        Ok(ResponsePayload {
            hash: hash.to_string(),
            size: record.size,
            chunks: record.chunks.len() as u32,
            expires: record.expires_at,
            status: ResponseStatus::Available,
        })
    }

    async fn handle_delete(&self, hash: &str) -> Result<ResponsePayload, HandlerError> {
        // Deletion cannot recall already-broadcast chunks; it only stops
        // future retrievals from this server.
        let record = self.store.get(hash).ok_or(HandlerError::FileNotFound)?;
        self.store.delete(hash);
        info!("deleted file {hash}");

        Ok(ResponsePayload {
            hash: hash.to_string(),
            size: record.size,
            chunks: record.chunks.len() as u32,
            expires: record.expires_at,
            status: ResponseStatus::Deleted,
        })
    }

    /// Publish every chunk of `record`, index ascending. All chunks are
    /// published before the caller emits its response.
    async fn publish_chunks(&self, file_hash: &str, record: &FileRecord) -> Result<(), HandlerError> {
        for chunk in &record.chunks {
            let draft = build_chunk_event(file_hash, chunk, record.expires_at);
            let event = self.transport.sign(draft).await?;
            self.transport.publish(&event).await?;
        }
        debug!(
            "published {} chunk event(s) for {file_hash}",
            record.chunks.len()
        );
        Ok(())
    }

    async fn send_response(
        &self,
        request: &ParsedRequest,
        payload: &ResponsePayload,
    ) -> Result<(), ServerError> {
        let draft = build_response(&request.request_id, &request.requester, payload)?;
        let event = self.transport.sign(draft).await?;
        self.transport.publish(&event).await?;
        Ok(())
    }

    /// Status notices are best-effort; a failure is logged, never raised.
    async fn send_status(&self, draft: EventDraft) {
        let result = match self.transport.sign(draft).await {
            Ok(event) => self.transport.publish(&event).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!("failed to publish status notice: {err}");
        }
    }

    fn mark_handled(&self, request_id: &str) -> bool {
        self.handled
            .lock()
            .expect("handled set poisoned")
            .insert(request_id.to_string())
    }
}
