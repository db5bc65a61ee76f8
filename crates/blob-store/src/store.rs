//! In-memory content-addressed store with TTL eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use blobdvm_wire_protocol::{unix_now, Chunk};

/// Metadata and chunk data for one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// File size in bytes.
    pub size: u64,
    /// Chunks in index order, as produced by the chunker.
    pub chunks: Vec<Chunk>,
    /// Advisory original file name.
    pub filename: Option<String>,
    /// Unix-seconds expiration.
    pub expires_at: u64,
}

impl FileRecord {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a [`ContentStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    /// A live record for the hash already exists; content addressing makes
    /// the insert a no-op and the existing record is retained.
    AlreadyPresent,
}

/// Thread-safe `file hash -> record` map.
///
/// No record observable via [`ContentStore::get`] has `expires_at <= now`:
/// reads evict lazily and a background sweeper removes the rest.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    inner: Arc<Mutex<HashMap<String, FileRecord>>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless a live one for `hash` already exists.
    /// An expired leftover is evicted before the insert.
    pub fn put(&self, hash: &str, record: FileRecord) -> PutOutcome {
        let now = unix_now();
        let mut map = self.inner.lock().expect("content store poisoned");
        match map.get(hash) {
            Some(existing) if !existing.is_expired(now) => PutOutcome::AlreadyPresent,
            _ => {
                map.insert(hash.to_string(), record);
                PutOutcome::Inserted
            }
        }
    }

    /// Look up a live record. An expired record is evicted and reported
    /// as absent.
    pub fn get(&self, hash: &str) -> Option<FileRecord> {
        let now = unix_now();
        let mut map = self.inner.lock().expect("content store poisoned");
        match map.get(hash) {
            Some(record) if record.is_expired(now) => {
                map.remove(hash);
                debug!("evicted expired file {hash}");
                None
            }
            Some(record) => Some(record.clone()),
            None => None,
        }
    }

    /// Remove a record unconditionally. Returns whether one was present.
    pub fn delete(&self, hash: &str) -> bool {
        let mut map = self.inner.lock().expect("content store poisoned");
        map.remove(hash).is_some()
    }

    /// Remove every record with `expires_at <= now`. Returns how many
    /// records were evicted.
    pub fn sweep(&self) -> usize {
        let now = unix_now();
        let mut map = self.inner.lock().expect("content store poisoned");
        let before = map.len();
        map.retain(|_, record| !record.is_expired(now));
        before - map.len()
    }

    /// Total size in bytes of all live records.
    pub fn live_bytes(&self) -> u64 {
        let now = unix_now();
        let map = self.inner.lock().expect("content store poisoned");
        map.values()
            .filter(|record| !record.is_expired(now))
            .map(|record| record.size)
            .sum()
    }

    /// Number of records currently held, expired leftovers included.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("content store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the background sweeper removing expired records every
    /// `interval`.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    info!("sweeper removed {removed} expired file(s)");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobdvm_wire_protocol::split;

    fn record(data: &[u8], expires_at: u64) -> FileRecord {
        FileRecord {
            size: data.len() as u64,
            chunks: split(data),
            filename: None,
            expires_at,
        }
    }

    fn live_record(data: &[u8]) -> FileRecord {
        record(data, unix_now() + 3600)
    }

    #[test]
    fn put_get_delete_round_trip() {
        let store = ContentStore::new();
        let rec = live_record(b"hello");

        assert_eq!(store.put("hash-a", rec.clone()), PutOutcome::Inserted);
        assert_eq!(store.get("hash-a"), Some(rec));
        assert_eq!(store.live_bytes(), 5);

        assert!(store.delete("hash-a"));
        assert!(!store.delete("hash-a"), "second delete finds nothing");
        assert_eq!(store.get("hash-a"), None);
    }

    #[test]
    fn put_is_idempotent_for_live_records() {
        let store = ContentStore::new();
        let first = live_record(b"same bytes");
        let second = record(b"same bytes", first.expires_at + 9999);

        assert_eq!(store.put("hash-a", first.clone()), PutOutcome::Inserted);
        assert_eq!(store.put("hash-a", second), PutOutcome::AlreadyPresent);

        // The original record, with its original expiry, survives.
        assert_eq!(store.get("hash-a"), Some(first));
    }

    #[test]
    fn put_replaces_expired_leftovers() {
        let store = ContentStore::new();
        let stale = record(b"old", unix_now().saturating_sub(10));
        let fresh = live_record(b"new");

        assert_eq!(store.put("hash-a", stale), PutOutcome::Inserted);
        assert_eq!(store.put("hash-a", fresh.clone()), PutOutcome::Inserted);
        assert_eq!(store.get("hash-a"), Some(fresh));
    }

    #[test]
    fn get_evicts_expired_records() {
        let store = ContentStore::new();
        store.put("hash-a", record(b"bytes", unix_now().saturating_sub(1)));

        assert_eq!(store.get("hash-a"), None);
        assert!(store.is_empty(), "expired record must be gone after get");
    }

    #[test]
    fn live_bytes_ignores_expired_records() {
        let store = ContentStore::new();
        store.put("live", live_record(&[0u8; 100]));
        store.put("dead", record(&[0u8; 900], unix_now().saturating_sub(1)));

        assert_eq!(store.live_bytes(), 100);
    }

    #[test]
    fn sweep_removes_only_expired_records() {
        let store = ContentStore::new();
        store.put("live", live_record(b"keep"));
        store.put("dead-1", record(b"drop", unix_now().saturating_sub(5)));
        store.put("dead-2", record(b"drop", unix_now().saturating_sub(1)));

        assert_eq!(store.sweep(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("live").is_some());
    }

    #[tokio::test]
    async fn sweeper_task_evicts_in_the_background() {
        let store = ContentStore::new();
        store.put("dead", record(b"drop", unix_now().saturating_sub(1)));

        let handle = store.spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.is_empty(), "sweeper must have removed the record");
    }
}
