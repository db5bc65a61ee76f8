use std::time::Duration;

use blobdvm_wire_protocol::{AnnouncementInfo, CHUNK_SIZE, DEFAULT_RETENTION_SECS, MAX_FILE_SIZE};

/// Tunables for a running server engine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Human-readable server name advertised in the announcement.
    pub name: String,
    /// Human-readable description advertised in the announcement.
    pub about: String,
    /// Largest store payload accepted, in bytes.
    pub max_file_size: u64,
    /// How long stored files are retained.
    pub retention: Duration,
    /// Live-byte capacity; `None` is unbounded.
    pub capacity: Option<u64>,
    /// Interval between TTL sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "BlobDVM Storage".to_string(),
            about: "Content-addressed file storage over nostr".to_string(),
            max_file_size: MAX_FILE_SIZE,
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            capacity: None,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Announcement parameters derived from this configuration.
    pub fn announcement_info(&self) -> AnnouncementInfo {
        AnnouncementInfo {
            name: self.name.clone(),
            about: self.about.clone(),
            max_file_size: self.max_file_size,
            chunk_size: CHUNK_SIZE as u64,
            retention_hours: self.retention.as_secs() / 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_protocol_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.retention.as_secs(), 86_400);
        assert_eq!(config.capacity, None);
        assert!(config.sweep_interval.as_secs() <= 60);
    }

    #[test]
    fn announcement_info_reflects_retention() {
        let config = ServerConfig {
            retention: Duration::from_secs(2 * 3600),
            ..ServerConfig::default()
        };
        assert_eq!(config.announcement_info().retention_hours, 2);
        assert_eq!(config.announcement_info().chunk_size, 32_768);
    }
}
