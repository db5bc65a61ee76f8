pub mod announcement;
pub mod chunk;
pub mod chunker;
pub mod error;
pub mod event;
pub mod request;
pub mod response;
pub mod status;

pub use announcement::*;
pub use chunk::*;
pub use chunker::*;
pub use error::*;
pub use event::*;
pub use request::*;
pub use response::*;
pub use status::*;

/// Chunk payload size in bytes. Changing this changes content addresses.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Largest file a server accepts, in bytes.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default retention for stored files, in seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 3600;

/// Parameterized-replaceable server announcement.
pub const ANNOUNCEMENT_KIND: u16 = 31999;

/// Client -> server request.
pub const REQUEST_KIND: u16 = 24210;

/// Server -> client response.
pub const RESPONSE_KIND: u16 = 24211;

/// Ephemeral file chunk carrier.
pub const CHUNK_KIND: u16 = 24212;

/// Status / error notice.
pub const STATUS_KIND: u16 = 21999;

/// `d` tag identifying the blob storage service.
pub const SERVICE_D_TAG: &str = "blob-storage-v1";
