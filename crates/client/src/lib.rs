pub mod client;
pub mod error;

pub use client::{BlobDvmClient, ClientConfig};
pub use error::ClientError;
