pub mod store;

pub use store::{ContentStore, FileRecord, PutOutcome};
