//! Hyperlink lookup: identifier extraction, the remote resolver client,
//! and the response cache.

mod cache;
mod client;
mod extract;
mod record;

pub use cache::LookupCache;
pub use client::LookupClient;
pub use extract::extract_lookup_id;
pub use record::{ApiProcessingResult, DocumentRecord, RecordDictionary};
