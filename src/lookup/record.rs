//! Resolver records and the dual-key dictionary

use std::collections::HashMap;
use std::sync::Arc;

/// One authoritative record returned by the resolver
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentRecord {
    pub lookup_id: String,
    pub document_id: String,
    pub content_id: String,
    pub title: String,
    pub status: String,
}

impl DocumentRecord {
    pub fn is_expired(&self) -> bool {
        self.status.eq_ignore_ascii_case("Expired")
    }

    pub fn is_not_found(&self) -> bool {
        self.status.eq_ignore_ascii_case("NotFound")
            || self.status.eq_ignore_ascii_case("Not Found")
    }
}

/// Case-insensitive dictionary keyed by both `document_id` and
/// `content_id`, first-writer-wins per key.
#[derive(Clone, Debug, Default)]
pub struct RecordDictionary {
    map: HashMap<String, Arc<DocumentRecord>>,
}

impl RecordDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record under both of its identifiers. Empty identifiers
    /// are skipped; an already-claimed key keeps its first record.
    pub fn insert(&mut self, record: Arc<DocumentRecord>) {
        for key in [&record.document_id, &record.content_id] {
            if key.is_empty() {
                continue;
            }
            self.map
                .entry(key.to_lowercase())
                .or_insert_with(|| Arc::clone(&record));
        }
    }

    /// Look up a record by either identifier, case-insensitively
    pub fn get(&self, key: &str) -> Option<&Arc<DocumentRecord>> {
        self.map.get(&key.to_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Outcome of resolving one batch of lookup identifiers
#[derive(Clone, Debug, Default)]
pub struct ApiProcessingResult {
    /// Records matched with a non-expired status
    pub found: Vec<Arc<DocumentRecord>>,
    /// Records matched with an Expired status
    pub expired: Vec<Arc<DocumentRecord>>,
    /// Input identifiers with no matching record
    pub missing: Vec<String>,
    /// Transport-level error, when the resolver could not be reached
    pub error: Option<String>,
    /// All matched records, keyed by document and content id
    pub dictionary: RecordDictionary,
}
