//! Batched resolver client
//!
//! Sends one POST per document with every canonical lookup identifier
//! collected from that document's hyperlinks, and builds the dual-key
//! record dictionary from the response. Without a configured endpoint, or
//! on transport failure when the fallback is enabled, a deterministic
//! simulation stands in for the remote service.

use crate::config::ApiOptions;
use crate::error::{Error, Result};
use crate::lookup::record::{ApiProcessingResult, DocumentRecord, RecordDictionary};
use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Shared, concurrency-safe resolver client
#[derive(Clone, Debug)]
pub struct LookupClient {
    http: reqwest::Client,
    base_url: Option<String>,
    simulate_on_failure: bool,
}

impl LookupClient {
    /// Build a client from configuration
    pub fn new(options: &ApiOptions) -> Result<Self> {
        if let Some(url) = &options.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Resolver(format!("invalid resolver endpoint: {url}")));
            }
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.request_timeout_secs))
            .build()?;

        if options.base_url.is_none() {
            warn!("no resolver endpoint configured; lookups run in simulation mode");
        }

        Ok(Self {
            http,
            base_url: options.base_url.clone(),
            simulate_on_failure: options.simulate_on_failure,
        })
    }

    /// A client that always simulates; used by tests
    pub fn simulated() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: None,
            simulate_on_failure: true,
        }
    }

    /// Resolve a batch of lookup identifiers.
    ///
    /// Identifiers are deduplicated case-insensitively, preserving the
    /// first-seen spelling; the request body preserves case exactly.
    pub async fn resolve_batch(&self, ids: &[String]) -> ApiProcessingResult {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| !id.is_empty() && seen.insert(id.to_lowercase()))
            .cloned()
            .collect();

        if ids.is_empty() {
            return ApiProcessingResult::default();
        }

        let Some(base_url) = &self.base_url else {
            return self.simulate(&ids);
        };

        match self.request(base_url, &ids).await {
            Ok(records) => classify(&ids, records, None),
            Err(e) => {
                warn!("resolver request failed: {e}");
                if self.simulate_on_failure {
                    self.simulate(&ids)
                } else {
                    // Every id unresolved; the caller treats these as
                    // not-found rather than failing the document.
                    classify(&ids, Vec::new(), Some(e.to_string()))
                }
            }
        }
    }

    async fn request(
        &self,
        base_url: &str,
        ids: &[String],
    ) -> std::result::Result<Vec<Arc<DocumentRecord>>, reqwest::Error> {
        // Wire property name is case-sensitive on the request side
        let body = json!({ "Lookup_ID": ids });

        let response = self
            .http
            .post(base_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        Ok(parse_records(&payload))
    }

    /// Deterministic stand-in for the remote resolver.
    ///
    /// Outcomes are seeded from literal substrings of the identifier so
    /// tests can steer classification: `expired` yields an Expired record,
    /// `notfound`/`missing` yields no record, anything else is Active.
    fn simulate(&self, ids: &[String]) -> ApiProcessingResult {
        debug!("simulating resolver response for {} id(s)", ids.len());
        let mut records = Vec::new();

        for id in ids {
            let lower = id.to_lowercase();
            if lower.contains("notfound") || lower.contains("missing") {
                continue;
            }
            let status = if lower.contains("expired") {
                "Expired"
            } else {
                "Active"
            };
            records.push(Arc::new(DocumentRecord {
                lookup_id: id.clone(),
                document_id: id.clone(),
                content_id: derive_content_id(id),
                title: format!("Document {id}"),
                status: status.to_string(),
            }));
        }

        classify(ids, records, None)
    }
}

/// Classify each input id against the record dictionary
fn classify(
    ids: &[String],
    records: Vec<Arc<DocumentRecord>>,
    error: Option<String>,
) -> ApiProcessingResult {
    let mut dictionary = RecordDictionary::new();
    for record in records {
        dictionary.insert(record);
    }

    let mut result = ApiProcessingResult {
        error,
        ..Default::default()
    };

    for id in ids {
        match dictionary.get(id) {
            Some(record) if record.is_expired() => result.expired.push(Arc::clone(record)),
            Some(record) => result.found.push(Arc::clone(record)),
            None => result.missing.push(id.clone()),
        }
    }

    result.dictionary = dictionary;
    result
}

/// Parse the `Results` array out of a resolver response
fn parse_records(payload: &Value) -> Vec<Arc<DocumentRecord>> {
    let Some(results) = get_prop(payload, "Results").and_then(|v| v.as_array().cloned()) else {
        return Vec::new();
    };

    results
        .iter()
        .map(|entry| {
            Arc::new(DocumentRecord {
                lookup_id: get_string_prop(entry, "Lookup_ID"),
                document_id: get_string_prop(entry, "Document_ID"),
                content_id: get_string_prop(entry, "Content_ID"),
                title: get_string_prop(entry, "Title"),
                status: get_string_prop(entry, "Status"),
            })
        })
        .collect()
}

/// Case-insensitive property access with the documented name variants,
/// tried in order: exact, lower, upper, lower-first-letter, no-underscore
/// lower, no-underscore upper.
fn get_prop<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let obj = value.as_object()?;

    let mut lower_first = name.to_string();
    if let Some(first) = lower_first.get_mut(0..1) {
        let lowered = first.to_lowercase();
        lower_first.replace_range(0..1, &lowered);
    }

    let variants = [
        name.to_string(),
        name.to_lowercase(),
        name.to_uppercase(),
        lower_first,
        name.replace('_', "").to_lowercase(),
        name.replace('_', "").to_uppercase(),
    ];

    variants.iter().find_map(|v| obj.get(v.as_str()))
}

fn get_string_prop(value: &Value, name: &str) -> String {
    match get_prop(value, name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Content id for simulated records: the identifier's last run of digits,
/// left-padded to six.
fn derive_content_id(id: &str) -> String {
    let digits: Vec<&str> = id
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .collect();

    let tail = digits.last().copied().unwrap_or("123456");
    let tail = if tail.len() > 6 {
        &tail[tail.len() - 6..]
    } else {
        tail
    };
    format!("{:0>6}", tail)
}
