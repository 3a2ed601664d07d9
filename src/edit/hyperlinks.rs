//! In-memory hyperlink records for one editing session
//!
//! Records are created during extraction, filled in by the resolver and
//! the mutator, consumed by the change-log emitter, and discarded at
//! session end.

use crate::document::{Document, HyperlinkAddr};
use crate::lookup::extract_lookup_id;
use std::collections::HashSet;

/// Resolution state of one hyperlink
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolvedStatus {
    #[default]
    Unknown,
    Active,
    Expired,
    NotFound,
    Invalid,
}

/// What the mutator did to one hyperlink
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActionTaken {
    #[default]
    None,
    Updated,
    Removed,
}

/// One hyperlink as tracked through a session
#[derive(Clone, Debug)]
pub struct HyperlinkRecord {
    /// Stable surrogate key within the document run
    pub id: String,
    /// Element address inside the open document
    pub addr: HyperlinkAddr,
    /// Relationship id as read
    pub rel_id: Option<String>,
    /// Full target URI as read (empty for anchor-only links)
    pub original_url: String,
    /// Address portion (before any fragment)
    pub address: String,
    /// Fragment or anchor portion
    pub sub_address: String,
    pub display_text: String,
    /// Canonical lookup identifier; empty means not a lookup candidate
    pub lookup_id: String,
    pub requires_update: bool,
    pub resolved: ResolvedStatus,
    pub document_id: String,
    pub content_id: String,
    pub api_title: String,
    pub updated_url: Option<String>,
    pub updated_display_text: Option<String>,
    pub action_taken: ActionTaken,
}

/// Extract hyperlink records from an open document.
///
/// Elements with a broken relationship still produce a record (with an
/// empty URL) so the sweeper and the change log can see them.
pub fn extract_hyperlink_records(doc: &Document) -> Vec<HyperlinkRecord> {
    doc.enumerate_hyperlinks()
        .into_iter()
        .enumerate()
        .map(|(index, info)| {
            let url = info.target.clone().unwrap_or_default();
            let (address, mut sub_address) = split_fragment(&url);
            if sub_address.is_empty() {
                if let Some(anchor) = &info.anchor {
                    sub_address = anchor.clone();
                }
            }

            let lookup_id = extract_lookup_id(&address, &sub_address);
            let requires_update = !lookup_id.is_empty();

            HyperlinkRecord {
                id: format!("link-{}", index + 1),
                addr: info.addr,
                rel_id: info.rel_id,
                original_url: url,
                address,
                sub_address,
                display_text: info.display_text,
                lookup_id,
                requires_update,
                resolved: ResolvedStatus::Unknown,
                document_id: String::new(),
                content_id: String::new(),
                api_title: String::new(),
                updated_url: None,
                updated_display_text: None,
                action_taken: ActionTaken::None,
            }
        })
        .collect()
}

/// Unique non-empty lookup ids across a document's records,
/// case-insensitively deduplicated preserving first-seen spelling.
pub fn unique_lookup_ids(records: &[HyperlinkRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| r.requires_update)
        .filter(|r| seen.insert(r.lookup_id.to_lowercase()))
        .map(|r| r.lookup_id.clone())
        .collect()
}

fn split_fragment(url: &str) -> (String, String) {
    match url.split_once('#') {
        Some((address, fragment)) => (address.to_string(), fragment.to_string()),
        None => (url.to_string(), String::new()),
    }
}
