//! Configuration for the editing pipeline
//!
//! A single record with PascalCase option names, loadable from a JSON file
//! and fully defaulted. Unknown options are ignored so older configuration
//! files keep working.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration record
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    pub processing: ProcessingOptions,
    pub validation: ValidationOptions,
    pub text: TextOptions,
    pub api: ApiOptions,
    pub cache: CacheOptions,
}

/// Batch processing options
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ProcessingOptions {
    /// Upper bound on parallel document sessions
    pub max_concurrent_documents: usize,
    /// Enables the text optimizer stage
    pub optimize_text: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            max_concurrent_documents: 4,
            optimize_text: true,
        }
    }
}

/// Validation and title-handling options
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ValidationOptions {
    /// Rewrite display text in place when it differs from the resolver title
    pub auto_replace_titles: bool,
    /// Emit an informational change when titles differ
    pub report_title_differences: bool,
    /// Validation errors containing any of these substrings are ignored
    pub ignorable_errors: Vec<String>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            auto_replace_titles: false,
            report_title_differences: true,
            // Table-property attribute noise that the consuming word
            // processor accepts, pre-existing broken links the sweeper
            // and mutator deal with individually, and mixed drawing/text
            // runs that are legal in input documents
            ignorable_errors: vec![
                "attribute is not declared".to_string(),
                "tblPr".to_string(),
                "unresolved hyperlink relationship".to_string(),
                "alongside drawing content".to_string(),
            ],
        }
    }
}

/// Text replacement and cleanup options
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TextOptions {
    /// Ordered user replacement rules
    pub replacements: Vec<ReplacementRule>,
    /// Record replacements as tracked changes instead of rewriting in place
    pub track_changes: bool,
    /// Collapse runs of two or more spaces
    pub remove_extra_spaces: bool,
    /// Remove paragraphs whose text is whitespace-only
    pub remove_empty_paragraphs: bool,
    /// Cap consecutive line breaks
    pub standardize_line_breaks: bool,
    /// Insert an empty paragraph into table cells that lack one
    pub optimize_table_formatting: bool,
    /// Normalize list-item indentation
    pub optimize_list_formatting: bool,
    /// Apply a standard line-spacing to paragraphs
    pub standardize_paragraph_spacing: bool,
    /// Maximum consecutive line breaks kept by the standardize pass
    pub max_consecutive_line_breaks: usize,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            replacements: Vec::new(),
            track_changes: false,
            remove_extra_spaces: true,
            remove_empty_paragraphs: true,
            standardize_line_breaks: true,
            optimize_table_formatting: true,
            optimize_list_formatting: true,
            standardize_paragraph_spacing: false,
            max_consecutive_line_breaks: 2,
        }
    }
}

/// One user replacement rule
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ReplacementRule {
    pub enabled: bool,
    pub source_text: String,
    pub replacement_text: String,
}

impl Default for ReplacementRule {
    fn default() -> Self {
        Self {
            enabled: true,
            source_text: String::new(),
            replacement_text: String::new(),
        }
    }
}

impl ReplacementRule {
    pub fn new(source: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            enabled: true,
            source_text: source.into(),
            replacement_text: replacement.into(),
        }
    }
}

/// Resolver endpoint options
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ApiOptions {
    /// Resolver endpoint; absence triggers simulation mode
    pub base_url: Option<String>,
    /// Host written into rewritten document URLs
    pub document_base_url: String,
    /// Fall back to the deterministic simulation on transport failure
    pub simulate_on_failure: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            document_base_url: "https://thesource.example.com".to_string(),
            simulate_on_failure: true,
            request_timeout_secs: 30,
        }
    }
}

/// Lookup cache options
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CacheOptions {
    /// Entry expiry in minutes
    pub expiry_minutes: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { expiry_minutes: 30 }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&data)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Config(e.to_string()))
    }

    /// Only rules that are enabled and carry non-blank source and
    /// replacement text participate in the replacement pass.
    pub fn active_replacements(&self) -> Vec<&ReplacementRule> {
        self.text
            .replacements
            .iter()
            .filter(|r| {
                r.enabled
                    && !r.source_text.trim().is_empty()
                    && !r.replacement_text.trim().is_empty()
            })
            .collect()
    }
}
