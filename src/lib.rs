//! # docx-bulk-editor
//!
//! Batch hyperlink repair and text cleanup for DOCX documents.
//!
//! For each document the pipeline enumerates hyperlinks, resolves them
//! against a remote lookup service, rewrites URLs and display text,
//! applies user replacement rules, and runs conservative text-cleanup
//! passes. All mutation happens inside a single open-and-save cycle,
//! protected by a pre-image backup and structural validation; any failure
//! restores the original file.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docx_bulk_editor::config::Config;
//! use docx_bulk_editor::session::{process_batch, SessionContext};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::from_json_file("editor.json")?;
//! let ctx = Arc::new(SessionContext::new(config)?);
//! let outcome = process_batch(ctx, &paths, CancellationToken::new()).await;
//! for result in &outcome.results {
//!     println!("{}: {:?}", result.path.display(), result.status);
//! }
//! ```
//!
//! Unknown XML is preserved as-is, so content the pipeline does not touch
//! round-trips intact.

pub mod config;
pub mod document;
pub mod edit;
pub mod error;
pub mod lookup;
pub mod opc;
pub mod session;
pub mod xml;

pub use config::Config;
pub use document::Document;
pub use error::{Error, Result};
pub use lookup::{LookupCache, LookupClient};
pub use opc::{Package, Part, PartUri};
pub use session::{
    process_batch, process_document, DocumentResult, DocumentStatus, SessionContext,
};
