//! Error types for docx-bulk-editor

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML encoding error: {0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Missing required part: {0}")]
    MissingPart(String),

    #[error("Invalid part URI: {0}")]
    InvalidPartUri(String),

    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    #[error("Relationship id already in use: {0}")]
    RelationshipIdInUse(String),

    #[error("Missing attribute '{attr}' on element '{element}'")]
    MissingAttribute { element: String, attr: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Validation failed at stage '{stage}': {details}")]
    Validation { stage: String, details: String },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Resolver error: {0}")]
    Resolver(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the underlying cause is a sharing violation on an open file.
    ///
    /// Used by the on-disk validator to decide between retrying and failing.
    pub fn is_file_in_use(&self) -> bool {
        match self {
            Error::Io(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("in use")
                    || msg.contains("being used by another process")
                    || msg.contains("sharing violation")
                    || msg.contains("lock")
            }
            Error::Zip(zip::result::ZipError::Io(e)) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("in use") || msg.contains("lock")
            }
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
