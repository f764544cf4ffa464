//! Core data types for chart snapshots and the error taxonomy.

use serde::{Deserialize, Serialize};

/// One storefront item as read from the chart page.
///
/// Records live for a single extraction pass; nothing caches or diffs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    /// Storefront identifier taken from the `?id=` query parameter of `url`.
    pub id: String,
    pub name: String,
    pub url: String,
    pub image_url: String,
    /// Decimal string in native currency, symbol stripped. Free items are `"0"`.
    pub price: String,
}

/// A field of an [`AppRecord`] produced by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Url,
    Id,
    Price,
    ImageUrl,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Url => "url",
            Field::Id => "id",
            Field::Price => "price",
            Field::ImageUrl => "image_url",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field of a single item could not be located or parsed.
///
/// Recovered locally: the item is dropped and the batch continues.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: Field,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// An item that was skipped during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedItem {
    /// Position of the item container in page order.
    pub index: usize,
    pub error: FieldError,
}

/// The result of one extraction pass over the rendered page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Extracted records in page order.
    pub records: Vec<AppRecord>,
    pub dropped: Vec<DroppedItem>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Errors raised while tracking a chart.
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("Extraction error: {0}")]
    Extraction(#[from] FieldError),

    #[error("No items matched selector {selector:?}; selectors or page layout are stale")]
    FatalExtraction { selector: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Page load error: {0}")]
    PageLoad(String),

    #[error("Page not ready after {iterations} scroll iterations ({elapsed_ms}ms)")]
    PageNotReady { iterations: u32, elapsed_ms: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// Whether the error must abort the current cycle.
    ///
    /// Only per-item extraction errors are recovered locally.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TrackerError::Extraction(_))
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(e: rusqlite::Error) -> Self {
        TrackerError::Storage(e.to_string())
    }
}

/// Convenience result type.
pub type TrackerResult<T> = Result<T, TrackerError>;
