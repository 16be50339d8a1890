use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable column identity, assigned by whoever defines the table schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub String);

impl ColumnId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ColumnId {
    fn from(value: &str) -> Self {
        ColumnId(value.to_string())
    }
}

impl From<String> for ColumnId {
    fn from(value: String) -> Self {
        ColumnId(value)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable row identity used for selection and caching across pages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        RowId(value)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single row as the engine sees it: an identity plus stringified cell
/// values keyed by column. Servers with dynamic schemas deliver exactly this
/// shape; anything richer (types, formatting) belongs to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RowId,
    pub fields: BTreeMap<ColumnId, String>,
}

impl Record {
    pub fn new(id: impl Into<RowId>) -> Self {
        Record {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, column: impl Into<ColumnId>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn field(&self, column: &ColumnId) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("page numbers are 1-based, got {0}")]
    InvalidPage(usize),
    #[error("page size must be at least 1, got {0}")]
    InvalidPageSize(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error("unknown file type: {0}")]
    UnknownFileType(String),
    #[error("loading failed: {0}")]
    LoadingFailed(String),
}

/// Failure at the DataSource boundary. Surfaced through the engine's
/// observable state; never clears already-rendered rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("data source error: {0}")]
    Source(String),
}

/// Tunables for a table instance. Built with setter-style methods:
///
/// ```
/// use gridstate::EngineConfig;
/// let config = EngineConfig::default().page_size(50);
/// ```
#[derive(Debug, Clone, Setters)]
pub struct EngineConfig {
    /// Rows per page.
    pub page_size: usize,
    /// Trailing-edge delay before the engine emits a URL write.
    pub url_debounce: Duration,
    /// Trailing-edge delay before a free-text search term is applied.
    pub search_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: 25,
            url_debounce: Duration::from_millis(300),
            search_debounce: Duration::from_millis(300),
        }
    }
}
