//! Error types for metadata extraction.

/// Errors raised while reading SQLite metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The underlying SQLite call failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row count did not fit the metadata type
    #[error("Invalid row count for table {table}: {count}")]
    InvalidRowCount { table: String, count: i64 },
}
