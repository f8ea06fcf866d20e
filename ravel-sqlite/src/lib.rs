//! # Ravel SQLite
//!
//! A [`MetadataSource`](ravel_core::MetadataSource) backed by SQLite.
//!
//! ```ignore
//! use ravel_core::{render_metadata, MetadataSource};
//! use ravel_sqlite::SqliteMetadata;
//!
//! let source = SqliteMetadata::open("financial.db")?;
//! let description = render_metadata(&source.tables()?);
//! ```

pub mod error;
pub mod source;

pub use error::MetadataError;
pub use source::{SqliteMetadata, DEFAULT_SAMPLE_LIMIT};
