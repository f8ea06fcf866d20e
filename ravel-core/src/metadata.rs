//! Metadata collaborator interface.
//!
//! A [`MetadataSource`] describes the collections in a data store so callers
//! can embed that description in a prompt. The client never calls it; it only
//! needs the rendered text.

use std::fmt::Write;

/// Description of one table (or other named collection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<String>,
    /// A few rows, each cell already rendered to text
    pub sample_rows: Vec<Vec<String>>,
}

/// Read-only source of table metadata.
pub trait MetadataSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn tables(&self) -> Result<Vec<TableMetadata>, Self::Error>;
}

/// Render metadata as a prompt-ready text block.
///
/// Output is deterministic for a given input; tables keep the order given.
pub fn render_metadata(tables: &[TableMetadata]) -> String {
    if tables.is_empty() {
        return "(no tables)\n".to_string();
    }

    let mut out = String::new();
    for table in tables {
        // Writing to a String cannot fail
        let _ = writeln!(out, "## {}", table.name);
        let _ = writeln!(out, "rows: {}", table.row_count);
        let _ = writeln!(out, "columns: {}", table.columns.join(", "));
        if !table.sample_rows.is_empty() {
            let _ = writeln!(out, "sample:");
            for row in &table.sample_rows {
                let _ = writeln!(out, "- ({})", row.join(", "));
            }
        }
        out.push('\n');
    }
    out
}
