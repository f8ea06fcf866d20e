//! Table metadata read straight from a SQLite file.

use crate::error::MetadataError;
use ravel_core::metadata::{MetadataSource, TableMetadata};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Result};
use std::path::Path;

/// Rows sampled per table unless configured otherwise
pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

/// Read-only metadata view over a SQLite database.
#[derive(Debug)]
pub struct SqliteMetadata {
    conn: Connection,
    sample_limit: usize,
}

impl SqliteMetadata {
    pub fn open<P: AsRef<Path>>(path: P) -> std::result::Result<Self, MetadataError> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }

    pub fn with_sample_limit(mut self, sample_limit: usize) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(names)
    }

    fn describe(&self, table: &str) -> std::result::Result<TableMetadata, MetadataError> {
        let quoted = quote_identifier(table);

        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {quoted}"), [], |row| row.get(0))?;
        let row_count = u64::try_from(count).map_err(|_| MetadataError::InvalidRowCount {
            table: table.to_string(),
            count,
        })?;

        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>>>()?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {quoted} LIMIT ?1"))?;
        let width = stmt.column_count();
        let limit = i64::try_from(self.sample_limit).unwrap_or(i64::MAX);
        let mut rows = stmt.query([limit])?;
        let mut sample_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for index in 0..width {
                cells.push(render_cell(row.get_ref(index)?));
            }
            sample_rows.push(cells);
        }

        Ok(TableMetadata {
            name: table.to_string(),
            row_count,
            columns,
            sample_rows,
        })
    }
}

impl MetadataSource for SqliteMetadata {
    type Error = MetadataError;

    fn tables(&self) -> std::result::Result<Vec<TableMetadata>, MetadataError> {
        let names = self.table_names()?;
        tracing::debug!(tables = names.len(), "collecting sqlite metadata");
        names.iter().map(|name| self.describe(name)).collect()
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
