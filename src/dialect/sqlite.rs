// ABOUTME: SQLite driver reading an existing database file through rusqlite
// ABOUTME: Opens the file read-only; every query runs synchronously on the one connection

use super::{Dialect, DialectDriver, PrimaryKey, RawValue, RowBatch};
use crate::dump::planner::{KeyBound, PageDescriptor};
use crate::error::{DumpError, Result};
use crate::utils::sanitize_identifier;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Params};
use std::path::Path;

pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Open an existing database file. A missing file is an error, never
    /// an empty new database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening SQLite database {}", path.display());

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            DumpError::connection(format!(
                "Failed to open SQLite database {}: {}",
                path.display(),
                e
            ))
        })?;

        // Opening is lazy; make sure the file really is a database
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| {
            DumpError::connection(format!(
                "{} is not a readable SQLite database: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { conn })
    }

    fn quote(&self, identifier: &str) -> String {
        Dialect::Sqlite.quote_identifier(identifier)
    }

    fn key_columns(&self, table: &str) -> rusqlite::Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
        let columns = stmt
            .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(columns)
    }

    fn key_range(
        &self,
        table: &str,
        column: &str,
    ) -> rusqlite::Result<(Option<String>, Option<String>)> {
        let query = format!(
            "SELECT CAST(min({col}) AS TEXT), CAST(max({col}) AS TEXT) FROM {table}",
            col = self.quote(column),
            table = self.quote(table)
        );
        self.conn
            .query_row(&query, [], |row| Ok((row.get(0)?, row.get(1)?)))
    }

    fn select(&self, query: &str, params: impl Params) -> rusqlite::Result<RowBatch> {
        let mut stmt = self.conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut batch = RowBatch::new(columns);
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(value_to_raw(row.get_ref(idx)?));
            }
            batch.rows.push(values);
        }
        Ok(batch)
    }
}

fn value_to_raw(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string().into_bytes()),
        ValueRef::Real(n) => Some(n.to_string().into_bytes()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(bytes.to_vec()),
    }
}

#[async_trait]
impl DialectDriver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let list = || -> rusqlite::Result<Vec<String>> {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        };
        let tables = list().map_err(|e| DumpError::introspection("sqlite_master", e))?;

        tracing::debug!("Found {} tables", tables.len());
        Ok(tables)
    }

    async fn table_ddl(&mut self, table: &str) -> Result<String> {
        let sql: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DumpError::introspection(table, e))?;

        sql.flatten()
            .ok_or_else(|| DumpError::introspection(table, "no CREATE statement in sqlite_master"))
    }

    async fn has_rows(&mut self, table: &str) -> Result<bool> {
        let query = format!("SELECT EXISTS (SELECT 1 FROM {})", self.quote(table));
        let found: i64 = self
            .conn
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| DumpError::introspection(table, e))?;
        Ok(found != 0)
    }

    async fn primary_key(&mut self, table: &str) -> Result<Option<PrimaryKey>> {
        let columns = self
            .key_columns(table)
            .map_err(|e| DumpError::introspection(table, e))?;

        let Some((column, declared_type)) = columns.first().cloned() else {
            return Ok(None);
        };
        if columns.len() > 1 {
            tracing::debug!(
                "Table '{}' has a {}-column primary key, chunking on '{}' only",
                sanitize_identifier(table),
                columns.len(),
                sanitize_identifier(&column)
            );
        }

        match self
            .key_range(table, &column)
            .map_err(|e| DumpError::introspection(table, e))?
        {
            (Some(min), Some(max)) => Ok(Some(PrimaryKey {
                column,
                declared_type,
                min,
                max,
            })),
            _ => Ok(None),
        }
    }

    async fn fetch_page(&mut self, table: &str, page: &PageDescriptor) -> Result<RowBatch> {
        let batch = match page {
            PageDescriptor::KeyRange {
                column,
                bound,
                lower,
                upper,
            } => {
                let query = format!(
                    "SELECT * FROM {table} WHERE {col} >= ?1 AND {col} < ?2",
                    table = self.quote(table),
                    col = self.quote(column)
                );
                match bound {
                    KeyBound::Numeric => self.select(&query, params![lower, upper]),
                    KeyBound::Lexical => {
                        self.select(&query, params![lower.to_string(), upper.to_string()])
                    }
                }
            }
            PageDescriptor::OffsetLimit { offset, limit } => {
                let query = format!("SELECT * FROM {} LIMIT ?1 OFFSET ?2", self.quote(table));
                let limit = i64::try_from(*limit).unwrap_or(i64::MAX);
                let offset = i64::try_from(*offset).unwrap_or(i64::MAX);
                self.select(&query, params![limit, offset])
            }
        }
        .map_err(|e| DumpError::query(table, e))?;

        Ok(batch)
    }
}
