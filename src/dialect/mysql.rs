// ABOUTME: MySQL driver reading schema and pages over a single mysql_async connection
// ABOUTME: Renders binary-protocol values back to the text MySQL would print

use super::{Dialect, DialectDriver, PrimaryKey, RawValue, RowBatch};
use crate::config::ExportTarget;
use crate::dump::planner::{KeyBound, PageDescriptor};
use crate::error::{DumpError, Result};
use crate::utils::sanitize_identifier;
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Row, Value};

pub struct MySqlDriver {
    conn: Conn,
    database: String,
}

impl MySqlDriver {
    /// Open one connection to the target database
    pub async fn connect(target: &ExportTarget) -> Result<Self> {
        tracing::info!(
            "Connecting to MySQL at {}:{} (database '{}')",
            target.host,
            target.port,
            target.database
        );

        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(target.host.clone())
            .tcp_port(target.port)
            .user(Some(target.user.clone()))
            .pass(Some(target.password.clone()))
            .db_name(Some(target.database.clone()))
            .into();

        let mut conn = Conn::new(opts).await.map_err(classify_connect_error)?;

        // Verify we can query
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| DumpError::connection(format!("MySQL query failed: {}", e)))?;

        tracing::debug!("Connected to MySQL database '{}'", target.database);

        Ok(Self {
            conn,
            database: target.database.clone(),
        })
    }

    fn quote(&self, identifier: &str) -> String {
        Dialect::MySql.quote_identifier(identifier)
    }
}

fn classify_connect_error(e: mysql_async::Error) -> DumpError {
    let error_msg = e.to_string();

    if error_msg.contains("Access denied") {
        DumpError::connection(format!(
            "Authentication failed: Invalid username or password.\n\
             Please verify your database credentials.\n\
             Error: {}",
            error_msg
        ))
    } else if error_msg.contains("Unknown database") {
        DumpError::connection(format!(
            "Database does not exist: {}\n\
             Please check the database name.",
            error_msg
        ))
    } else if error_msg.contains("Connection refused") || error_msg.contains("os error 111") {
        DumpError::connection(format!(
            "Connection refused: Unable to reach database server.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            error_msg
        ))
    } else {
        DumpError::connection(format!("Failed to connect to MySQL: {}", error_msg))
    }
}

/// Text form of a MySQL value, `None` for NULL
///
/// Text-protocol results arrive as bytes already. Prepared statements return
/// typed values, which are printed the way MySQL prints them.
fn value_to_raw(value: Value) -> RawValue {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(bytes),
        Value::Int(n) => Some(n.to_string().into_bytes()),
        Value::UInt(n) => Some(n.to_string().into_bytes()),
        Value::Float(n) => Some(n.to_string().into_bytes()),
        Value::Double(n) => Some(n.to_string().into_bytes()),
        Value::Date(year, month, day, hour, min, sec, micro) => {
            let mut text = format!("{:04}-{:02}-{:02}", year, month, day);
            if hour != 0 || min != 0 || sec != 0 || micro != 0 {
                text.push_str(&format!(" {:02}:{:02}:{:02}", hour, min, sec));
                if micro != 0 {
                    text.push_str(&format!(".{:06}", micro));
                }
            }
            Some(text.into_bytes())
        }
        Value::Time(neg, days, hours, mins, secs, micro) => {
            let sign = if neg { "-" } else { "" };
            let total_hours = days * 24 + hours as u32;
            let mut text = format!("{}{:02}:{:02}:{:02}", sign, total_hours, mins, secs);
            if micro != 0 {
                text.push_str(&format!(".{:06}", micro));
            }
            Some(text.into_bytes())
        }
    }
}

fn rows_to_batch(rows: Vec<Row>) -> RowBatch {
    let columns = rows
        .first()
        .map(|row| {
            row.columns_ref()
                .iter()
                .map(|col| col.name_str().to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut batch = RowBatch::new(columns);
    batch.rows = rows
        .into_iter()
        .map(|row| {
            row.unwrap_raw()
                .into_iter()
                .map(|value| value_to_raw(value.unwrap_or(Value::NULL)))
                .collect()
        })
        .collect();
    batch
}

#[async_trait]
impl DialectDriver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows: Vec<(String, String)> = self
            .conn
            .query("SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'")
            .await
            .map_err(|e| {
                DumpError::introspection(&self.database, format!("Failed to list tables: {}", e))
            })?;

        let tables: Vec<String> = rows.into_iter().map(|(name, _)| name).collect();
        tracing::debug!("Found {} tables in '{}'", tables.len(), self.database);
        Ok(tables)
    }

    async fn table_ddl(&mut self, table: &str) -> Result<String> {
        let query = format!("SHOW CREATE TABLE {}", self.quote(table));
        let row: Option<(String, String)> = self
            .conn
            .query_first(query)
            .await
            .map_err(|e| DumpError::introspection(table, e))?;

        row.map(|(_, ddl)| ddl)
            .ok_or_else(|| DumpError::introspection(table, "SHOW CREATE TABLE returned no rows"))
    }

    async fn has_rows(&mut self, table: &str) -> Result<bool> {
        let query = format!("SELECT 1 FROM {} LIMIT 1", self.quote(table));
        let found: Option<i64> = self
            .conn
            .query_first(query)
            .await
            .map_err(|e| DumpError::introspection(table, e))?;
        Ok(found.is_some())
    }

    async fn primary_key(&mut self, table: &str) -> Result<Option<PrimaryKey>> {
        let columns: Vec<(String, String)> = self
            .conn
            .exec(
                r"
                SELECT k.COLUMN_NAME, c.COLUMN_TYPE
                FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
                JOIN INFORMATION_SCHEMA.COLUMNS c
                  ON c.TABLE_SCHEMA = k.TABLE_SCHEMA
                 AND c.TABLE_NAME = k.TABLE_NAME
                 AND c.COLUMN_NAME = k.COLUMN_NAME
                WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ?
                  AND k.CONSTRAINT_NAME = 'PRIMARY'
                ORDER BY k.ORDINAL_POSITION
                ",
                (self.database.as_str(), table),
            )
            .await
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

        let quoted = self.quote(&column);
        let query = format!(
            "SELECT CAST(MIN({col}) AS CHAR), CAST(MAX({col}) AS CHAR) FROM {table}",
            col = quoted,
            table = self.quote(table)
        );
        let range: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_first(query)
            .await
            .map_err(|e| DumpError::introspection(table, e))?;

        match range {
            Some((Some(min), Some(max))) => Ok(Some(PrimaryKey {
                column,
                declared_type,
                min,
                max,
            })),
            _ => Ok(None),
        }
    }

    async fn fetch_page(&mut self, table: &str, page: &PageDescriptor) -> Result<RowBatch> {
        let rows: Vec<Row> = match page {
            PageDescriptor::KeyRange {
                column,
                bound,
                lower,
                upper,
            } => {
                let query = format!(
                    "SELECT * FROM {table} WHERE {col} >= ? AND {col} < ?",
                    table = self.quote(table),
                    col = self.quote(column)
                );
                match bound {
                    KeyBound::Numeric => self.conn.exec(query, (*lower, *upper)).await,
                    KeyBound::Lexical => {
                        self.conn
                            .exec(query, (lower.to_string(), upper.to_string()))
                            .await
                    }
                }
            }
            PageDescriptor::OffsetLimit { offset, limit } => {
                let query = format!("SELECT * FROM {} LIMIT ? OFFSET ?", self.quote(table));
                self.conn.exec(query, (*limit, *offset)).await
            }
        }
        .map_err(|e| DumpError::query(table, e))?;

        Ok(rows_to_batch(rows))
    }
}
