// ABOUTME: PostgreSQL driver over tokio-postgres for tables in the current schema
// ABOUTME: Synthesizes CREATE TABLE from the catalog and fetches every column as text

use super::{Dialect, DialectDriver, PrimaryKey, RowBatch};
use crate::config::ExportTarget;
use crate::dump::planner::{KeyBound, PageDescriptor};
use crate::error::{DumpError, Result};
use crate::utils::sanitize_identifier;
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Resolves `$1` (a table name) to its oid within the current schema
const TABLE_OID: &str = "(quote_ident(current_schema()) || '.' || quote_ident($1))::regclass";

pub struct PostgresDriver {
    client: Client,
    /// Column names of the last table fetched from
    columns: Option<(String, Vec<String>)>,
}

impl PostgresDriver {
    /// Connect with TLS preferred, falling back to plain connections
    pub async fn connect(target: &ExportTarget) -> Result<Self> {
        tracing::info!(
            "Connecting to PostgreSQL at {}:{} (database '{}')",
            target.host,
            target.port,
            target.database
        );

        let mut config = tokio_postgres::Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .user(&target.user)
            .password(&target.password)
            .dbname(&target.database)
            .application_name("sqldump");

        let tls_connector = TlsConnector::builder()
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| DumpError::connection(format!("Failed to build TLS connector: {}", e)))?;
        let tls = MakeTlsConnector::new(tls_connector);

        let (client, connection) = config.connect(tls).await.map_err(classify_connect_error)?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            columns: None,
        })
    }

    fn quote(&self, identifier: &str) -> String {
        Dialect::Postgres.quote_identifier(identifier)
    }

    async fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        if let Some((cached, columns)) = &self.columns {
            if cached == table {
                return Ok(columns.clone());
            }
        }

        let query = format!(
            "SELECT attname FROM pg_catalog.pg_attribute
             WHERE attrelid = {} AND attnum > 0 AND NOT attisdropped
             ORDER BY attnum",
            TABLE_OID
        );
        let rows = self
            .client
            .query(&query, &[&table])
            .await
            .map_err(|e| DumpError::query(table, e))?;
        let columns: Vec<String> = rows.iter().map(|row| row.get(0)).collect();

        self.columns = Some((table.to_string(), columns.clone()));
        Ok(columns)
    }

    /// Primary key columns in key order with their formatted types
    async fn key_columns(&mut self, table: &str) -> Result<Vec<(String, String)>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname, format_type(a.atttypid, a.atttypmod)
                 FROM pg_catalog.pg_constraint con
                 JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid
                 JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace
                 JOIN pg_catalog.pg_attribute a
                   ON a.attrelid = con.conrelid AND a.attnum = ANY(con.conkey)
                 WHERE con.contype = 'p'
                   AND rel.relname = $1
                   AND nsp.nspname = current_schema()
                 ORDER BY array_position(con.conkey, a.attnum)",
                &[&table],
            )
            .await
            .map_err(|e| DumpError::introspection(table, e))?;

        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }
}

fn classify_connect_error(e: tokio_postgres::Error) -> DumpError {
    let error_msg = e.to_string();

    if error_msg.contains("password authentication failed") {
        DumpError::connection(
            "Authentication failed: Invalid username or password.\n\
             Please verify your database credentials.",
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        DumpError::connection(format!(
            "Database does not exist: {}\n\
             Please check the database name.",
            error_msg
        ))
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect")
    {
        DumpError::connection(format!(
            "Connection refused: Unable to reach database server.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            error_msg
        ))
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        DumpError::connection(format!(
            "TLS/SSL error: Failed to establish secure connection.\n\
             Please verify SSL/TLS configuration.\n\
             Error: {}",
            error_msg
        ))
    } else if error_msg.contains("no pg_hba.conf entry") {
        DumpError::connection(format!(
            "Access denied: No pg_hba.conf entry for host.\n\
             The database server is not configured to accept connections from your host.\n\
             Error: {}",
            error_msg
        ))
    } else {
        DumpError::connection(format!("Failed to connect to database: {}", error_msg))
    }
}

/// `CREATE TABLE` text from catalog rows of `(name, type, not_null)`
fn build_create_table(table: &str, columns: &[(String, String, bool)], key: &[String]) -> String {
    let dialect = Dialect::Postgres;
    let mut definitions: Vec<String> = columns
        .iter()
        .map(|(name, data_type, not_null)| {
            let mut definition = format!("{} {}", dialect.quote_identifier(name), data_type);
            if *not_null {
                definition.push_str(" NOT NULL");
            }
            definition
        })
        .collect();

    if !key.is_empty() {
        let key_columns: Vec<String> = key.iter().map(|c| dialect.quote_identifier(c)).collect();
        definitions.push(format!("PRIMARY KEY ({})", key_columns.join(", ")));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n)",
        dialect.quote_identifier(table),
        definitions.join(",\n    ")
    )
}

fn to_i64(table: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DumpError::query(table, format!("{} exceeds bigint", value)))
}

#[async_trait]
impl DialectDriver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = current_schema()",
                &[],
            )
            .await
            .map_err(|e| DumpError::introspection("pg_tables", e))?;

        let tables: Vec<String> = rows.iter().map(|row| row.get(0)).collect();
        tracing::debug!("Found {} tables in current schema", tables.len());
        Ok(tables)
    }

    async fn table_ddl(&mut self, table: &str) -> Result<String> {
        let query = format!(
            "SELECT attname, format_type(atttypid, atttypmod), attnotnull
             FROM pg_catalog.pg_attribute
             WHERE attrelid = {} AND attnum > 0 AND NOT attisdropped
             ORDER BY attnum",
            TABLE_OID
        );
        let rows = self
            .client
            .query(&query, &[&table])
            .await
            .map_err(|e| DumpError::introspection(table, e))?;
        if rows.is_empty() {
            return Err(DumpError::introspection(table, "table has no columns"));
        }

        let columns: Vec<(String, String, bool)> = rows
            .iter()
            .map(|row| (row.get(0), row.get(1), row.get(2)))
            .collect();
        let key: Vec<String> = self
            .key_columns(table)
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        Ok(build_create_table(table, &columns, &key))
    }

    async fn has_rows(&mut self, table: &str) -> Result<bool> {
        let query = format!("SELECT EXISTS (SELECT 1 FROM {})", self.quote(table));
        let row = self
            .client
            .query_one(&query, &[])
            .await
            .map_err(|e| DumpError::introspection(table, e))?;
        Ok(row.get(0))
    }

    async fn primary_key(&mut self, table: &str) -> Result<Option<PrimaryKey>> {
        let key = self.key_columns(table).await?;
        let Some((column, declared_type)) = key.first().cloned() else {
            return Ok(None);
        };
        if key.len() > 1 {
            tracing::debug!(
                "Table '{}' has a {}-column primary key, chunking on '{}' only",
                sanitize_identifier(table),
                key.len(),
                sanitize_identifier(&column)
            );
        }

        let query = format!(
            "SELECT min({col})::text, max({col})::text FROM {table}",
            col = self.quote(&column),
            table = self.quote(table)
        );
        let row = self
            .client
            .query_one(&query, &[])
            .await
            .map_err(|e| DumpError::introspection(table, e))?;

        let min: Option<String> = row.get(0);
        let max: Option<String> = row.get(1);
        match (min, max) {
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
        let columns = self.column_names(table).await?;
        let select_list = columns
            .iter()
            .map(|c| format!("{}::text", self.quote(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let from = format!("SELECT {} FROM {}", select_list, self.quote(table));

        let rows = match page {
            PageDescriptor::KeyRange {
                column,
                bound,
                lower,
                upper,
            } => {
                let col = self.quote(column);
                match bound {
                    KeyBound::Numeric => {
                        let query =
                            format!("{} WHERE {col} >= $1::int8 AND {col} < $2::int8", from);
                        let params: [&(dyn ToSql + Sync); 2] = [lower, upper];
                        self.client.query(&query, &params).await
                    }
                    KeyBound::Lexical => {
                        let query =
                            format!("{} WHERE {col} >= $1::text AND {col} < $2::text", from);
                        let (lower, upper) = (lower.to_string(), upper.to_string());
                        let params: [&(dyn ToSql + Sync); 2] = [&lower, &upper];
                        self.client.query(&query, &params).await
                    }
                }
            }
            PageDescriptor::OffsetLimit { offset, limit } => {
                let query = format!("{} LIMIT $1::int8 OFFSET $2::int8", from);
                let (limit, offset) = (to_i64(table, *limit)?, to_i64(table, *offset)?);
                self.client.query(&query, &[&limit, &offset]).await
            }
        }
        .map_err(|e| DumpError::query(table, e))?;

        let mut batch = RowBatch::new(columns);
        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                let value: Option<String> = row
                    .try_get(idx)
                    .map_err(|e| DumpError::serialization(table, e))?;
                values.push(value.map(String::into_bytes));
            }
            batch.rows.push(values);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_create_table() {
        let columns = vec![
            ("id".to_string(), "integer".to_string(), true),
            ("email".to_string(), "character varying(255)".to_string(), false),
        ];
        let ddl = build_create_table("users", &columns, &["id".to_string()]);
        assert_eq!(
            ddl,
            "CREATE TABLE \"users\" (\n    \"id\" integer NOT NULL,\n    \"email\" character varying(255),\n    PRIMARY KEY (\"id\")\n)"
        );
    }

    #[test]
    fn test_build_create_table_without_key() {
        let columns = vec![("line".to_string(), "text".to_string(), false)];
        let ddl = build_create_table("Audit Log", &columns, &[]);
        assert_eq!(ddl, "CREATE TABLE \"Audit Log\" (\n    \"line\" text\n)");
    }

    #[test]
    fn test_offset_bounds_fit_bigint() {
        assert_eq!(to_i64("t", 1000).unwrap(), 1000);
        assert!(matches!(to_i64("t", u64::MAX), Err(DumpError::Query { .. })));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let target = ExportTarget {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "postgres".to_string(),
            password: "secret".to_string(),
            database: "shop".to_string(),
            dialect: Dialect::Postgres,
        };
        let result = PostgresDriver::connect(&target).await;
        assert!(matches!(result, Err(DumpError::Connection(_))));
    }
}
