// ABOUTME: SQL dialects and the driver capability every database engine implements
// ABOUTME: Quoting rules per dialect plus connection dispatch for one export run

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::config::ExportTarget;
use crate::dump::planner::PageDescriptor;
use crate::error::{DumpError, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// The SQL engines an export can read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Port used when none is given. SQLite has no server, so 0.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
            Self::Sqlite => 0,
        }
    }

    /// Quote an identifier, doubling any embedded quote character
    ///
    /// # Examples
    ///
    /// ```
    /// # use sqldump::dialect::Dialect;
    /// assert_eq!(Dialect::MySql.quote_identifier("name"), "`name`");
    /// assert_eq!(Dialect::Postgres.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    /// ```
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let quote = match self {
            Self::MySql => '`',
            Self::Postgres | Self::Sqlite => '"',
        };
        let mut quoted = String::with_capacity(identifier.len() + 2);
        quoted.push(quote);
        for c in identifier.chars() {
            if c == quote {
                quoted.push(quote);
            }
            quoted.push(c);
        }
        quoted.push(quote);
        quoted
    }

    /// Quote a value as a string literal
    ///
    /// Single quotes are doubled in every dialect. MySQL also treats the
    /// backslash as an escape character unless `NO_BACKSLASH_ESCAPES` is set,
    /// so backslashes and NUL bytes are escaped there as well.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sqldump::dialect::Dialect;
    /// assert_eq!(Dialect::Sqlite.quote_string("O'Brien"), "'O''Brien'");
    /// assert_eq!(Dialect::MySql.quote_string("C:\\tmp"), "'C:\\\\tmp'");
    /// assert_eq!(Dialect::Postgres.quote_string("C:\\tmp"), "'C:\\tmp'");
    /// ```
    pub fn quote_string(&self, value: &str) -> String {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('\'');
        for c in value.chars() {
            match c {
                '\'' => quoted.push_str("''"),
                '\\' if *self == Self::MySql => quoted.push_str("\\\\"),
                '\0' if *self == Self::MySql => quoted.push_str("\\0"),
                _ => quoted.push(c),
            }
        }
        quoted.push('\'');
        quoted
    }

    /// Literal for a value that is not valid UTF-8 text
    pub fn binary_literal(&self, bytes: &[u8]) -> String {
        match self {
            Self::MySql | Self::Sqlite => format!("X'{}'", hex::encode(bytes)),
            Self::Postgres => format!("'\\x{}'", hex::encode(bytes)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MySql => write!(f, "mysql"),
            Self::Postgres => write!(f, "pgsql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Dialect {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(DumpError::config(format!(
                "unsupported driver '{}'. Expected one of: mysql, pgsql, sqlite",
                other
            ))),
        }
    }
}

/// A single nullable column value as fetched, before any quoting
pub type RawValue = Option<Vec<u8>>;

/// Rows returned by one page fetch, aligned with `columns`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RowBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// First primary key column of a table together with its observed range
///
/// `min` and `max` are the textual form of the key values; the planner
/// decides whether they are usable as chunk bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub column: String,
    pub declared_type: String,
    pub min: String,
    pub max: String,
}

/// What an export needs from a database engine
///
/// One driver wraps one open connection. The exporter calls it strictly
/// sequentially.
#[async_trait]
pub trait DialectDriver: Send {
    fn dialect(&self) -> Dialect;

    /// Base tables of the target database, in the engine's own order
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Statement recreating the table, without a trailing semicolon
    async fn table_ddl(&mut self, table: &str) -> Result<String>;

    /// Cheap check whether the table holds at least one row
    async fn has_rows(&mut self, table: &str) -> Result<bool>;

    /// First primary key column with its min/max values, `None` without a
    /// primary key (or when the table has no rows to bound)
    async fn primary_key(&mut self, table: &str) -> Result<Option<PrimaryKey>>;

    /// Run one bounded query for the page
    async fn fetch_page(&mut self, table: &str, page: &PageDescriptor) -> Result<RowBatch>;
}

/// Open a driver for the target's dialect
pub async fn connect(target: &ExportTarget) -> Result<Box<dyn DialectDriver>> {
    target.validate()?;
    match target.dialect {
        Dialect::MySql => Ok(Box::new(MySqlDriver::connect(target).await?)),
        Dialect::Postgres => Ok(Box::new(PostgresDriver::connect(target).await?)),
        Dialect::Sqlite => Ok(Box::new(SqliteDriver::open(&target.database)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver_names() {
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("pgsql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for dialect in [Dialect::MySql, Dialect::Postgres, Dialect::Sqlite] {
            assert_eq!(dialect.to_string().parse::<Dialect>().unwrap(), dialect);
        }
    }

    #[test]
    fn test_quote_identifier_escapes_quote_char() {
        assert_eq!(Dialect::MySql.quote_identifier("a`b"), "`a``b`");
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::MySql.quote_identifier("a\"b"), "`a\"b`");
    }

    #[test]
    fn test_reserved_and_mixed_case_names_are_quoted() {
        assert_eq!(Dialect::Sqlite.quote_identifier("transaction"), "\"transaction\"");
        assert_eq!(Dialect::MySql.quote_identifier("order items"), "`order items`");
        assert_eq!(Dialect::Postgres.quote_identifier("Users"), "\"Users\"");
    }

    #[test]
    fn test_quote_string_neutralizes_injection() {
        let hostile = "x'); DROP TABLE users; --";
        assert_eq!(
            Dialect::Postgres.quote_string(hostile),
            "'x''); DROP TABLE users; --'"
        );

        // A trailing backslash must not escape the closing quote in MySQL
        assert_eq!(Dialect::MySql.quote_string("abc\\"), "'abc\\\\'");
        assert_eq!(Dialect::MySql.quote_string("a\\'b"), "'a\\\\''b'");
        assert_eq!(Dialect::MySql.quote_string("nul\0byte"), "'nul\\0byte'");
    }

    #[test]
    fn test_binary_literal() {
        assert_eq!(Dialect::MySql.binary_literal(&[0xff, 0x00]), "X'ff00'");
        assert_eq!(Dialect::Sqlite.binary_literal(&[0xde, 0xad]), "X'dead'");
        assert_eq!(Dialect::Postgres.binary_literal(&[0xbe, 0xef]), "'\\xbeef'");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Dialect::MySql.default_port(), 3306);
        assert_eq!(Dialect::Postgres.default_port(), 5432);
    }

    #[test]
    fn test_row_batch() {
        let mut batch = RowBatch::new(vec!["id".to_string()]);
        assert!(batch.is_empty());
        batch.rows.push(vec![Some(b"1".to_vec())]);
        assert_eq!(batch.len(), 1);
    }
}
