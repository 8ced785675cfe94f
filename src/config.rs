// ABOUTME: Connection descriptor and export tunables
// ABOUTME: Loads optional TOML settings and decides which tables are exported

use crate::dialect::Dialect;
use crate::error::{DumpError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Rows requested per page in offset mode
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Key values covered by one chunk in key-range mode
pub const DEFAULT_CHUNK_SIZE: i64 = 1000;

/// Where to read from. Immutable for the lifetime of one export run.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database name, or the database file path for SQLite
    pub database: String,
    pub dialect: Dialect,
}

impl ExportTarget {
    /// Check that every field the dialect needs is present
    ///
    /// Server dialects need a user, password, host and database. SQLite only
    /// needs the database file path.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(DumpError::config("database name cannot be empty"));
        }
        if self.dialect == Dialect::Sqlite {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.user.is_empty() {
            missing.push("user");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.host.is_empty() {
            missing.push("host");
        }
        if !missing.is_empty() {
            return Err(DumpError::config(format!(
                "missing required connection parameters for {}: {}",
                self.dialect,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Name used for the dump artifact
    ///
    /// For SQLite this is the file stem of the database path.
    pub fn artifact_stem(&self) -> String {
        match self.dialect {
            Dialect::Sqlite => Path::new(&self.database)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sqlite".to_string()),
            _ => self.database.clone(),
        }
    }
}

/// Tunables for one export run
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExportOptions {
    /// Rows per page in offset mode
    pub page_size: u64,
    /// Key values per chunk in key-range mode
    pub chunk_size: i64,
    /// Only export these tables (all tables when empty)
    pub include_tables: Vec<String>,
    /// Never export these tables
    pub exclude_tables: Vec<String>,
    /// Explicit artifact path, overriding the `<db>_<hour>.sql.gz` name
    pub output: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            output: None,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(DumpError::config("page_size must be greater than zero"));
        }
        if self.chunk_size <= 0 {
            return Err(DumpError::config("chunk_size must be greater than zero"));
        }
        if let Some(table) = self
            .include_tables
            .iter()
            .find(|t| self.exclude_tables.contains(t))
        {
            return Err(DumpError::config(format!(
                "table '{}' is both included and excluded",
                table
            )));
        }
        Ok(())
    }

    /// Decide whether a table takes part in the export
    pub fn should_export(&self, table: &str) -> bool {
        if !self.include_tables.is_empty() && !self.include_tables.iter().any(|t| t == table) {
            return false;
        }
        !self.exclude_tables.iter().any(|t| t == table)
    }
}

/// Parse export options from TOML text
///
/// Every key is optional; missing keys keep their defaults.
///
/// # Examples
///
/// ```
/// # use sqldump::config::parse_options;
/// let options = parse_options("page_size = 500\nexclude_tables = [\"sessions\"]").unwrap();
/// assert_eq!(options.page_size, 500);
/// assert_eq!(options.chunk_size, 1000);
/// assert!(!options.should_export("sessions"));
/// ```
pub fn parse_options(contents: &str) -> Result<ExportOptions> {
    let options: ExportOptions = toml::from_str(contents)
        .map_err(|e| DumpError::config(format!("invalid options file: {}", e)))?;
    options.validate()?;
    Ok(options)
}

/// Load export options from a TOML file
pub fn load_options_from_file(path: impl AsRef<Path>) -> Result<ExportOptions> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DumpError::config(format!(
            "failed to read options file {}: {}",
            path.display(),
            e
        ))
    })?;
    tracing::debug!("Loaded export options from {}", path.display());
    parse_options(&contents)
}
