// ABOUTME: CLI entry point for sqldump
// ABOUTME: Parses connection flags and runs one export

use clap::{ArgAction, Parser};
use sqldump::commands;
use sqldump::config::{load_options_from_file, ExportOptions, ExportTarget};
use sqldump::dialect::Dialect;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sqldump")]
#[command(about = "Export a MySQL, PostgreSQL or SQLite database to a gzip SQL script", long_about = None)]
#[command(version, disable_help_flag = true)]
struct Cli {
    /// Database driver: mysql, pgsql or sqlite
    #[arg(long, default_value = "mysql")]
    driver: Dialect,
    /// Database server host
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,
    /// Database server port (defaults to the driver's standard port)
    #[arg(long)]
    port: Option<u16>,
    /// Database user
    #[arg(short = 'u', long, default_value = "")]
    user: String,
    /// Database password
    #[arg(short = 'p', long, env = "SQLDUMP_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,
    /// Database name, or the database file for sqlite
    #[arg(short = 'd', long)]
    database: String,
    /// Output file (defaults to <database>_<YYYY_MM_DD_HH>.sql.gz)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Path to a TOML file with export options
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
    /// Rows per page for tables without a usable primary key
    #[arg(long)]
    page_size: Option<u64>,
    /// Key values per chunk for tables with an integer primary key
    #[arg(long)]
    chunk_size: Option<i64>,
    /// Include only these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_tables: Option<Vec<String>>,
    /// Exclude these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn target(&self) -> ExportTarget {
        ExportTarget {
            host: self.host.clone(),
            port: self.port.unwrap_or_else(|| self.driver.default_port()),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            dialect: self.driver,
        }
    }

    /// File options first, then any flag given on the command line
    fn options(&self) -> anyhow::Result<ExportOptions> {
        let mut options = match &self.config_path {
            Some(path) => load_options_from_file(path)?,
            None => ExportOptions::default(),
        };

        if let Some(page_size) = self.page_size {
            options.page_size = page_size;
        }
        if let Some(chunk_size) = self.chunk_size {
            options.chunk_size = chunk_size;
        }
        if let Some(include) = &self.include_tables {
            options.include_tables = include.clone();
        }
        if let Some(exclude) = &self.exclude_tables {
            options.exclude_tables = exclude.clone();
        }
        if let Some(output) = &self.output {
            options.output = Some(output.clone());
        }

        options.validate()?;
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = cli.options()?;
    let artifact = commands::export(&cli.target(), &options).await?;

    if !artifact.summary.is_complete() {
        anyhow::bail!(
            "{} of {} tables were not fully exported; {} is incomplete",
            artifact.summary.incomplete().count(),
            artifact.summary.tables.len(),
            artifact.path.display()
        );
    }

    Ok(())
}
