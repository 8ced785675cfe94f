// ABOUTME: Export command implementation - Dump a database to a gzip SQL script
// ABOUTME: Connects, exports every selected table and reports per-table outcomes

use crate::config::{ExportOptions, ExportTarget};
use crate::dialect;
use crate::dump::{artifact_name, DumpFile, ExportSummary, TableExporter, TableOutcome};
use crate::utils::{format_bytes, sanitize_identifier};
use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// What an export run produced
#[derive(Debug)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub summary: ExportSummary,
    /// Size of the SQL text before compression
    pub uncompressed_bytes: u64,
}

/// Export a database to a compressed SQL script
///
/// The connection is opened before the output file is created, so a failed
/// connection leaves no artifact behind. Per-table failures do not abort the
/// run; they are reported in the returned summary.
///
/// # Errors
///
/// This function will return an error if:
/// - The target or options are invalid
/// - Cannot connect to the database
/// - Cannot list its tables
/// - Cannot create or write the output file
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use sqldump::commands::export;
/// # use sqldump::config::{ExportOptions, ExportTarget};
/// # use sqldump::dialect::Dialect;
/// # async fn example() -> Result<()> {
/// let target = ExportTarget {
///     host: "localhost".to_string(),
///     port: 3306,
///     user: "root".to_string(),
///     password: "secret".to_string(),
///     database: "shop".to_string(),
///     dialect: Dialect::MySql,
/// };
/// let artifact = export(&target, &ExportOptions::default()).await?;
/// println!("wrote {}", artifact.path.display());
/// # Ok(())
/// # }
/// ```
pub async fn export(target: &ExportTarget, options: &ExportOptions) -> Result<ExportArtifact> {
    options.validate()?;
    tracing::info!(
        "Starting export of '{}' ({})",
        sanitize_identifier(&target.database),
        target.dialect
    );

    let mut driver = dialect::connect(target)
        .await
        .context("Failed to connect to source database")?;

    let path = options.output.clone().unwrap_or_else(|| {
        PathBuf::from(artifact_name(&target.artifact_stem(), &Local::now()))
    });
    let mut sink = DumpFile::create(&path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let summary = TableExporter::new(&mut *driver, &mut sink, options)
        .with_progress(progress.clone())
        .export_database()
        .await
        .with_context(|| format!("Export aborted, {} is incomplete", path.display()))?;
    progress.finish_with_message("Export complete");

    let uncompressed_bytes = sink.bytes_written();
    let path = sink
        .finish()
        .with_context(|| format!("Failed to finish output file {}", path.display()))?;

    log_summary(&summary, &path, uncompressed_bytes);

    Ok(ExportArtifact {
        path,
        summary,
        uncompressed_bytes,
    })
}

fn log_summary(summary: &ExportSummary, path: &std::path::Path, uncompressed_bytes: u64) {
    let compressed = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Export Summary");
    tracing::info!("========================================");
    tracing::info!("Tables: {}", summary.tables.len());
    tracing::info!("Rows: {}", summary.total_rows());
    tracing::info!(
        "Output: {} ({} compressed, {} uncompressed)",
        path.display(),
        format_bytes(compressed),
        format_bytes(uncompressed_bytes)
    );
    tracing::info!("========================================");

    if summary.is_complete() {
        tracing::info!("✓ All tables exported");
        return;
    }

    for report in summary.incomplete() {
        let table = sanitize_identifier(&report.table);
        match &report.outcome {
            TableOutcome::Partial { error } => tracing::error!(
                "  ✗ {}: partial, {} rows written before failure: {}",
                table,
                report.rows,
                error
            ),
            TableOutcome::Skipped { error } => {
                tracing::error!("  ✗ {}: skipped: {}", table, error)
            }
            TableOutcome::Complete | TableOutcome::Empty => {}
        }
    }
}
