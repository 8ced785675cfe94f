// ABOUTME: Table exporter driving structure, planning, fetching and writing per table
// ABOUTME: Tracks per-table outcomes so partially exported tables are reported

use super::planner::{self, PagePlan, PaginationMode};
use super::serializer::{render_insert, render_structure};
use crate::config::ExportOptions;
use crate::dialect::DialectDriver;
use crate::error::{DumpError, Result};
use crate::utils::sanitize_identifier;
use indicatif::ProgressBar;
use std::io::Write;

/// How a table's export ended
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    /// Structure and every planned page written
    Complete,
    /// No rows; only the structure was written
    Empty,
    /// Stopped at a failing page; earlier pages are in the output
    Partial { error: String },
    /// Nothing written for this table
    Skipped { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub table: String,
    pub mode: Option<PaginationMode>,
    /// Pages that produced an INSERT statement
    pub pages: u64,
    pub rows: u64,
    pub outcome: TableOutcome,
}

impl TableReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            mode: None,
            pages: 0,
            rows: 0,
            outcome: TableOutcome::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, TableOutcome::Complete | TableOutcome::Empty)
    }
}

/// Result of a whole run, one report per exported table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub tables: Vec<TableReport>,
}

impl ExportSummary {
    /// True if every table was fully exported
    pub fn is_complete(&self) -> bool {
        self.tables.iter().all(TableReport::is_complete)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// Tables that were skipped or only partially exported
    pub fn incomplete(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| !t.is_complete())
    }

    pub fn report(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Exports tables from one open driver into one sink
///
/// Both are borrowed for the duration of the run and used strictly one call
/// at a time: a page is fetched, written and dropped before the next page
/// is requested.
pub struct TableExporter<'a, W: Write> {
    driver: &'a mut dyn DialectDriver,
    sink: &'a mut W,
    options: &'a ExportOptions,
    progress: Option<ProgressBar>,
}

impl<'a, W: Write> TableExporter<'a, W> {
    pub fn new(driver: &'a mut dyn DialectDriver, sink: &'a mut W, options: &'a ExportOptions) -> Self {
        Self {
            driver,
            sink,
            options,
            progress: None,
        }
    }

    /// Advance `progress` by one for every table handled
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Tables the run will export, in the database's own order
    pub async fn tables(&mut self) -> Result<Vec<String>> {
        let tables = self.driver.list_tables().await?;
        Ok(tables
            .into_iter()
            .filter(|t| self.options.should_export(t))
            .collect())
    }

    /// Export every selected table
    ///
    /// Only fatal errors (listing tables, writing the sink) are returned;
    /// per-table failures are recorded in the summary.
    pub async fn export_database(&mut self) -> Result<ExportSummary> {
        let tables = self.tables().await?;
        if let Some(progress) = &self.progress {
            progress.set_length(tables.len() as u64);
        }

        let mut summary = ExportSummary::default();
        for table in &tables {
            if let Some(progress) = &self.progress {
                progress.set_message(sanitize_identifier(table));
            }
            let report = self.export_table(table).await?;
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            summary.tables.push(report);
        }
        Ok(summary)
    }

    /// Export one table: structure, then every planned page
    ///
    /// Returns `Err` only for run-fatal failures such as a broken sink. The
    /// first failing page stops the table in both pagination modes.
    pub async fn export_table(&mut self, table: &str) -> Result<TableReport> {
        let shown = sanitize_identifier(table);
        let mut report = TableReport::new(table);
        tracing::info!("Exporting table '{}'", shown);

        let ddl = match self.driver.table_ddl(table).await {
            Ok(ddl) => ddl,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(skip(report, e)),
        };

        let plan = match planner::plan(&mut *self.driver, table, self.options).await {
            Ok(plan) => plan,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(skip(report, e)),
        };
        report.mode = plan.mode();

        self.sink
            .write_all(render_structure(table, &ddl).as_bytes())?;

        if plan == PagePlan::Empty {
            tracing::info!("  Table '{}' is empty, wrote structure only", shown);
            report.outcome = TableOutcome::Empty;
            return Ok(report);
        }

        let dialect = self.driver.dialect();
        let stop_on_empty = plan.mode() == Some(PaginationMode::Offset);

        for page in plan.pages() {
            let batch = match self.driver.fetch_page(table, &page).await {
                Ok(batch) => batch,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        "  Stopping export of '{}' after {} pages: {}",
                        shown,
                        report.pages,
                        e
                    );
                    report.outcome = TableOutcome::Partial {
                        error: e.to_string(),
                    };
                    return Ok(report);
                }
            };

            match render_insert(dialect, table, &batch) {
                Some(statement) => {
                    self.sink.write_all(statement.as_bytes())?;
                    report.pages += 1;
                    report.rows += batch.len() as u64;
                    tracing::debug!("  {:?}: {} rows", page, batch.len());
                }
                None if stop_on_empty => break,
                None => {}
            }
        }

        tracing::info!(
            "✓ Exported '{}': {} rows in {} statements ({} mode)",
            shown,
            report.rows,
            report.pages,
            report.mode.map(|m| m.to_string()).unwrap_or_default()
        );
        Ok(report)
    }
}

fn skip(mut report: TableReport, error: DumpError) -> TableReport {
    tracing::warn!(
        "⚠ Skipping table '{}': {}",
        sanitize_identifier(&report.table),
        error
    );
    report.outcome = TableOutcome::Skipped {
        error: error.to_string(),
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, PrimaryKey, RowBatch};
    use crate::dump::planner::PageDescriptor;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory table: `(id, name)` rows, optional integer primary key
    struct FakeTable {
        rows: Vec<(i64, Option<String>)>,
        keyed: bool,
    }

    #[derive(Default)]
    struct FakeDriver {
        tables: Vec<(String, FakeTable)>,
        fetches: HashMap<String, usize>,
        fail_fetch_at: HashMap<String, usize>,
        fail_ddl: Vec<String>,
        connection_lost: bool,
    }

    impl FakeDriver {
        fn with_table(mut self, name: &str, ids: impl IntoIterator<Item = i64>, keyed: bool) -> Self {
            let rows = ids
                .into_iter()
                .map(|id| (id, Some(format!("name {}", id))))
                .collect();
            self.tables.push((name.to_string(), FakeTable { rows, keyed }));
            self
        }

        fn table(&self, name: &str) -> Result<&FakeTable> {
            self.tables
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t)
                .ok_or_else(|| DumpError::introspection(name, "no such table"))
        }
    }

    #[async_trait]
    impl DialectDriver for FakeDriver {
        fn dialect(&self) -> Dialect {
            Dialect::MySql
        }

        async fn list_tables(&mut self) -> Result<Vec<String>> {
            Ok(self.tables.iter().map(|(n, _)| n.clone()).collect())
        }

        async fn table_ddl(&mut self, table: &str) -> Result<String> {
            if self.fail_ddl.iter().any(|t| t == table) {
                return Err(DumpError::introspection(table, "table vanished"));
            }
            self.table(table)?;
            Ok(format!("CREATE TABLE `{}` (`id` int, `name` text)", table))
        }

        async fn has_rows(&mut self, table: &str) -> Result<bool> {
            Ok(!self.table(table)?.rows.is_empty())
        }

        async fn primary_key(&mut self, table: &str) -> Result<Option<PrimaryKey>> {
            let t = self.table(table)?;
            if !t.keyed {
                return Ok(None);
            }
            let min = t.rows.iter().map(|r| r.0).min().unwrap_or_default();
            let max = t.rows.iter().map(|r| r.0).max().unwrap_or_default();
            Ok(Some(PrimaryKey {
                column: "id".to_string(),
                declared_type: "int".to_string(),
                min: min.to_string(),
                max: max.to_string(),
            }))
        }

        async fn fetch_page(&mut self, table: &str, page: &PageDescriptor) -> Result<RowBatch> {
            let count = self.fetches.entry(table.to_string()).or_default();
            *count += 1;
            if self.fail_fetch_at.get(table) == Some(count) {
                if self.connection_lost {
                    return Err(DumpError::connection("server has gone away"));
                }
                return Err(DumpError::query(table, "lock wait timeout exceeded"));
            }

            let t = self.table(table)?;
            let selected: Vec<&(i64, Option<String>)> = match page {
                PageDescriptor::KeyRange { lower, upper, .. } => t
                    .rows
                    .iter()
                    .filter(|(id, _)| lower <= id && id < upper)
                    .collect(),
                PageDescriptor::OffsetLimit { offset, limit } => t
                    .rows
                    .iter()
                    .skip(*offset as usize)
                    .take(*limit as usize)
                    .collect(),
            };

            let mut batch = RowBatch::new(vec!["id".to_string(), "name".to_string()]);
            for (id, name) in selected {
                batch.rows.push(vec![
                    Some(id.to_string().into_bytes()),
                    name.as_ref().map(|n| n.clone().into_bytes()),
                ]);
            }
            Ok(batch)
        }
    }

    async fn run(driver: &mut FakeDriver) -> (ExportSummary, String) {
        let options = ExportOptions::default();
        let mut sink: Vec<u8> = Vec::new();
        let summary = TableExporter::new(driver, &mut sink, &options)
            .export_database()
            .await
            .unwrap();
        (summary, String::from_utf8(sink).unwrap())
    }

    #[tokio::test]
    async fn test_shop_scenario_statement_counts() {
        let mut driver = FakeDriver::default()
            .with_table("users", 1..=2500, true)
            .with_table("logs", 1..=50, false);
        let (summary, output) = run(&mut driver).await;

        assert_eq!(output.matches("INSERT INTO `users` ").count(), 3);
        assert_eq!(output.matches("INSERT INTO `logs` ").count(), 1);
        assert_eq!(output.matches("CREATE TABLE").count(), 2);

        let users = summary.report("users").unwrap();
        assert_eq!(users.rows, 2500);
        assert_eq!(users.mode, Some(PaginationMode::KeyRange));
        let logs = summary.report("logs").unwrap();
        assert_eq!(logs.rows, 50);
        assert_eq!(logs.mode, Some(PaginationMode::Offset));
        assert!(summary.is_complete());
        assert_eq!(summary.total_rows(), 2550);

        // Structure precedes data for every table
        let users_ddl = output.find("-- Table structure for users").unwrap();
        let users_insert = output.find("INSERT INTO `users`").unwrap();
        let logs_ddl = output.find("-- Table structure for logs").unwrap();
        assert!(users_ddl < users_insert && users_insert < logs_ddl);
    }

    #[tokio::test]
    async fn test_offset_paging_fetch_count() {
        for n in [0usize, 1, 999, 1000, 1001, 2500] {
            let mut driver = FakeDriver::default().with_table("logs", 1..=n as i64, false);
            let (summary, _) = run(&mut driver).await;

            let expected = if n == 0 { 0 } else { n.div_ceil(1000) + 1 };
            assert_eq!(
                driver.fetches.get("logs").copied().unwrap_or(0),
                expected,
                "fetch count for {} rows",
                n
            );
            assert_eq!(summary.report("logs").unwrap().rows, n as u64);
        }
    }

    #[tokio::test]
    async fn test_key_range_skips_empty_chunks_without_stopping() {
        // Sparse keys: chunks 1..=4 are empty, chunk 5 holds a row
        let mut driver = FakeDriver::default().with_table("events", [10, 20, 5500], true);
        let (summary, output) = run(&mut driver).await;

        assert_eq!(driver.fetches["events"], 6);
        assert_eq!(output.matches("INSERT INTO `events` ").count(), 2);
        assert_eq!(summary.report("events").unwrap().rows, 3);
    }

    #[tokio::test]
    async fn test_empty_table_keeps_structure_once() {
        let mut driver = FakeDriver::default().with_table("audit", std::iter::empty(), true);
        let (summary, output) = run(&mut driver).await;

        assert_eq!(output.matches("CREATE TABLE `audit`").count(), 1);
        assert!(!output.contains("INSERT INTO"));
        assert!(driver.fetches.is_empty());
        assert_eq!(summary.report("audit").unwrap().outcome, TableOutcome::Empty);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_page_failure_stops_table_in_key_range_mode() {
        let mut driver = FakeDriver::default()
            .with_table("users", 1..=2500, true)
            .with_table("logs", 1..=10, false);
        driver.fail_fetch_at.insert("users".to_string(), 2);
        let (summary, output) = run(&mut driver).await;

        let users = summary.report("users").unwrap();
        assert!(matches!(users.outcome, TableOutcome::Partial { .. }));
        assert_eq!(users.pages, 1);
        assert_eq!(users.rows, 999);
        assert_eq!(driver.fetches["users"], 2);
        assert_eq!(output.matches("INSERT INTO `users` ").count(), 1);

        // The run continues with the next table
        assert!(summary.report("logs").unwrap().is_complete());
        assert!(!summary.is_complete());
        assert_eq!(summary.incomplete().count(), 1);
    }

    #[tokio::test]
    async fn test_page_failure_stops_table_in_offset_mode() {
        let mut driver = FakeDriver::default().with_table("logs", 1..=2500, false);
        driver.fail_fetch_at.insert("logs".to_string(), 3);
        let (summary, output) = run(&mut driver).await;

        let logs = summary.report("logs").unwrap();
        assert!(matches!(logs.outcome, TableOutcome::Partial { .. }));
        assert_eq!(logs.rows, 2000);
        assert_eq!(driver.fetches["logs"], 3);
        assert_eq!(output.matches("INSERT INTO `logs` ").count(), 2);
    }

    #[tokio::test]
    async fn test_ddl_failure_skips_table_entirely() {
        let mut driver = FakeDriver::default()
            .with_table("gone", 1..=5, true)
            .with_table("kept", 1..=5, true);
        driver.fail_ddl.push("gone".to_string());
        let (summary, output) = run(&mut driver).await;

        assert!(!output.contains("gone"));
        assert!(matches!(
            summary.report("gone").unwrap().outcome,
            TableOutcome::Skipped { .. }
        ));
        assert!(summary.report("kept").unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_table_filters_apply() {
        let mut driver = FakeDriver::default()
            .with_table("users", 1..=3, true)
            .with_table("sessions", 1..=3, true);
        let options = ExportOptions {
            exclude_tables: vec!["sessions".to_string()],
            ..Default::default()
        };
        let mut sink: Vec<u8> = Vec::new();
        let summary = TableExporter::new(&mut driver, &mut sink, &options)
            .export_database()
            .await
            .unwrap();

        assert_eq!(summary.tables.len(), 1);
        assert!(!String::from_utf8(sink).unwrap().contains("sessions"));
    }

    #[tokio::test]
    async fn test_lost_connection_aborts_run() {
        let mut driver = FakeDriver::default()
            .with_table("users", 1..=2500, true)
            .with_table("logs", 1..=10, false);
        driver.fail_fetch_at.insert("users".to_string(), 2);
        driver.connection_lost = true;

        let options = ExportOptions::default();
        let mut sink: Vec<u8> = Vec::new();
        let result = TableExporter::new(&mut driver, &mut sink, &options)
            .export_database()
            .await;

        assert!(matches!(result, Err(DumpError::Connection(_))));
        assert!(!driver.fetches.contains_key("logs"));
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_run() {
        let mut driver = FakeDriver::default().with_table("users", 1..=3, true);
        let options = ExportOptions::default();
        let mut sink = FailingSink;
        let result = TableExporter::new(&mut driver, &mut sink, &options)
            .export_database()
            .await;

        assert!(matches!(result, Err(DumpError::Sink(_))));
    }
}
