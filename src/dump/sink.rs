// ABOUTME: Gzip-compressed output file for the generated SQL script
// ABOUTME: Names the artifact after the database and the hour the export started

use chrono::{DateTime, TimeZone};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Artifact file name: `<database>_<YYYY_MM_DD_HH>.sql.gz`
///
/// Two runs started within the same hour produce the same name.
///
/// # Examples
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use sqldump::dump::sink::artifact_name;
/// let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 35, 10).unwrap();
/// assert_eq!(artifact_name("shop", &started), "shop_2024_03_09_14.sql.gz");
/// ```
pub fn artifact_name<Tz: TimeZone>(database: &str, started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.sql.gz", database, started_at.format("%Y_%m_%d_%H"))
}

/// Append-only gzip stream over a file
///
/// [`DumpFile::finish`] writes the gzip trailer and flushes the file; it
/// consumes the value so it can only happen once. If a `DumpFile` is dropped
/// on an error path the encoder still finishes the stream on a best-effort
/// basis, so whatever was written stays readable.
pub struct DumpFile {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    bytes_written: u64,
}

impl DumpFile {
    /// Create (or truncate) the artifact at `path`
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        tracing::debug!("Writing dump to {}", path.display());
        Ok(Self {
            path,
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Uncompressed bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Finish the gzip stream and flush everything to disk
    pub fn finish(self) -> io::Result<PathBuf> {
        let mut writer = self.encoder.finish()?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(self.path)
    }
}

impl Write for DumpFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.encoder.write(buf)?;
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}
