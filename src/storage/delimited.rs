//! Delimited (CSV) file sink
//!
//! Exports land in `{dir}/{table}-{YYYYMMDD}.csv`, dated in UTC. A rerun on
//! the same day replaces the earlier file.

use crate::error::{PipelineError, Result};
use crate::etl::{ExportArtifact, LoadSession, Loader};
use crate::record::{Record, Schema};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// How fields containing the delimiter are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quoting {
    /// Values are written verbatim; an embedded comma shifts the columns
    #[default]
    Never,
    /// Quote fields holding a comma, quote or newline
    Rfc4180,
}

impl FromStr for Quoting {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" | "none" => Ok(Self::Never),
            "rfc4180" | "necessary" => Ok(Self::Rfc4180),
            other => Err(format!("unknown quoting '{}', expected never or rfc4180", other)),
        }
    }
}

/// Loader that exports records to a dated CSV file
///
/// Rows are staged in a hidden temporary file next to the target and renamed
/// over it on commit, so a failed run never leaves a partial or truncated
/// export behind.
///
/// # Example
/// ```no_run
/// use tablepipe::storage::{DelimitedFileWriter, Quoting};
/// use chrono::NaiveDate;
///
/// let writer = DelimitedFileWriter::new("/data", "shipments")
///     .with_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
///     .with_quoting(Quoting::Rfc4180);
/// assert!(writer.target_path().ends_with("shipments-20240115.csv"));
/// ```
#[derive(Debug, Clone)]
pub struct DelimitedFileWriter {
    dir: PathBuf,
    table: String,
    date: Option<NaiveDate>,
    quoting: Quoting,
}

impl DelimitedFileWriter {
    pub fn new(dir: impl AsRef<Path>, table: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            table: table.into(),
            date: None,
            quoting: Quoting::default(),
        }
    }

    /// Pin the export date instead of using today's UTC date
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    pub fn file_name(&self) -> String {
        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        format!("{}-{}.csv", self.table, date.format("%Y%m%d"))
    }

    pub fn target_path(&self) -> PathBuf {
        self.dir.join(self.file_name())
    }
}

impl Loader for DelimitedFileWriter {
    type Item = Record;
    type Session = DelimitedFileSession;

    async fn begin(&self, schema: Arc<Schema>) -> Result<Self::Session> {
        let path = self.target_path();
        log::info!("table={} to file: {}", self.table, path.display());

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            PipelineError::write(format!("create {}: {}", self.dir.display(), e))
        })?;

        let staged = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name()))
            .suffix(".partial")
            .tempfile_in(&self.dir)
            .map_err(|e| PipelineError::write(format!("stage in {}: {}", self.dir.display(), e)))?;

        let mut writer = match self.quoting {
            Quoting::Never => RowWriter::Verbatim(BufWriter::new(staged)),
            Quoting::Rfc4180 => RowWriter::Quoted(
                csv::WriterBuilder::new()
                    .quote_style(csv::QuoteStyle::Necessary)
                    .terminator(csv::Terminator::Any(b'\n'))
                    .from_writer(staged),
            ),
        };

        writer
            .write_row(schema.columns().iter().map(String::as_str))
            .map_err(|e| PipelineError::write(format!("write header: {}", e)))?;

        Ok(DelimitedFileSession {
            path,
            schema,
            writer,
            rows: 0,
        })
    }
}

/// Line writer for one quoting mode
///
/// The csv writer quotes a lone empty field even with `QuoteStyle::Never`,
/// so verbatim lines are joined by hand.
enum RowWriter {
    Verbatim(BufWriter<NamedTempFile>),
    Quoted(csv::Writer<NamedTempFile>),
}

impl RowWriter {
    fn write_row<'a>(&mut self, fields: impl IntoIterator<Item = &'a str>) -> std::io::Result<()> {
        match self {
            Self::Verbatim(out) => {
                let line = fields.into_iter().collect::<Vec<_>>().join(",");
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")
            }
            Self::Quoted(out) => out.write_record(fields).map_err(std::io::Error::other),
        }
    }

    fn into_inner(self) -> std::io::Result<NamedTempFile> {
        match self {
            Self::Verbatim(out) => out.into_inner().map_err(|e| e.into_error()),
            Self::Quoted(out) => out.into_inner().map_err(|e| e.into_error()),
        }
    }
}

/// An export in progress; dropping it discards the staged file
pub struct DelimitedFileSession {
    path: PathBuf,
    schema: Arc<Schema>,
    writer: RowWriter,
    rows: u64,
}

impl LoadSession for DelimitedFileSession {
    type Item = Record;

    async fn load(&mut self, items: Vec<Self::Item>) -> Result<usize> {
        for record in &items {
            record.ensure_schema(&self.schema)?;
            let fields = record.values().iter().map(|v| v.to_string()).collect::<Vec<_>>();
            self.writer
                .write_row(fields.iter().map(String::as_str))
                .map_err(|e| PipelineError::write(format!("{}: {}", self.path.display(), e)))?;
            self.rows += 1;
        }
        Ok(items.len())
    }

    async fn commit(self) -> Result<ExportArtifact> {
        let path = self.path;
        let staged = self
            .writer
            .into_inner()
            .map_err(|e| PipelineError::write(format!("flush {}: {}", path.display(), e)))?;

        staged
            .as_file()
            .sync_all()
            .map_err(|e| PipelineError::write(format!("sync {}: {}", path.display(), e)))?;
        staged.persist(&path).map_err(|e| {
            PipelineError::write(format!("rename to {}: {}", path.display(), e.error))
        })?;

        let byte_size = std::fs::metadata(&path)
            .map_err(|e| PipelineError::write(format!("stat {}: {}", path.display(), e)))?
            .len();
        log::info!("file={}, size={}", path.display(), byte_size);

        Ok(ExportArtifact {
            location: path.display().to_string(),
            row_count: self.rows,
            byte_size,
        })
    }
}
