//! CSV log writer.
//!
//! The header is written once when the file is created and never rewritten. Rows are
//! written with a flexible record length, so a row carries exactly the values that
//! arrived on its tick even when that differs from the header width.

use crate::error::{AppResult, PlateError};
use crate::plate::Reading;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// First header column.
pub const TIMESTAMP_HEADER: &str = "Date/Time";

/// Local-time timestamp format of the first column of every row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Format a tick time for the log.
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// One row as comma-joined text: timestamp, then the values in order.
pub fn format_row(timestamp: &str, values: &[Reading]) -> String {
    std::iter::once(timestamp.to_string())
        .chain(values.iter().map(Reading::to_string))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use std::fs::File;
    use tracing::{debug, info};

    /// Append-only CSV log of one acquisition session.
    pub struct LogWriter {
        path: PathBuf,
        writer: csv::Writer<File>,
        rows: u64,
    }

    impl LogWriter {
        /// Create (or truncate) the log and write its header row.
        pub fn create(path: impl AsRef<Path>, header: &[String]) -> AppResult<Self> {
            let path = path.as_ref().to_path_buf();
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_path(&path)
                .map_err(|e| csv_error(&path, e))?;

            writer
                .write_record(std::iter::once(TIMESTAMP_HEADER).chain(header.iter().map(String::as_str)))
                .map_err(|e| csv_error(&path, e))?;
            writer.flush()?;

            info!(path = %path.display(), columns = header.len(), "Log file opened");
            Ok(Self {
                path,
                writer,
                rows: 0,
            })
        }

        /// Append one row and flush it to disk.
        pub fn append_row(&mut self, timestamp: &str, values: &[Reading]) -> AppResult<()> {
            let record = std::iter::once(timestamp.to_string())
                .chain(values.iter().map(Reading::to_string));
            self.writer
                .write_record(record)
                .map_err(|e| csv_error(&self.path, e))?;
            self.writer.flush()?;
            self.rows += 1;
            debug!(row = self.rows, fields = values.len(), "Row logged");
            Ok(())
        }

        /// Data rows written so far.
        pub fn rows_written(&self) -> u64 {
            self.rows
        }

        /// Location of the log.
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Flush and close the file.
        pub fn finish(mut self) -> AppResult<()> {
            self.writer.flush()?;
            info!(path = %self.path.display(), rows = self.rows, "Log file closed");
            Ok(())
        }
    }

    fn csv_error(path: &Path, err: csv::Error) -> PlateError {
        PlateError::Io(std::io::Error::other(format!(
            "CSV error on {}: {err}",
            path.display()
        )))
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;

    /// Placeholder used when CSV support is compiled out.
    pub struct LogWriter {
        path: PathBuf,
    }

    impl LogWriter {
        /// Always fails: CSV support is not compiled in.
        pub fn create(path: impl AsRef<Path>, _header: &[String]) -> AppResult<Self> {
            let _ = path.as_ref();
            Err(PlateError::Configuration(
                "CSV logging not enabled. Rebuild with --features storage_csv".to_string(),
            ))
        }

        /// Never reached.
        pub fn append_row(&mut self, _timestamp: &str, _values: &[Reading]) -> AppResult<()> {
            Ok(())
        }

        /// Never reached.
        pub fn rows_written(&self) -> u64 {
            0
        }

        /// Location of the log.
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Never reached.
        pub fn finish(self) -> AppResult<()> {
            Ok(())
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::LogWriter;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::LogWriter;
