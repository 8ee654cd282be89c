//! Logging session lifecycle: `Idle → Armed → Running → Idle`.
//!
//! Arming chooses (and creates) the log file. Starting writes the header, which is
//! frozen for the rest of the session. Each recorded tick while running appends a
//! row and counts down; the session closes itself when the count reaches zero.
//! [`AcquisitionSession::stop`] is safe from every state.

use crate::data::storage::LogWriter;
use crate::error::{AppResult, PlateError};
use crate::plate::Reading;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Longest accepted sample period, in seconds.
pub const MAX_SAMPLE_PERIOD_SECS: f64 = 86_400.0;

/// Whether `period` is a usable sample period: positive, finite and at most
/// [`MAX_SAMPLE_PERIOD_SECS`].
pub fn is_valid_period(period: f64) -> bool {
    period.is_finite() && period > 0.0 && period <= MAX_SAMPLE_PERIOD_SECS
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No log file chosen
    #[default]
    Idle,
    /// Log file chosen, not logging
    Armed,
    /// Logging rows
    Running,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionState::Idle => "idle",
            SessionState::Armed => "armed",
            SessionState::Running => "running",
        };
        f.write_str(text)
    }
}

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    /// Lifecycle state
    pub state: SessionState,
    /// Samples still to log
    pub remaining_samples: u32,
    /// Samples left times the effective period
    pub remaining_seconds: f64,
    /// Rows written to the current log
    pub rows_written: u64,
    /// Chosen log file
    pub log_path: Option<PathBuf>,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            SessionState::Running => write!(
                f,
                "LOGGING - {} Samples and {:.2} Seconds Remaining",
                self.remaining_samples, self.remaining_seconds
            ),
            state => write!(f, "{}", state.to_string().to_uppercase()),
        }
    }
}

/// What recording one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Session not running; nothing written
    NotLogging,
    /// Row written, samples remain
    Logged,
    /// Row written and the countdown reached zero; the session is closed
    Completed,
}

/// State of one logging session.
#[derive(Default)]
pub struct AcquisitionSession {
    state: SessionState,
    log_path: Option<PathBuf>,
    writer: Option<LogWriter>,
    header: Vec<String>,
    remaining: u32,
    rows_written: u64,
}

impl AcquisitionSession {
    /// An idle session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether rows are being logged.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Header frozen at the last start.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Samples left in the running session.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Chosen log file.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Choose the log file, creating it empty.
    ///
    /// Rejected with [`PlateError::AlreadyLogging`] while running.
    pub fn arm(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        if self.is_running() {
            return Err(PlateError::AlreadyLogging);
        }
        let path = path.as_ref().to_path_buf();
        File::create(&path)?;
        info!(path = %path.display(), "Log file selected");
        self.log_path = Some(path);
        self.state = SessionState::Armed;
        Ok(())
    }

    /// Begin logging `sample_count` rows under `header`.
    pub fn start(&mut self, header: Vec<String>, sample_count: u32) -> AppResult<()> {
        match self.state {
            SessionState::Running => return Err(PlateError::AlreadyLogging),
            SessionState::Idle => return Err(PlateError::LogFileNotSelected),
            SessionState::Armed => {}
        }
        if sample_count == 0 {
            return Err(PlateError::InvalidSampleCount("0".to_string()));
        }
        let path = self.log_path.clone().ok_or(PlateError::LogFileNotSelected)?;

        self.writer = Some(LogWriter::create(&path, &header)?);
        self.header = header;
        self.remaining = sample_count;
        self.rows_written = 0;
        self.state = SessionState::Running;
        info!(
            path = %path.display(),
            columns = self.header.len(),
            samples = sample_count,
            "Logging started"
        );
        Ok(())
    }

    /// Log one tick's row if running, and count down.
    pub fn record(&mut self, timestamp: &str, values: &[Reading]) -> AppResult<RecordOutcome> {
        if !self.is_running() {
            return Ok(RecordOutcome::NotLogging);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.append_row(timestamp, values)?;
            self.rows_written = writer.rows_written();
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stop();
            info!(rows = self.rows_written, "Logging complete");
            return Ok(RecordOutcome::Completed);
        }
        Ok(RecordOutcome::Logged)
    }

    /// Close the log if open and return to idle. Safe to call in any state.
    pub fn stop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.finish() {
                warn!(error = %err, "Failed to close log file");
            }
        }
        if self.state != SessionState::Idle {
            info!(from = %self.state, "Logging stopped");
        }
        self.state = SessionState::Idle;
        self.log_path = None;
        self.remaining = 0;
    }

    /// Snapshot for display, with remaining time at `period` seconds per sample.
    pub fn status(&self, period: f64) -> SessionStatus {
        SessionStatus {
            state: self.state,
            remaining_samples: self.remaining,
            remaining_seconds: f64::from(self.remaining) * period,
            rows_written: self.rows_written,
            log_path: self.log_path.clone(),
        }
    }
}

/// Parse a user-supplied sample count: a positive integer.
pub fn parse_sample_count(text: &str) -> AppResult<u32> {
    text.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| PlateError::InvalidSampleCount(text.to_string()))
}

/// Parse a user-supplied sample period, floor-clamped to `minimum`.
///
/// Text that is not a positive number up to [`MAX_SAMPLE_PERIOD_SECS`] falls back
/// to `minimum`.
pub fn parse_sample_period(text: &str, minimum: f64) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(period) if is_valid_period(period) => period.max(minimum),
        _ => {
            warn!(input = %text, minimum, "Invalid sample period; using hardware minimum");
            minimum
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_requires_log_file() {
        let mut session = AcquisitionSession::new();
        assert!(matches!(
            session.start(vec![], 3),
            Err(PlateError::LogFileNotSelected)
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_lifecycle_and_countdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut session = AcquisitionSession::new();

        session.arm(&path).unwrap();
        assert_eq!(session.state(), SessionState::Armed);
        assert!(path.exists());

        session.start(vec!["DIGI-0-D Channel 1:".into()], 2).unwrap();
        assert!(matches!(
            session.start(vec![], 2),
            Err(PlateError::AlreadyLogging)
        ));
        assert!(matches!(session.arm(&path), Err(PlateError::AlreadyLogging)));

        let values = [Reading::Int(1)];
        assert_eq!(session.record("t1", &values).unwrap(), RecordOutcome::Logged);
        assert_eq!(session.status(0.5).remaining_seconds, 0.5);
        assert_eq!(session.record("t2", &values).unwrap(), RecordOutcome::Completed);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.record("t3", &values).unwrap(), RecordOutcome::NotLogging);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Date/Time,DIGI-0-D Channel 1:\nt1,1\nt2,1\n");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = AcquisitionSession::new();
        session.stop();
        session.arm(dir.path().join("a.csv")).unwrap();
        session.start(vec![], 10).unwrap();
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.log_path().is_none());
        assert!(matches!(
            session.start(vec![], 10),
            Err(PlateError::LogFileNotSelected)
        ));
    }

    #[test]
    fn test_status_text() {
        let status = SessionStatus {
            state: SessionState::Running,
            remaining_samples: 12,
            remaining_seconds: 1.92,
            rows_written: 3,
            log_path: None,
        };
        assert_eq!(
            status.to_string(),
            "LOGGING - 12 Samples and 1.92 Seconds Remaining"
        );
    }

    #[test]
    fn test_parse_sample_count() {
        assert_eq!(parse_sample_count(" 3 ").unwrap(), 3);
        for bad in ["0", "-1", "2.5", "many", ""] {
            assert!(matches!(
                parse_sample_count(bad),
                Err(PlateError::InvalidSampleCount(_))
            ));
        }
    }

    #[test]
    fn test_parse_sample_period() {
        assert_eq!(parse_sample_period("0.5", 0.16), 0.5);
        assert_eq!(parse_sample_period("0.01", 0.16), 0.16);
        assert_eq!(parse_sample_period("fast", 0.16), 0.16);
        assert_eq!(parse_sample_period("-3", 0.16), 0.16);
        assert_eq!(parse_sample_period("86400", 0.16), 86_400.0);
        assert_eq!(parse_sample_period("1e20", 0.16), 0.16);
        assert_eq!(parse_sample_period("inf", 0.16), 0.16);
    }
}
