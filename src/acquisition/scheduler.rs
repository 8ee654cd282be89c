//! Periodic acquisition task.
//!
//! One tokio task sleeps until the next tick deadline, runs the tick body and loops.
//! Deadlines are measured start-to-start and the period is re-read every iteration.
//! A tick that overruns its period is followed immediately by the next one, with no
//! idle gap; ticks never overlap. The stop signal is checked between ticks only, so
//! an in-flight read always completes.

use super::engine::PlateLogger;
use super::session::{RecordOutcome, SessionStatus, MAX_SAMPLE_PERIOD_SECS};
use crate::adapters::Transport;
use crate::error::{AppResult, PlateError};
use crate::plate::Reading;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum LoggerEvent {
    /// One tick's row
    Sample {
        /// Timestamp and values, comma-joined
        row: String,
        /// Values in canonical order
        values: Vec<Reading>,
    },
    /// Session state after a tick
    Status(SessionStatus),
    /// The countdown reached zero and the log was closed
    Completed {
        /// Data rows in the finished log
        rows: u64,
    },
    /// The scheduler was stopped before completion
    Stopped,
    /// A tick failed and logging was stopped
    Failed(String),
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    events: broadcast::Sender<LoggerEvent>,
    task: JoinHandle<AppResult<()>>,
}

impl SchedulerHandle {
    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggerEvent> {
        self.events.subscribe()
    }

    /// Ask the task to stop after the current tick.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit.
    pub async fn join(self) -> AppResult<()> {
        self.task
            .await
            .map_err(|e| PlateError::Transport(format!("Scheduler task failed: {e}")))?
    }
}

/// Start ticking `logger` until its session completes or [`SchedulerHandle::stop`]
/// is called. Dropping the handle also stops the task. The logging session is
/// closed on exit either way.
pub fn spawn<T: Transport + 'static>(logger: Arc<Mutex<PlateLogger<T>>>) -> SchedulerHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let task = tokio::spawn(run(logger, stop_rx, events.clone()));
    SchedulerHandle {
        stop_tx,
        events,
        task,
    }
}

async fn run<T: Transport>(
    logger: Arc<Mutex<PlateLogger<T>>>,
    mut stop_rx: watch::Receiver<bool>,
    events: broadcast::Sender<LoggerEvent>,
) -> AppResult<()> {
    info!("Acquisition scheduler started");
    let mut last_start = Instant::now();

    loop {
        let period = logger.lock().await.effective_period();
        let deadline = next_deadline(last_start, period, Instant::now());

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = stop_rx.changed() => {
                logger.lock().await.stop_logging();
                let _ = events.send(LoggerEvent::Stopped);
                info!("Acquisition scheduler stopped");
                return Ok(());
            }
        }

        last_start = deadline;
        let result = logger.lock().await.tick().await;
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "Acquisition tick failed; logging stopped");
                let _ = events.send(LoggerEvent::Failed(err.to_string()));
                return Err(err);
            }
        };

        // Send errors only mean nobody is listening.
        let _ = events.send(LoggerEvent::Sample {
            row: report.row,
            values: report.values,
        });
        let rows = report.status.rows_written;
        let _ = events.send(LoggerEvent::Status(report.status));

        if report.outcome == RecordOutcome::Completed {
            let _ = events.send(LoggerEvent::Completed { rows });
            info!(rows, "Acquisition scheduler finished");
            return Ok(());
        }
    }
}

/// Start of the next tick: one period after the previous start, or `now` if that has
/// already passed. Unrepresentable periods wait the longest allowed period.
fn next_deadline(last_start: Instant, period: f64, now: Instant) -> Instant {
    let period = Duration::try_from_secs_f64(period)
        .unwrap_or_else(|_| Duration::from_secs_f64(MAX_SAMPLE_PERIOD_SECS));
    last_start
        .checked_add(period)
        .map_or(now, |next| next.max(now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_deadline_on_schedule() {
        let start = Instant::now();
        let now = start + Duration::from_millis(40);
        assert_eq!(
            next_deadline(start, 0.16, now),
            start + Duration::from_millis(160)
        );
    }

    #[test]
    fn test_next_deadline_after_overrun() {
        let start = Instant::now();
        let now = start + Duration::from_millis(800);
        assert_eq!(next_deadline(start, 0.16, now), now);
    }

    #[test]
    fn test_next_deadline_unrepresentable_period() {
        let start = Instant::now();
        assert_eq!(
            next_deadline(start, f64::MAX, start),
            start + Duration::from_secs_f64(MAX_SAMPLE_PERIOD_SECS)
        );
    }
}
