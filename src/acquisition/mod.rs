//! Sampling, logging sessions and the periodic scheduler.
//!
//! - [`session`]: `Idle → Armed → Running` lifecycle and countdown
//! - [`engine`]: [`PlateLogger`], which owns the transport, registry and session
//! - [`scheduler`]: the tokio task that ticks a shared logger

pub mod engine;
pub mod scheduler;
pub mod session;

pub use engine::{PlateLogger, TickReport};
pub use scheduler::{spawn, LoggerEvent, SchedulerHandle};
pub use session::{
    is_valid_period, parse_sample_count, parse_sample_period, AcquisitionSession,
    RecordOutcome, SessionState, SessionStatus, MAX_SAMPLE_PERIOD_SECS,
};
