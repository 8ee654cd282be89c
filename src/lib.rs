//! Core library for the plate_logger application.
//!
//! Polls addressable measurement plates behind a single USB serial bridge, keeps
//! per-channel acquisition state and logs timestamped rows of the selected channels
//! to CSV. Channel labels and selections persist in single-line setup files.
//!
//! Layout, leaf-first:
//! - [`adapters`]: command/response transports (serial, simulated) and port discovery
//! - [`plate`]: family descriptor table, modules and channels
//! - [`registry`]: discovered (family, address) slots in canonical order
//! - [`data`]: sample history, CSV log writer, setup file codec
//! - [`acquisition`]: logging session, [`PlateLogger`] engine and scheduler task
//! - [`config`], [`error`], [`tracing_init`]: ambient plumbing

pub mod acquisition;
pub mod adapters;
pub mod config;
pub mod data;
pub mod error;
pub mod plate;
pub mod registry;
pub mod tracing_init;

pub use acquisition::PlateLogger;
pub use error::{AppResult, PlateError};
