//! The logger: transport, registry and session owned together.

use super::session::{
    is_valid_period, parse_sample_count, parse_sample_period, AcquisitionSession,
    RecordOutcome, SessionStatus,
};
use crate::adapters::Transport;
use crate::config::AcquisitionConfig;
use crate::data::setup_file;
use crate::data::storage::{format_row, format_timestamp};
use crate::error::{AppResult, PlateError};
use crate::plate::{Reading, TemperatureScale};
use crate::registry::Registry;
use chrono::Local;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one acquisition tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Tick time as written to the log
    pub timestamp: String,
    /// Values that arrived, canonical order
    pub values: Vec<Reading>,
    /// Timestamp and values joined with commas
    pub row: String,
    /// What the session did with the row
    pub outcome: RecordOutcome,
    /// Session state after the tick
    pub status: SessionStatus,
}

/// Plate data logger bound to one transport.
///
/// Owns the only handle to the transport, so commands are issued strictly one at a
/// time by whoever holds `&mut self`.
pub struct PlateLogger<T: Transport> {
    transport: T,
    registry: Registry,
    session: AcquisitionSession,
    sample_count: u32,
    sample_period: Option<f64>,
}

impl<T: Transport> PlateLogger<T> {
    /// Discover attached plates and apply acquisition defaults.
    pub async fn discover(mut transport: T, config: &AcquisitionConfig) -> AppResult<Self> {
        let mut registry = Registry::discover(&mut transport, config.plot_width).await;
        registry.set_temperature_scale(config.temperature_scale);
        Self::with_registry(transport, registry, config)
    }

    /// Wrap an already built registry.
    pub fn with_registry(
        transport: T,
        registry: Registry,
        config: &AcquisitionConfig,
    ) -> AppResult<Self> {
        let mut logger = Self {
            transport,
            registry,
            session: AcquisitionSession::new(),
            sample_count: 1,
            sample_period: None,
        };
        logger.set_sample_count(config.sample_count)?;
        if let Some(period) = config.sample_period {
            logger.set_sample_period(period);
        }
        Ok(logger)
    }

    /// Attached plates and channel state.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access for selection and label edits.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Logging session.
    pub fn session(&self) -> &AcquisitionSession {
        &self.session
    }

    /// Samples logged per session.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Set the samples logged per session; zero is rejected.
    pub fn set_sample_count(&mut self, count: u32) -> AppResult<()> {
        if count == 0 {
            return Err(PlateError::InvalidSampleCount(count.to_string()));
        }
        self.sample_count = count;
        Ok(())
    }

    /// Set the sample count from user text.
    pub fn set_sample_count_text(&mut self, text: &str) -> AppResult<()> {
        self.sample_count = parse_sample_count(text)?;
        Ok(())
    }

    /// Requested period: the user's value, or the hardware minimum rounded to
    /// milliseconds.
    pub fn sample_period(&self) -> f64 {
        self.sample_period
            .unwrap_or_else(|| (self.registry.min_sample_period() * 1000.0).round() / 1000.0)
    }

    /// Request a sample period in seconds. Values outside `(0, MAX_SAMPLE_PERIOD_SECS]`
    /// reset to the default.
    pub fn set_sample_period(&mut self, period: f64) {
        self.sample_period = is_valid_period(period).then_some(period);
    }

    /// Set the sample period from user text, falling back to the hardware minimum.
    pub fn set_sample_period_text(&mut self, text: &str) {
        let minimum = self.registry.min_sample_period();
        self.sample_period = Some(parse_sample_period(text, minimum));
    }

    /// Period ticks actually run at: the requested period floor-clamped to the
    /// hardware minimum.
    pub fn effective_period(&self) -> f64 {
        self.sample_period().max(self.registry.min_sample_period())
    }

    /// Length of a full logging session at the effective period, saturating at
    /// [`Duration::MAX`].
    pub fn estimated_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.effective_period() * f64::from(self.sample_count))
            .unwrap_or(Duration::MAX)
    }

    /// Use `scale` for every temperature plate.
    pub fn set_temperature_scale(&mut self, scale: TemperatureScale) {
        self.registry.set_temperature_scale(scale);
    }

    /// Choose the log file. Rejected while logging.
    pub fn select_log_file(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        self.session.arm(path)
    }

    /// Freeze the header from the enabled channels and start logging.
    pub fn start_logging(&mut self) -> AppResult<()> {
        let header = self.registry.header_entries();
        if header.is_empty() {
            warn!("Logging started with no channels enabled");
        }
        self.session.start(header, self.sample_count)
    }

    /// Stop logging and close the log. Safe in any state.
    pub fn stop_logging(&mut self) {
        self.session.stop();
    }

    /// Current session snapshot.
    pub fn status(&self) -> SessionStatus {
        self.session.status(self.effective_period())
    }

    /// Run one tick: sample every enabled channel, build the row and log it if running.
    pub async fn tick(&mut self) -> AppResult<TickReport> {
        let timestamp = format_timestamp(&Local::now());
        let values = self.registry.sample(&mut self.transport).await;
        let row = format_row(&timestamp, &values);
        debug!(%row, "Tick");

        let outcome = match self.session.record(&timestamp, &values) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.session.stop();
                return Err(err);
            }
        };

        Ok(TickReport {
            timestamp,
            values,
            row,
            outcome,
            status: self.status(),
        })
    }

    /// Write the current labels, states, count and period to a setup file.
    pub fn save_setup(&self, path: impl AsRef<Path>) -> AppResult<()> {
        setup_file::save(path, &self.registry, self.sample_count, self.sample_period())
    }

    /// Apply a setup file. Nothing changes if it does not match the attached plates.
    pub fn load_setup(&mut self, path: impl AsRef<Path>) -> AppResult<()> {
        let document = setup_file::load(path, &mut self.registry)?;
        self.sample_count = document.sample_count;
        self.sample_period = Some(document.sample_period);
        info!(
            sample_count = self.sample_count,
            sample_period = document.sample_period,
            enabled = self.registry.enabled_count(),
            "Acquisition settings restored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedBridge;
    use crate::plate::PlateFamily;

    async fn logger(modules: &[(PlateFamily, u8)]) -> PlateLogger<SimulatedBridge> {
        let bridge = modules
            .iter()
            .fold(SimulatedBridge::new(), |b, (f, a)| b.with_module(*f, *a));
        PlateLogger::discover(bridge, &AcquisitionConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_period_and_duration() {
        let logger = logger(&[(PlateFamily::Daqc, 0), (PlateFamily::Thermo, 1)]).await;
        assert!((logger.registry().min_sample_period() - 0.36).abs() < 1e-9);
        assert_eq!(logger.sample_period(), 0.36);
        assert_eq!(logger.sample_count(), 1000);
        assert!((logger.estimated_duration().as_secs_f64() - 360.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_period_clamped_to_minimum() {
        let mut logger = logger(&[(PlateFamily::Daqc2, 0)]).await;
        logger.set_sample_period(0.05);
        assert_eq!(logger.sample_period(), 0.05);
        assert!((logger.effective_period() - 0.16).abs() < 1e-9);

        logger.set_sample_period_text("2");
        assert_eq!(logger.effective_period(), 2.0);
        logger.set_sample_period_text("soon");
        assert!((logger.effective_period() - 0.16).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_oversized_period_falls_back() {
        let mut logger = logger(&[(PlateFamily::Daqc2, 0)]).await;
        logger.set_sample_count(u32::MAX).unwrap();

        logger.set_sample_period_text("1e20");
        assert!((logger.effective_period() - 0.16).abs() < 1e-9);
        assert!(logger.estimated_duration() > Duration::from_secs(600_000_000));

        logger.set_sample_period(1e20);
        assert!((logger.sample_period() - 0.16).abs() < 1e-9);

        logger.set_sample_period(86_400.0);
        assert!(logger.estimated_duration() < Duration::MAX);
    }

    #[tokio::test]
    async fn test_sample_count_validation() {
        let mut logger = logger(&[]).await;
        assert!(logger.set_sample_count(0).is_err());
        assert!(matches!(
            logger.set_sample_count_text("ten"),
            Err(PlateError::InvalidSampleCount(_))
        ));
        assert_eq!(logger.sample_count(), 1000);
        logger.set_sample_count_text("10").unwrap();
        assert_eq!(logger.sample_count(), 10);
    }

    #[tokio::test]
    async fn test_tick_without_session_samples_only() {
        let mut logger = logger(&[(PlateFamily::Digi, 2)]).await;
        logger.registry_mut().select_all();

        let report = logger.tick().await.unwrap();
        assert_eq!(report.values.len(), 8);
        assert_eq!(report.outcome, RecordOutcome::NotLogging);
        assert_eq!(report.row.split(',').count(), 9);
    }

    #[tokio::test]
    async fn test_start_without_file() {
        let mut logger = logger(&[(PlateFamily::Digi, 2)]).await;
        assert!(matches!(
            logger.start_logging(),
            Err(PlateError::LogFileNotSelected)
        ));
    }
}
