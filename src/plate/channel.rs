//! Per-channel acquisition state.
//!
//! A [`Channel`] owns its selection flag, user label, latest reading and sample
//! history. Readings only change as a side effect of a successful read while the
//! channel is enabled.

use super::family::{BlockLayout, ChannelKind, PlateFamily, TemperatureScale};
use crate::adapters::Transport;
use crate::data::ring_buffer::SampleHistory;
use std::fmt;
use tracing::{debug, warn};

/// Token written to setup files for an enabled channel.
pub const STATE_ENABLED: &str = "1";
/// Token written to setup files for a disabled channel.
pub const STATE_DISABLED: &str = "0";

/// One parsed channel value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Analog, temperature or current value
    Float(f64),
    /// Digital input level
    Int(i64),
}

impl Reading {
    /// Parse a bridge response for a channel of the given kind.
    ///
    /// Returns `None` for anything that is not a clean number, including NaN and
    /// infinities.
    pub fn parse(kind: ChannelKind, response: &str) -> Option<Self> {
        let text = response.trim();
        if kind.is_integer() {
            text.parse::<i64>().ok().map(Reading::Int)
        } else {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Reading::Float)
        }
    }

    /// Value as a float, for plotting.
    pub fn as_f64(self) -> f64 {
        match self {
            Reading::Float(v) => v,
            Reading::Int(v) => v as f64,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Int(v) => write!(f, "{v}"),
            Reading::Float(v) => {
                let text = v.to_string();
                if text.contains('.') {
                    f.write_str(&text)
                } else {
                    write!(f, "{text}.0")
                }
            }
        }
    }
}

/// Where a channel read is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTarget {
    /// Family of the owning module
    pub family: PlateFamily,
    /// Address of the owning module
    pub address: u8,
    /// Scale passed with temperature reads
    pub scale: TemperatureScale,
}

/// One measurable input on a plate.
#[derive(Debug)]
pub struct Channel {
    kind: ChannelKind,
    hw_channel: u8,
    read_verb: &'static str,
    enabled: bool,
    label: String,
    last_value: Option<Reading>,
    history: SampleHistory,
}

impl Channel {
    /// Create a disabled channel with its default label.
    pub fn new(block: &BlockLayout, hw_channel: u8, history_capacity: usize) -> Self {
        Self {
            kind: block.kind,
            hw_channel,
            read_verb: block.read_verb,
            enabled: false,
            label: block.default_label(hw_channel),
            last_value: None,
            history: SampleHistory::new(history_capacity),
        }
    }

    /// Command that reads this channel.
    pub fn read_command(&self, target: ReadTarget) -> String {
        let prefix = target.family.prefix();
        match self.kind {
            ChannelKind::Temperature => format!(
                "{prefix}.{}({},{},\"{}\")",
                self.read_verb, target.address, self.hw_channel, target.scale
            ),
            _ => format!(
                "{prefix}.{}({},{})",
                self.read_verb, target.address, self.hw_channel
            ),
        }
    }

    /// Sample the channel.
    ///
    /// A disabled channel returns `None` without touching the transport. A timed-out
    /// or malformed response also returns `None` and leaves the stored value and
    /// history unchanged.
    pub async fn update(
        &mut self,
        transport: &mut dyn Transport,
        target: ReadTarget,
    ) -> Option<Reading> {
        if !self.enabled {
            return None;
        }

        let command = self.read_command(target);
        let response = match transport.send(&command).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%command, error = %err, "No data from channel");
                return None;
            }
        };

        let Some(reading) = Reading::parse(self.kind, &response) else {
            warn!(%command, %response, "Malformed channel response");
            return None;
        };

        debug!(%command, %reading, "Channel sampled");
        self.last_value = Some(reading);
        self.history.push(reading.as_f64());
        Some(reading)
    }

    /// Label for the log header, only while enabled.
    pub fn descriptor(&self) -> Option<&str> {
        self.enabled.then_some(self.label.as_str())
    }

    /// Current label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the label. Any text is accepted.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Selection as a setup-file token.
    pub fn state(&self) -> &'static str {
        if self.enabled {
            STATE_ENABLED
        } else {
            STATE_DISABLED
        }
    }

    /// Apply a setup-file token; only the literal `"1"` enables.
    pub fn set_state(&mut self, token: &str) {
        self.enabled = token == STATE_ENABLED;
    }

    /// Whether the channel takes part in logging.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Select or deselect the channel.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Measurement kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Hardware channel number used in commands.
    pub fn hw_channel(&self) -> u8 {
        self.hw_channel
    }

    /// Latest successful reading.
    pub fn last_value(&self) -> Option<Reading> {
        self.last_value
    }

    /// Recent samples, oldest-first.
    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    /// Value as shown on a dashboard: `"off"` until the first sample.
    pub fn display_text(&self) -> String {
        match (self.kind, self.last_value) {
            (_, None) => "off".to_string(),
            (_, Some(Reading::Int(v))) => v.to_string(),
            (ChannelKind::Analog, Some(Reading::Float(v))) => format!("{v:5.3}"),
            (_, Some(Reading::Float(v))) => format!("{v:4.3}"),
        }
    }
}
