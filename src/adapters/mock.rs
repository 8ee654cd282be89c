//! In-process transports for tests and hardware-free runs.
//!
//! [`SimulatedBridge`] answers the full bridge command set for a configurable set of
//! present plates and produces slowly varying readings. Individual commands can be
//! made to time out or return garbage. [`ScriptedTransport`] replays canned
//! responses in order and times out once the script is exhausted.

use crate::adapters::Transport;
use crate::error::{AppResult, PlateError};
use crate::plate::{ChannelKind, PlateFamily, TemperatureScale, MAX_ADDRESSES};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

static COMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z0-9]+)\.([A-Za-z]+)\(([^)]*)\)$").expect("Invalid command regex")
});

/// Injected misbehaviour for one exact command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Respond with nothing before the timeout
    Timeout,
    /// Respond with text that is not a number
    Garbage,
}

/// Simulated plate bridge.
#[derive(Debug, Default)]
pub struct SimulatedBridge {
    present: BTreeSet<(PlateFamily, u8)>,
    faults: HashMap<String, Fault>,
    sent: Vec<String>,
    latency: Option<Duration>,
    reads: u64,
}

impl SimulatedBridge {
    /// A bridge with no plates attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a plate.
    pub fn with_module(mut self, family: PlateFamily, address: u8) -> Self {
        self.present.insert((family, address));
        self
    }

    /// Make one exact command misbehave.
    pub fn with_fault(mut self, command: impl Into<String>, fault: Fault) -> Self {
        self.faults.insert(command.into(), fault);
        self
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Build a bridge from `FAMILY:ADDR,...`, e.g. `DAQC2:0,THERMO:3`.
    pub fn from_spec(spec: &str) -> AppResult<Self> {
        let mut bridge = Self::new();
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (family, address) = item.split_once(':').ok_or_else(|| {
                PlateError::Configuration(format!("Expected FAMILY:ADDR, got '{item}'"))
            })?;
            let family = PlateFamily::from_str(family).map_err(PlateError::Configuration)?;
            let address: u8 = address
                .trim()
                .parse()
                .ok()
                .filter(|a| *a < MAX_ADDRESSES)
                .ok_or_else(|| {
                    PlateError::Configuration(format!("Invalid plate address in '{item}'"))
                })?;
            bridge = bridge.with_module(family, address);
        }
        Ok(bridge)
    }

    /// Every command received so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Forget recorded commands.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    fn timeout(command: &str) -> PlateError {
        PlateError::TransportTimeout {
            command: command.to_string(),
            partial: String::new(),
        }
    }

    fn respond(&mut self, command: &str) -> AppResult<String> {
        match self.faults.get(command) {
            Some(Fault::Timeout) => return Err(Self::timeout(command)),
            Some(Fault::Garbage) => return Ok("#?!".to_string()),
            None => {}
        }

        let caps = COMMAND_PATTERN
            .captures(command)
            .ok_or_else(|| Self::timeout(command))?;
        let family = PlateFamily::from_str(&caps[1]).map_err(|_| Self::timeout(command))?;
        let verb = &caps[2];
        let args: Vec<&str> = caps[3].split(',').map(str::trim).collect();
        let address: u8 = args
            .first()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| Self::timeout(command))?;

        if verb == "getADDR" {
            return Ok(if self.present.contains(&(family, address)) {
                address.to_string()
            } else {
                "X".to_string()
            });
        }

        // An absent plate never answers.
        if !self.present.contains(&(family, address)) {
            return Err(Self::timeout(command));
        }

        match verb {
            "initADC" | "setMODE" => Ok(String::new()),
            _ => {
                let channel: u8 = args
                    .get(1)
                    .and_then(|c| c.parse().ok())
                    .ok_or_else(|| Self::timeout(command))?;
                let kind = read_kind(family, verb, channel).ok_or_else(|| Self::timeout(command))?;
                let scale = args
                    .get(2)
                    .map(|s| s.trim_matches('"'))
                    .and_then(|s| s.parse::<TemperatureScale>().ok())
                    .unwrap_or_default();
                self.reads += 1;
                Ok(self.value(kind, address, channel, scale))
            }
        }
    }

    fn value(&self, kind: ChannelKind, address: u8, channel: u8, scale: TemperatureScale) -> String {
        let wobble = (self.reads % 10) as f64 * 0.001;
        let base = f64::from(channel) + f64::from(address) * 0.1;
        match kind {
            ChannelKind::Digital => ((self.reads + u64::from(channel)) % 2).to_string(),
            ChannelKind::Analog => format!("{:.3}", base * 0.5 + wobble),
            ChannelKind::Current => format!("{:.3}", 4.0 + base + wobble),
            ChannelKind::Temperature => {
                let celsius = 20.0 + base * 0.5 + wobble;
                let value = match scale {
                    TemperatureScale::Celsius => celsius,
                    TemperatureScale::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
                    TemperatureScale::Kelvin => celsius + 273.15,
                };
                format!("{value:.3}")
            }
        }
    }
}

/// Kind of the channel a read command addresses, if the family has one there.
fn read_kind(family: PlateFamily, verb: &str, channel: u8) -> Option<ChannelKind> {
    family
        .descriptor()
        .blocks
        .iter()
        .find(|b| b.read_verb == verb && b.hw_channels().any(|c| c == channel))
        .map(|b| b.kind)
}

#[async_trait]
impl Transport for SimulatedBridge {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn send(&mut self, command: &str) -> AppResult<String> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.sent.push(command.to_string());
        let response = self.respond(command);
        debug!(%command, ?response, "Simulated bridge");
        response
    }
}

/// Replays canned responses in order.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: VecDeque<String>,
    sent: Vec<String>,
}

impl ScriptedTransport {
    /// Queue responses to hand out, one per command.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            sent: Vec::new(),
        }
    }

    /// Every command received so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&mut self, command: &str) -> AppResult<String> {
        self.sent.push(command.to_string());
        self.responses
            .pop_front()
            .ok_or_else(|| PlateError::TransportTimeout {
                command: command.to_string(),
                partial: String::new(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_and_reads() {
        let mut bridge = SimulatedBridge::new()
            .with_module(PlateFamily::Daqc2, 0)
            .with_module(PlateFamily::Thermo, 2);

        assert_eq!(bridge.send("DAQC2.getADDR(0)").await.unwrap(), "0");
        assert_eq!(bridge.send("DAQC2.getADDR(1)").await.unwrap(), "X");

        let analog: f64 = bridge.send("DAQC2.getADC(0,3)").await.unwrap().parse().unwrap();
        assert!((1.5..1.6).contains(&analog));

        let digital = bridge.send("DAQC2.getDINbit(0,7)").await.unwrap();
        assert!(digital == "0" || digital == "1");

        let kelvin: f64 = bridge
            .send("THERMO.getTEMP(2,1,\"k\")")
            .await
            .unwrap()
            .parse()
            .unwrap();
        assert!(kelvin > 290.0);
        assert_eq!(bridge.sent().len(), 5);
    }

    #[tokio::test]
    async fn test_absent_and_invalid_commands_time_out() {
        let mut bridge = SimulatedBridge::new().with_module(PlateFamily::Digi, 1);

        for command in ["DIGI.getDINbit(0,1)", "DIGI.getDINbit(1,0)", "DIGI.getADC(1,1)", "bogus"] {
            let err = bridge.send(command).await.unwrap_err();
            assert!(matches!(err, PlateError::TransportTimeout { .. }), "{command}");
        }
    }

    #[tokio::test]
    async fn test_faults() {
        let mut bridge = SimulatedBridge::new()
            .with_module(PlateFamily::Current, 0)
            .with_fault("CURRENT.getI(0,1)", Fault::Timeout)
            .with_fault("CURRENT.getI(0,2)", Fault::Garbage);

        assert!(bridge.send("CURRENT.getI(0,1)").await.unwrap_err().is_no_data());
        assert_eq!(bridge.send("CURRENT.getI(0,2)").await.unwrap(), "#?!");
        assert!(bridge.send("CURRENT.getI(0,3)").await.is_ok());
    }

    #[test]
    fn test_from_spec() {
        let bridge = SimulatedBridge::from_spec("daqc2:0, THERMO:7").unwrap();
        assert!(bridge.present.contains(&(PlateFamily::Daqc2, 0)));
        assert!(bridge.present.contains(&(PlateFamily::Thermo, 7)));

        assert!(SimulatedBridge::from_spec("DAQC2").is_err());
        assert!(SimulatedBridge::from_spec("DAQC2:8").is_err());
        assert!(SimulatedBridge::from_spec("PLATE:0").is_err());
    }

    #[tokio::test]
    async fn test_scripted_transport() {
        let mut transport = ScriptedTransport::new(["a"]);
        assert_eq!(transport.send("one").await.unwrap(), "a");
        assert!(transport.send("two").await.is_err());
        assert_eq!(transport.sent(), ["one", "two"]);
    }
}
