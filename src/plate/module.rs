//! One discovered plate and its channels.

use super::channel::{Channel, ReadTarget, Reading};
use super::family::{PlateFamily, TemperatureScale};
use crate::adapters::Transport;
use std::fmt;

/// A plate present at one (family, address) slot.
///
/// Channels are stored flattened in canonical order: family block order first, then
/// hardware channel number ascending.
#[derive(Debug)]
pub struct Module {
    family: PlateFamily,
    address: u8,
    scale: TemperatureScale,
    channels: Vec<Channel>,
}

impl Module {
    /// Allocate every channel of the family, disabled and with default labels.
    pub fn new(family: PlateFamily, address: u8, history_capacity: usize) -> Self {
        let channels = family
            .descriptor()
            .blocks
            .iter()
            .flat_map(|block| {
                block
                    .hw_channels()
                    .map(move |hw| Channel::new(block, hw, history_capacity))
            })
            .collect();

        Self {
            family,
            address,
            scale: TemperatureScale::default(),
            channels,
        }
    }

    /// Plate family.
    pub fn family(&self) -> PlateFamily {
        self.family
    }

    /// Address on the bridge.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Scale sent with temperature reads.
    pub fn scale(&self) -> TemperatureScale {
        self.scale
    }

    /// Change the scale sent with temperature reads.
    pub fn set_scale(&mut self, scale: TemperatureScale) {
        self.scale = scale;
    }

    /// Channels in canonical order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Mutable channels in canonical order.
    pub fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    /// Channel by its position within the module.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    /// Number of enabled channels.
    pub fn enabled_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_enabled()).count()
    }

    fn target(&self) -> ReadTarget {
        ReadTarget {
            family: self.family,
            address: self.address,
            scale: self.scale,
        }
    }

    /// Sample every enabled channel in order, keeping only the values that arrived.
    pub async fn update(&mut self, transport: &mut dyn Transport) -> Vec<Reading> {
        let target = self.target();
        let mut readings = Vec::new();
        for channel in &mut self.channels {
            if let Some(reading) = channel.update(transport, target).await {
                readings.push(reading);
            }
        }
        readings
    }

    /// Log header entries for enabled channels, as `<FAMILY>-<address>-<label>`.
    pub fn descriptors(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter_map(Channel::descriptor)
            .map(|label| format!("{}-{}-{}", self.family, self.address, label))
            .collect()
    }

    /// Labels in canonical order.
    pub fn labels(&self) -> Vec<&str> {
        self.channels.iter().map(Channel::label).collect()
    }

    /// State tokens in canonical order.
    pub fn states(&self) -> Vec<&'static str> {
        self.channels.iter().map(Channel::state).collect()
    }

    /// Assign labels and states pairwise in canonical order.
    ///
    /// Callers validate lengths first; surplus entries on either side are ignored.
    pub fn apply<S: AsRef<str>>(&mut self, labels: &[S], states: &[S]) {
        for ((channel, label), state) in self.channels.iter_mut().zip(labels).zip(states) {
            channel.set_label(label.as_ref());
            channel.set_state(state.as_ref());
        }
    }

    /// Enable every channel.
    pub fn select_all(&mut self) {
        self.channels.iter_mut().for_each(|c| c.set_enabled(true));
    }

    /// Disable every channel.
    pub fn clear_all(&mut self) {
        self.channels.iter_mut().for_each(|c| c.set_enabled(false));
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::ScriptedTransport;
    use crate::plate::ChannelKind;

    #[test]
    fn test_adc_layout() {
        let module = Module::new(PlateFamily::Adc, 1, 8);
        let kinds: Vec<ChannelKind> = module.channels().iter().map(Channel::kind).collect();
        assert_eq!(kinds.len(), 20);
        assert!(kinds[..12].iter().all(|k| *k == ChannelKind::Analog));
        assert!(kinds[12..16].iter().all(|k| *k == ChannelKind::Digital));
        assert!(kinds[16..].iter().all(|k| *k == ChannelKind::Current));
        assert_eq!(module.labels()[8], "DE Channel 0:");
        assert_eq!(module.labels()[19], "4-20mA 4:");
        assert_eq!(module.to_string(), "ADC-1");
    }

    #[test]
    fn test_descriptors_follow_selection() {
        let mut module = Module::new(PlateFamily::Daqc2, 0, 8);
        assert!(module.descriptors().is_empty());

        module.select_all();
        assert_eq!(module.enabled_count(), 16);
        assert_eq!(module.descriptors()[0], "DAQC2-0-A Channel 0:");
        assert_eq!(module.descriptors()[15], "DAQC2-0-D Channel 7:");

        module.clear_all();
        module.channel_mut(9).unwrap().set_enabled(true);
        assert_eq!(module.descriptors(), vec!["DAQC2-0-D Channel 1:"]);
    }

    #[test]
    fn test_apply_labels_and_states() {
        let mut module = Module::new(PlateFamily::Current, 2, 8);
        let labels: Vec<String> = (1..=8).map(|n| format!("loop {n}")).collect();
        let states: Vec<String> = ["1", "0", "1", "0", "0", "0", "0", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        module.apply(labels.as_slice(), states.as_slice());
        assert_eq!(module.labels()[0], "loop 1");
        assert_eq!(module.states(), vec!["1", "0", "1", "0", "0", "0", "0", "1"]);
    }

    #[tokio::test]
    async fn test_update_skips_missing_values() {
        let mut module = Module::new(PlateFamily::Thermo, 3, 8);
        module.set_scale(TemperatureScale::Fahrenheit);
        for index in [0, 4, 11] {
            module.channel_mut(index).unwrap().set_enabled(true);
        }

        let mut transport = ScriptedTransport::new(["70.5", "bad", "71.25"]);
        let readings = module.update(&mut transport).await;

        assert_eq!(readings, vec![Reading::Float(70.5), Reading::Float(71.25)]);
        assert_eq!(
            transport.sent(),
            vec![
                "THERMO.getTEMP(3,1,\"f\")",
                "THERMO.getTEMP(3,5,\"f\")",
                "THERMO.getTEMP(3,12,\"f\")",
            ]
        );
    }
}
