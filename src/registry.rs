//! Which plates are attached, and their channels.
//!
//! The registry holds one [`Slot`] per (family, address) pair, laid out in canonical
//! order. Every consumer walks [`Registry::modules`] / [`Registry::modules_mut`], so
//! sampling, log headers and setup files all see plates in the same order as
//! discovery produced them.

use crate::adapters::Transport;
use crate::plate::{
    Module, PlateFamily, Reading, TemperatureScale, BASE_SAMPLE_PERIOD_SECS, MAX_ADDRESSES,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Fingerprint token for an empty slot.
pub const ABSENT_TOKEN: &str = "X";

/// Number of (family, address) slots, and so of fingerprint tokens.
pub const SLOT_COUNT: usize = PlateFamily::ALL.len() * MAX_ADDRESSES as usize;

/// One (family, address) position.
#[derive(Debug)]
pub enum Slot {
    /// Nothing answered at this address
    Absent,
    /// A discovered plate
    Present(Module),
}

impl Slot {
    /// The plate, if present.
    pub fn module(&self) -> Option<&Module> {
        match self {
            Slot::Present(module) => Some(module),
            Slot::Absent => None,
        }
    }

    fn module_mut(&mut self) -> Option<&mut Module> {
        match self {
            Slot::Present(module) => Some(module),
            Slot::Absent => None,
        }
    }
}

/// Summary of one present plate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    /// Family prefix
    pub family: String,
    /// Address on the bridge
    pub address: u8,
    /// Number of channels
    pub channels: usize,
    /// Number of enabled channels
    pub enabled: usize,
}

/// Presence table plus the channel state of every present plate.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Slot>,
    min_sample_period: f64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with every slot absent.
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| Slot::Absent).collect(),
            min_sample_period: BASE_SAMPLE_PERIOD_SECS,
        }
    }

    fn slot_index(family: PlateFamily, address: u8) -> Option<usize> {
        (address < MAX_ADDRESSES)
            .then(|| family as usize * usize::from(MAX_ADDRESSES) + usize::from(address))
    }

    /// Probe every (family, address) slot and build the registry.
    ///
    /// A slot is present iff the probe response starts with the address digit.
    /// Timeouts and other transport errors mark the slot absent.
    pub async fn discover(transport: &mut dyn Transport, history_capacity: usize) -> Self {
        let mut registry = Self::new();

        for family in PlateFamily::ALL {
            let descriptor = family.descriptor();
            for address in 0..descriptor.max_addresses {
                let probe = descriptor.probe_command(address);
                let present = match transport.send(&probe).await {
                    Ok(response) => {
                        let expected = char::from(b'0' + address);
                        response.chars().next() == Some(expected)
                    }
                    Err(err) => {
                        debug!(command = %probe, error = %err, "No answer to probe");
                        false
                    }
                };
                if !present {
                    continue;
                }

                for command in descriptor.init_commands(address) {
                    if let Err(err) = transport.send(&command).await {
                        warn!(%command, error = %err, "Plate initialization command failed");
                    }
                }

                registry.insert(Module::new(family, address, history_capacity));
            }
        }

        info!(
            modules = registry.len(),
            min_period = registry.min_sample_period,
            "Discovery complete"
        );
        registry
    }

    /// Place a plate in its slot and account for its polling overhead.
    ///
    /// Replacing an already present slot keeps the overhead counted once.
    pub fn insert(&mut self, module: Module) {
        let family = module.family();
        let Some(index) = Self::slot_index(family, module.address()) else {
            warn!(%module, "Address out of range; plate ignored");
            return;
        };
        if matches!(self.slots[index], Slot::Absent) {
            self.min_sample_period += family.descriptor().overhead_secs;
        }
        info!(%module, channels = module.channels().len(), "Plate registered");
        self.slots[index] = Slot::Present(module);
    }

    /// Slots in canonical order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Present plates in canonical order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> + '_ {
        self.slots.iter().filter_map(Slot::module)
    }

    /// Present plates in canonical order, mutably.
    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> + '_ {
        self.slots.iter_mut().filter_map(Slot::module_mut)
    }

    /// Plate at a slot, if present.
    pub fn module(&self, family: PlateFamily, address: u8) -> Option<&Module> {
        Self::slot_index(family, address).and_then(|i| self.slots[i].module())
    }

    /// Mutable plate at a slot, if present.
    pub fn module_mut(&mut self, family: PlateFamily, address: u8) -> Option<&mut Module> {
        Self::slot_index(family, address).and_then(|i| self.slots[i].module_mut())
    }

    /// Number of present plates.
    pub fn len(&self) -> usize {
        self.modules().count()
    }

    /// Whether no plate was found.
    pub fn is_empty(&self) -> bool {
        self.modules().next().is_none()
    }

    /// Presence tokens for every slot: the address digit, or `X`.
    pub fn fingerprint(&self) -> Vec<String> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Slot::Present(_) => (index % usize::from(MAX_ADDRESSES)).to_string(),
                Slot::Absent => ABSENT_TOKEN.to_string(),
            })
            .collect()
    }

    /// Shortest period the attached plates can be polled at, in seconds.
    pub fn min_sample_period(&self) -> f64 {
        self.min_sample_period
    }

    /// Enabled channels across all plates.
    pub fn enabled_count(&self) -> usize {
        self.modules().map(Module::enabled_count).sum()
    }

    /// Log header entries for enabled channels, canonical order.
    pub fn header_entries(&self) -> Vec<String> {
        self.modules().flat_map(Module::descriptors).collect()
    }

    /// Sample every enabled channel once, canonical order, dropping missing values.
    pub async fn sample(&mut self, transport: &mut dyn Transport) -> Vec<Reading> {
        let mut values = Vec::new();
        for module in self.modules_mut() {
            values.extend(module.update(transport).await);
        }
        values
    }

    /// Enable every channel on every plate.
    pub fn select_all(&mut self) {
        self.modules_mut().for_each(Module::select_all);
    }

    /// Disable every channel on every plate.
    pub fn clear_all(&mut self) {
        self.modules_mut().for_each(Module::clear_all);
    }

    /// Set the scale used by every temperature plate.
    pub fn set_temperature_scale(&mut self, scale: TemperatureScale) {
        self.modules_mut()
            .filter(|m| m.family() == PlateFamily::Thermo)
            .for_each(|m| m.set_scale(scale));
    }

    /// Per-plate summary in canonical order.
    pub fn summaries(&self) -> Vec<ModuleSummary> {
        self.modules()
            .map(|m| ModuleSummary {
                family: m.family().to_string(),
                address: m.address(),
                channels: m.channels().len(),
                enabled: m.enabled_count(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedBridge;

    #[tokio::test]
    async fn test_discover_finds_present_plates() {
        let mut bridge = SimulatedBridge::new()
            .with_module(PlateFamily::Daqc2, 0)
            .with_module(PlateFamily::Thermo, 3)
            .with_module(PlateFamily::Adc, 1);

        let registry = Registry::discover(&mut bridge, 16).await;

        let names: Vec<String> = registry.modules().map(|m| m.to_string()).collect();
        assert_eq!(names, vec!["DAQC2-0", "THERMO-3", "ADC-1"]);
        assert!((registry.min_sample_period() - 0.46).abs() < 1e-9);

        // 48 probes plus the two ADC init commands right after its probe.
        assert_eq!(bridge.sent().len(), SLOT_COUNT + 2);
        let adc_probe = bridge
            .sent()
            .iter()
            .position(|c| c == "ADC.getADDR(1)")
            .unwrap();
        assert_eq!(bridge.sent()[adc_probe + 1], "ADC.initADC(1)");
        assert_eq!(bridge.sent()[adc_probe + 2], "ADC.setMODE(1,slow)");
    }

    #[tokio::test]
    async fn test_probe_order_is_canonical() {
        let mut bridge = SimulatedBridge::new();
        let registry = Registry::discover(&mut bridge, 4).await;

        assert!(registry.is_empty());
        assert_eq!(registry.min_sample_period(), BASE_SAMPLE_PERIOD_SECS);
        assert_eq!(bridge.sent()[0], "DAQC2.getADDR(0)");
        assert_eq!(bridge.sent()[8], "DAQC.getADDR(0)");
        assert_eq!(bridge.sent()[47], "DIGI.getADDR(7)");
    }

    #[test]
    fn test_fingerprint() {
        let mut registry = Registry::new();
        registry.insert(Module::new(PlateFamily::Daqc, 2, 4));
        registry.insert(Module::new(PlateFamily::Digi, 7, 4));

        let fingerprint = registry.fingerprint();
        assert_eq!(fingerprint.len(), 48);
        assert_eq!(fingerprint[10], "2");
        assert_eq!(fingerprint[47], "7");
        assert_eq!(fingerprint.iter().filter(|t| *t == "X").count(), 46);
    }

    #[test]
    fn test_insert_twice_counts_overhead_once() {
        let mut registry = Registry::new();
        registry.insert(Module::new(PlateFamily::Daqc, 0, 4));
        registry.insert(Module::new(PlateFamily::Daqc, 0, 4));
        assert!((registry.min_sample_period() - 0.21).abs() < 1e-9);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_header_entries_and_scale() {
        let mut registry = Registry::new();
        registry.insert(Module::new(PlateFamily::Thermo, 1, 4));
        registry.insert(Module::new(PlateFamily::Current, 0, 4));
        registry
            .module_mut(PlateFamily::Current, 0)
            .unwrap()
            .channel_mut(2)
            .unwrap()
            .set_enabled(true);
        registry
            .module_mut(PlateFamily::Thermo, 1)
            .unwrap()
            .channel_mut(0)
            .unwrap()
            .set_enabled(true);

        assert_eq!(
            registry.header_entries(),
            vec!["THERMO-1-T Channel 1:", "CURRENT-0-4-20mA 3:"]
        );

        registry.set_temperature_scale(TemperatureScale::Kelvin);
        assert_eq!(
            registry.module(PlateFamily::Thermo, 1).unwrap().scale(),
            TemperatureScale::Kelvin
        );
        assert_eq!(
            registry.module(PlateFamily::Current, 0).unwrap().scale(),
            TemperatureScale::Celsius
        );
    }
}
