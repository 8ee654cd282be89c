//! Static description of every plate family the bridge can host.
//!
//! One [`FamilyDescriptor`] per family records its command prefix, address range,
//! polling overhead and channel block layout. Discovery, sampling, log headers and
//! setup files all iterate [`PlateFamily::ALL`] and the descriptor blocks in the order
//! given here, which is what makes the canonical order identical everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest number of addresses any family can occupy on the bridge.
pub const MAX_ADDRESSES: u8 = 8;

/// Minimum sample period with no plates attached, in seconds.
pub const BASE_SAMPLE_PERIOD_SECS: f64 = 0.01;

/// A class of plate with its own channel layout and command prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlateFamily {
    /// Analog + digital input plate, second generation
    Daqc2,
    /// Analog + digital input plate
    Daqc,
    /// Thermocouple / RTD plate
    Thermo,
    /// 4-20mA current loop plate
    Current,
    /// Precision ADC plate with analog, digital and current blocks
    Adc,
    /// Digital input plate
    Digi,
}

impl PlateFamily {
    /// Every family in canonical order.
    pub const ALL: [PlateFamily; 6] = [
        PlateFamily::Daqc2,
        PlateFamily::Daqc,
        PlateFamily::Thermo,
        PlateFamily::Current,
        PlateFamily::Adc,
        PlateFamily::Digi,
    ];

    /// Layout and protocol details for this family.
    pub fn descriptor(self) -> &'static FamilyDescriptor {
        &FAMILIES[self as usize]
    }

    /// Command prefix, also used in log headers.
    pub fn prefix(self) -> &'static str {
        self.descriptor().prefix
    }
}

impl fmt::Display for PlateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for PlateFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlateFamily::ALL
            .into_iter()
            .find(|family| family.prefix().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown plate family '{s}'"))
    }
}

/// What a channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Voltage input
    Analog,
    /// Digital input bit
    Digital,
    /// Temperature input
    Temperature,
    /// 4-20mA current input
    Current,
}

impl ChannelKind {
    /// Digital inputs report integers; everything else reports floats.
    pub fn is_integer(self) -> bool {
        matches!(self, ChannelKind::Digital)
    }
}

/// Unit requested from temperature plates on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureScale {
    /// Degrees Celsius
    #[default]
    #[serde(rename = "c")]
    Celsius,
    /// Degrees Fahrenheit
    #[serde(rename = "f")]
    Fahrenheit,
    /// Kelvin
    #[serde(rename = "k")]
    Kelvin,
}

impl TemperatureScale {
    /// Scale letter as sent on the wire.
    pub fn letter(self) -> char {
        match self {
            TemperatureScale::Celsius => 'c',
            TemperatureScale::Fahrenheit => 'f',
            TemperatureScale::Kelvin => 'k',
        }
    }
}

impl fmt::Display for TemperatureScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for TemperatureScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(TemperatureScale::Celsius),
            "f" => Ok(TemperatureScale::Fahrenheit),
            "k" => Ok(TemperatureScale::Kelvin),
            other => Err(format!("Unknown temperature scale '{other}' (expected c, f or k)")),
        }
    }
}

/// How default channel labels are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    /// `"<prefix><hardware channel>:"`
    Numbered(&'static str),
    /// Single-ended inputs 0-7 then differential pairs numbered from 0
    SingleEndedDifferential,
}

/// A run of same-kind channels within one plate.
#[derive(Debug, Clone, Copy)]
pub struct BlockLayout {
    /// Channel kind for the whole block
    pub kind: ChannelKind,
    /// Number of channels in the block
    pub count: u8,
    /// Hardware channel number of the first channel
    pub first_channel: u8,
    /// Command verb used to read one channel
    pub read_verb: &'static str,
    /// Default label scheme
    pub label: LabelStyle,
}

impl BlockLayout {
    /// Hardware channel numbers in ascending order.
    pub fn hw_channels(&self) -> impl Iterator<Item = u8> {
        self.first_channel..self.first_channel + self.count
    }

    /// Label a freshly discovered channel starts with.
    pub fn default_label(&self, hw_channel: u8) -> String {
        match self.label {
            LabelStyle::Numbered(prefix) => format!("{prefix}{hw_channel}:"),
            LabelStyle::SingleEndedDifferential if hw_channel < 8 => {
                format!("SE Channel {hw_channel}:")
            }
            LabelStyle::SingleEndedDifferential => format!("DE Channel {}:", hw_channel - 8),
        }
    }
}

/// A one-time command sent to a plate right after it is found.
#[derive(Debug, Clone, Copy)]
pub struct InitStep {
    /// Command verb
    pub verb: &'static str,
    /// Extra argument after the address
    pub argument: Option<&'static str>,
}

/// Protocol and layout table entry for one family.
#[derive(Debug)]
pub struct FamilyDescriptor {
    /// Family this entry describes
    pub family: PlateFamily,
    /// Command prefix
    pub prefix: &'static str,
    /// Number of addresses probed during discovery
    pub max_addresses: u8,
    /// Seconds added to the minimum sample period per discovered plate
    pub overhead_secs: f64,
    /// Channel blocks in canonical order
    pub blocks: &'static [BlockLayout],
    /// Commands issued once after discovery, in order
    pub init: &'static [InitStep],
}

impl FamilyDescriptor {
    /// Presence probe for one address.
    pub fn probe_command(&self, address: u8) -> String {
        format!("{}.getADDR({})", self.prefix, address)
    }

    /// Initialization commands for one discovered address.
    pub fn init_commands(&self, address: u8) -> Vec<String> {
        self.init
            .iter()
            .map(|step| match step.argument {
                Some(arg) => format!("{}.{}({},{})", self.prefix, step.verb, address, arg),
                None => format!("{}.{}({})", self.prefix, step.verb, address),
            })
            .collect()
    }

    /// Total channels on one plate of this family.
    pub fn channel_count(&self) -> usize {
        self.blocks.iter().map(|b| usize::from(b.count)).sum()
    }
}

const ANALOG_DIGITAL_BLOCKS: [BlockLayout; 2] = [
    BlockLayout {
        kind: ChannelKind::Analog,
        count: 8,
        first_channel: 0,
        read_verb: "getADC",
        label: LabelStyle::Numbered("A Channel "),
    },
    BlockLayout {
        kind: ChannelKind::Digital,
        count: 8,
        first_channel: 0,
        read_verb: "getDINbit",
        label: LabelStyle::Numbered("D Channel "),
    },
];

static FAMILIES: [FamilyDescriptor; 6] = [
    FamilyDescriptor {
        family: PlateFamily::Daqc2,
        prefix: "DAQC2",
        max_addresses: MAX_ADDRESSES,
        overhead_secs: 0.15,
        blocks: &ANALOG_DIGITAL_BLOCKS,
        init: &[],
    },
    FamilyDescriptor {
        family: PlateFamily::Daqc,
        prefix: "DAQC",
        max_addresses: MAX_ADDRESSES,
        overhead_secs: 0.2,
        blocks: &ANALOG_DIGITAL_BLOCKS,
        init: &[],
    },
    FamilyDescriptor {
        family: PlateFamily::Thermo,
        prefix: "THERMO",
        max_addresses: MAX_ADDRESSES,
        overhead_secs: 0.15,
        blocks: &[BlockLayout {
            kind: ChannelKind::Temperature,
            count: 12,
            first_channel: 1,
            read_verb: "getTEMP",
            label: LabelStyle::Numbered("T Channel "),
        }],
        init: &[],
    },
    FamilyDescriptor {
        family: PlateFamily::Current,
        prefix: "CURRENT",
        max_addresses: MAX_ADDRESSES,
        overhead_secs: 0.15,
        blocks: &[BlockLayout {
            kind: ChannelKind::Current,
            count: 8,
            first_channel: 1,
            read_verb: "getI",
            label: LabelStyle::Numbered("4-20mA "),
        }],
        init: &[],
    },
    FamilyDescriptor {
        family: PlateFamily::Adc,
        prefix: "ADC",
        max_addresses: MAX_ADDRESSES,
        overhead_secs: 0.15,
        blocks: &[
            BlockLayout {
                kind: ChannelKind::Analog,
                count: 12,
                first_channel: 0,
                read_verb: "getADC",
                label: LabelStyle::SingleEndedDifferential,
            },
            BlockLayout {
                kind: ChannelKind::Digital,
                count: 4,
                first_channel: 0,
                read_verb: "getDINbit",
                label: LabelStyle::Numbered("D Channel "),
            },
            // The bridge firmware exposes the current inputs through getADC.
            BlockLayout {
                kind: ChannelKind::Current,
                count: 4,
                first_channel: 1,
                read_verb: "getADC",
                label: LabelStyle::Numbered("4-20mA "),
            },
        ],
        init: &[
            InitStep {
                verb: "initADC",
                argument: None,
            },
            InitStep {
                verb: "setMODE",
                argument: Some("slow"),
            },
        ],
    },
    FamilyDescriptor {
        family: PlateFamily::Digi,
        prefix: "DIGI",
        max_addresses: MAX_ADDRESSES,
        overhead_secs: 0.15,
        blocks: &[BlockLayout {
            kind: ChannelKind::Digital,
            count: 8,
            first_channel: 1,
            read_verb: "getDINbit",
            label: LabelStyle::Numbered("D Channel "),
        }],
        init: &[],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_enum_order() {
        for (index, family) in PlateFamily::ALL.into_iter().enumerate() {
            assert_eq!(family as usize, index);
            assert_eq!(family.descriptor().family, family);
        }
    }

    #[test]
    fn test_channel_counts() {
        let counts: Vec<usize> = PlateFamily::ALL
            .into_iter()
            .map(|f| f.descriptor().channel_count())
            .collect();
        assert_eq!(counts, vec![16, 16, 12, 8, 20, 8]);
    }

    #[test]
    fn test_commands() {
        let daqc2 = PlateFamily::Daqc2.descriptor();
        assert_eq!(daqc2.probe_command(3), "DAQC2.getADDR(3)");
        assert!(daqc2.init_commands(3).is_empty());

        let adc = PlateFamily::Adc.descriptor();
        assert_eq!(
            adc.init_commands(2),
            vec!["ADC.initADC(2)".to_string(), "ADC.setMODE(2,slow)".to_string()]
        );
    }

    #[test]
    fn test_default_labels() {
        let adc = PlateFamily::Adc.descriptor();
        assert_eq!(adc.blocks[0].default_label(7), "SE Channel 7:");
        assert_eq!(adc.blocks[0].default_label(8), "DE Channel 0:");
        assert_eq!(adc.blocks[2].default_label(1), "4-20mA 1:");

        let thermo = PlateFamily::Thermo.descriptor();
        let labels: Vec<String> = thermo.blocks[0]
            .hw_channels()
            .map(|c| thermo.blocks[0].default_label(c))
            .collect();
        assert_eq!(labels.first().map(String::as_str), Some("T Channel 1:"));
        assert_eq!(labels.last().map(String::as_str), Some("T Channel 12:"));
    }

    #[test]
    fn test_parse_family_and_scale() {
        assert_eq!("daqc2".parse::<PlateFamily>().unwrap(), PlateFamily::Daqc2);
        assert_eq!("THERMO".parse::<PlateFamily>().unwrap(), PlateFamily::Thermo);
        assert!("PLATE".parse::<PlateFamily>().is_err());

        assert_eq!("F".parse::<TemperatureScale>().unwrap(), TemperatureScale::Fahrenheit);
        assert!("x".parse::<TemperatureScale>().is_err());
        assert_eq!(TemperatureScale::Kelvin.to_string(), "k");
    }
}
