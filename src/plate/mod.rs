//! Plate families, modules and channels.
//!
//! - [`family`]: the static family descriptor table that fixes canonical order
//! - [`module`]: one present (family, address) slot and its channels
//! - [`channel`]: per-channel selection, label, latest value and history

pub mod channel;
pub mod family;
pub mod module;

pub use channel::{Channel, ReadTarget, Reading};
pub use family::{
    BlockLayout, ChannelKind, FamilyDescriptor, PlateFamily, TemperatureScale,
    BASE_SAMPLE_PERIOD_SECS, MAX_ADDRESSES,
};
pub use module::Module;
