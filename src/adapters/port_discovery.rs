//! Locate the bridge among the host's serial ports by USB vendor/product id.
//!
//! Ids come from structured USB metadata when the OS provides it, otherwise from a
//! free-text hardware id containing `VID_xxxx` / `PID_xxxx` (case-insensitive hex).

use crate::config::SerialConfig;
use crate::error::{AppResult, PlateError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

static VID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)VID_([0-9A-F]{4})").expect("Invalid VID regex"));
static PID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PID_([0-9A-F]{4})").expect("Invalid PID regex"));

/// A serial port as seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Device path or COM name
    pub name: String,
    /// Vendor id from USB metadata, if any
    pub vid: Option<u16>,
    /// Product id from USB metadata, if any
    pub pid: Option<u16>,
    /// Free-text hardware id used when metadata is missing
    pub hardware_id: Option<String>,
}

impl PortInfo {
    /// Vendor and product id, preferring structured metadata over the hardware id text.
    pub fn ids(&self) -> (Option<u16>, Option<u16>) {
        let (text_vid, text_pid) = self
            .hardware_id
            .as_deref()
            .map(parse_hardware_id)
            .unwrap_or((None, None));
        (self.vid.or(text_vid), self.pid.or(text_pid))
    }

    /// Whether this port carries the given id pair.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.ids() == (Some(vid), Some(pid))
    }
}

/// Extract `VID_xxxx` and `PID_xxxx` from a hardware id string.
pub fn parse_hardware_id(hwid: &str) -> (Option<u16>, Option<u16>) {
    let capture = |pattern: &Regex| {
        pattern
            .captures(hwid)
            .and_then(|c| c.get(1))
            .and_then(|m| u16::from_str_radix(m.as_str(), 16).ok())
    };
    (capture(&VID_PATTERN), capture(&PID_PATTERN))
}

/// Parse a configured 4-digit hex id.
pub fn parse_id(text: &str) -> AppResult<u16> {
    u16::from_str_radix(text, 16)
        .map_err(|_| PlateError::Configuration(format!("Invalid USB id '{text}'")))
}

/// Pick the single port carrying `vid`/`pid`.
///
/// More than one match is unexpected; the first is used and the rest are logged.
pub fn find_bridge_port(ports: &[PortInfo], vid: u16, pid: u16) -> AppResult<String> {
    let mut matching = ports.iter().filter(|p| p.matches(vid, pid));
    let Some(first) = matching.next() else {
        return Err(PlateError::SerialPortNotFound {
            vendor_id: format!("{vid:04X}"),
            product_id: format!("{pid:04X}"),
        });
    };
    for extra in matching {
        warn!(port = %extra.name, chosen = %first.name, "Multiple bridges found; ignoring extra");
    }
    Ok(first.name.clone())
}

/// Enumerate the host's serial ports.
#[cfg(feature = "instrument_serial")]
pub fn available_ports() -> AppResult<Vec<PortInfo>> {
    use serialport::SerialPortType;

    let ports = serialport::available_ports()
        .map_err(|e| PlateError::Transport(format!("Failed to enumerate serial ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                name: port.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                hardware_id: usb.serial_number,
            },
            _ => PortInfo {
                hardware_id: Some(port.port_name.clone()),
                name: port.port_name,
                vid: None,
                pid: None,
            },
        })
        .collect())
}

/// Enumerate the host's serial ports.
#[cfg(not(feature = "instrument_serial"))]
pub fn available_ports() -> AppResult<Vec<PortInfo>> {
    Err(PlateError::SerialFeatureDisabled)
}

/// Resolve the port to open: the configured override, else the vid/pid match.
pub fn select_port(config: &SerialConfig) -> AppResult<String> {
    if let Some(port) = &config.port {
        info!(%port, "Using configured serial port");
        return Ok(port.clone());
    }

    let vid = parse_id(&config.vendor_id)?;
    let pid = parse_id(&config.product_id)?;
    let port = find_bridge_port(&available_ports()?, vid, pid)?;
    info!(%port, vendor_id = %config.vendor_id, product_id = %config.product_id, "Bridge found");
    Ok(port)
}
