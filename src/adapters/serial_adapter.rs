//! USB serial transport to the plate bridge.

use crate::adapters::Transport;
use crate::config::SerialConfig;
use crate::error::{AppResult, PlateError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// Serial transport to the plate bridge
///
/// This adapter wraps the serialport crate and provides async I/O
/// using Tokio's blocking task executor for synchronous serial operations.
/// The port sits behind a mutex, so at most one command is ever in flight.
#[derive(Clone)]
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    port_name: String,

    /// Baud rate (115200 for the bridge)
    baud_rate: u32,

    /// Overall response timeout
    timeout: Duration,

    /// Line terminator appended to commands
    line_terminator: String,

    /// Response line ending character
    response_delimiter: char,

    #[cfg(feature = "instrument_serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl SerialAdapter {
    /// Create a new serial adapter with default settings
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyACM0", "COM3")
    /// * `baud_rate` - Communication speed
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        let defaults = SerialConfig::default();
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: defaults.timeout(),
            line_terminator: defaults.line_terminator,
            response_delimiter: '\n',
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Create an adapter for `port_name` using the configured baud rate, timeout and terminator.
    pub fn from_config(port_name: impl Into<String>, config: &SerialConfig) -> Self {
        Self {
            timeout: config.timeout(),
            line_terminator: config.line_terminator.clone(),
            ..Self::new(port_name, config.baud_rate)
        }
    }

    /// Override the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Port this adapter is bound to.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Whether the port is open.
    pub fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }
        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }

    /// Open the port.
    pub async fn connect(&mut self) -> AppResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = serialport::new(&self.port_name, self.baud_rate)
                .timeout(Duration::from_millis(100)) // Internal read timeout
                .open()
                .map_err(|e| PlateError::SerialPortOpen {
                    port: self.port_name.clone(),
                    reason: e.to_string(),
                })?;

            self.port = Some(Arc::new(Mutex::new(port)));

            info!(
                port = %self.port_name,
                baud = self.baud_rate,
                "Serial port opened"
            );
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            Err(PlateError::SerialFeatureDisabled)
        }
    }

    /// Close the port. Safe to call when already closed.
    pub async fn disconnect(&mut self) {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                debug!(port = %self.port_name, "Serial port closed");
            }
        }
    }
}

#[async_trait]
impl Transport for SerialAdapter {
    fn name(&self) -> &str {
        &self.port_name
    }

    async fn send(&mut self, command: &str) -> AppResult<String> {
        #[cfg(feature = "instrument_serial")]
        {
            let port = self
                .port
                .as_ref()
                .ok_or_else(|| PlateError::Transport("Serial port not connected".to_string()))?;

            let command_str = format!("{}{}", command, self.line_terminator);
            let command_owned = command.to_string();
            let delimiter = self.response_delimiter;
            let timeout = self.timeout;
            let port_clone = port.clone();

            // Execute blocking serial I/O on dedicated thread
            let result = tokio::task::spawn_blocking(move || -> AppResult<String> {
                let mut port_guard = port_clone.blocking_lock();
                exchange(&mut *port_guard, &command_str, &command_owned, delimiter, timeout)
            })
            .await
            .map_err(|e| PlateError::Transport(format!("Serial I/O task failed: {e}")))?;

            if let Err(PlateError::TransportTimeout { command, partial }) = &result {
                warn!(%command, %partial, "Serial read timed out");
            }
            result
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = command;
            Err(PlateError::SerialFeatureDisabled)
        }
    }
}

/// Blocking byte stream to the bridge.
#[cfg(feature = "instrument_serial")]
trait BridgeLine: std::io::Read + std::io::Write {
    /// Drop anything already received but not yet read.
    fn discard_input(&mut self) -> std::io::Result<()>;
}

#[cfg(feature = "instrument_serial")]
impl BridgeLine for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

/// Write one command line and read its response up to `delimiter`.
///
/// Stale input, such as a reply that arrived after an earlier timeout, is discarded
/// before the command is written so it cannot be taken for this command's response.
#[cfg(feature = "instrument_serial")]
fn exchange<L: BridgeLine + ?Sized>(
    line: &mut L,
    command_line: &str,
    command: &str,
    delimiter: char,
    timeout: Duration,
) -> AppResult<String> {
    use std::io::{Read, Write};

    line.discard_input()
        .map_err(|e| PlateError::Transport(format!("Input clear failed: {e}")))?;
    line.write_all(command_line.as_bytes())
        .map_err(|e| PlateError::Transport(format!("Write failed: {e}")))?;
    line.flush()
        .map_err(|e| PlateError::Transport(format!("Flush failed: {e}")))?;

    debug!(%command, "Sent serial command");

    // Read byte-by-byte until the delimiter
    let mut raw = Vec::new();
    let mut buffer = [0u8; 1];
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(PlateError::TransportTimeout {
                command: command.to_string(),
                partial: strip_line_ending(&String::from_utf8_lossy(&raw)),
            });
        }

        match line.read(&mut buffer) {
            Ok(0) => {
                return Err(PlateError::Transport("Unexpected EOF".to_string()));
            }
            Ok(_) => {
                raw.push(buffer[0]);
                if char::from(buffer[0]) == delimiter {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Port timeout is shorter than our overall timeout
                continue;
            }
            Err(e) => {
                return Err(PlateError::Transport(format!("Read failed: {e}")));
            }
        }
    }

    let response = strip_line_ending(&String::from_utf8_lossy(&raw));
    debug!(%response, "Received serial response");
    Ok(response)
}

/// Strip trailing CR/LF, keeping everything else verbatim.
pub fn strip_line_ending(text: &str) -> String {
    text.trim_end_matches(['\r', '\n']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_adapter_creation() {
        let adapter = SerialAdapter::new("/dev/ttyACM0", 115_200);
        assert_eq!(adapter.name(), "/dev/ttyACM0");
        assert_eq!(adapter.baud_rate, 115_200);
        assert_eq!(adapter.timeout, Duration::from_secs(20));
        assert_eq!(adapter.line_terminator, "\n");
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_from_config() {
        let config = SerialConfig {
            timeout_ms: 250,
            line_terminator: "\r\n".to_string(),
            ..SerialConfig::default()
        };
        let adapter = SerialAdapter::from_config("COM3", &config);
        assert_eq!(adapter.port_name(), "COM3");
        assert_eq!(adapter.timeout, Duration::from_millis(250));
        assert_eq!(adapter.line_terminator, "\r\n");
    }

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending("1.234\r\n"), "1.234");
        assert_eq!(strip_line_ending(" 3 \n"), " 3 ");
        assert_eq!(strip_line_ending(""), "");
    }

    /// In-memory line: a written command makes `reply` readable.
    #[cfg(feature = "instrument_serial")]
    struct FakeLine {
        input: std::collections::VecDeque<u8>,
        written: Vec<u8>,
        reply: &'static [u8],
    }

    #[cfg(feature = "instrument_serial")]
    impl std::io::Read for FakeLine {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.input.pop_front() {
                Some(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                None => Err(std::io::ErrorKind::TimedOut.into()),
            }
        }
    }

    #[cfg(feature = "instrument_serial")]
    impl std::io::Write for FakeLine {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            if buf.ends_with(b"\n") {
                self.input.extend(self.reply);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[cfg(feature = "instrument_serial")]
    impl BridgeLine for FakeLine {
        fn discard_input(&mut self) -> std::io::Result<()> {
            self.input.clear();
            Ok(())
        }
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_late_reply_is_discarded() {
        let mut line = FakeLine {
            input: b"7\r\n".iter().copied().collect(),
            written: Vec::new(),
            reply: b"1.250\r\n",
        };
        let response = exchange(
            &mut line,
            "DAQC.getADC(0,1)\n",
            "DAQC.getADC(0,1)",
            '\n',
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(response, "1.250");
        assert_eq!(line.written, b"DAQC.getADC(0,1)\n");
    }

    #[cfg(feature = "instrument_serial")]
    #[test]
    fn test_exchange_timeout_keeps_partial() {
        let mut line = FakeLine {
            input: Default::default(),
            written: Vec::new(),
            reply: b"12",
        };
        let err = exchange(
            &mut line,
            "THERMO.getTEMP(0,1,\"c\")\n",
            "THERMO.getTEMP(0,1,\"c\")",
            '\n',
            Duration::from_millis(20),
        )
        .unwrap_err();
        match err {
            PlateError::TransportTimeout { command, partial } => {
                assert_eq!(command, "THERMO.getTEMP(0,1,\"c\")");
                assert_eq!(partial, "12");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_send_without_connect_fails() {
        let mut adapter = SerialAdapter::new("/dev/null-bridge", 115_200);
        let err = adapter.send("DAQC.getADDR(0)").await.unwrap_err();
        assert!(err.is_no_data() || matches!(err, PlateError::SerialFeatureDisabled));
    }
}
