//! Command/response transports to the plate bridge.
//!
//! Everything that talks to hardware goes through [`Transport`]: one command in,
//! one response line out, never more than one command in flight. Implementations:
//!
//! - [`SerialAdapter`]: the USB serial bridge
//! - [`mock::SimulatedBridge`]: an in-process bridge answering the full command set
//! - [`mock::ScriptedTransport`]: canned responses for unit tests
//!
//! [`port_discovery`] finds the serial device by its USB vendor/product id.

pub mod mock;
pub mod port_discovery;
pub mod serial_adapter;

pub use mock::{Fault, ScriptedTransport, SimulatedBridge};
pub use serial_adapter::SerialAdapter;

use crate::error::AppResult;
use async_trait::async_trait;

/// Line-oriented command/response channel.
///
/// `send` appends the line terminator, writes the command and waits for one
/// response line with trailing CR/LF stripped. A read that does not complete in
/// time returns [`PlateError::TransportTimeout`](crate::error::PlateError) so
/// callers can tell it apart from a legitimate value.
#[async_trait]
pub trait Transport: Send {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Issue one command and return its response line.
    async fn send(&mut self, command: &str) -> AppResult<String>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn send(&mut self, command: &str) -> AppResult<String> {
        (**self).send(command).await
    }
}
