use std::io::Read;

/// Serial port related errors.
pub mod error;

/// The real serial port.
pub mod serial_port;

/// The blocking read-and-reconnect loop.
pub mod reader;

/// Codecs for decoding messages from the wire.
pub(crate) mod codecs;

use error::SerialPortError;

/// Something able to open the link to the device.
///
/// The reader calls [`Connector::connect`] every time it needs a fresh link,
/// both initially and after the previous link broke.
///
/// Reads on the returned port must block for at most the read timeout,
/// and report an elapsed timeout as [`std::io::ErrorKind::TimedOut`].
pub trait Connector: Send + 'static {
    /// The opened link.
    type Port: Read + Send;

    /// Attempt to open the link once.
    fn connect(&mut self) -> Result<Self::Port, SerialPortError>;

    /// A human readable description of where this connects, for logs.
    fn describe(&self) -> String;
}
