use std::time::Duration;

use serialport::SerialPort;
use tracing::info;

use crate::{
    config::Config,
    serial::{error::SerialPortError, Connector},
};

/// Opens a real serial port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: String,
    baud: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    /// Connect to the given path.
    /// The path should likely be along the lines of `/dev/ttyUSB0` on unix, and `COMx` on Windows.
    pub fn new(path: &str, baud: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.to_owned(),
            baud,
            read_timeout,
        }
    }

    /// Use the serial settings of a [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.serial_path, config.baud_rate, config.read_timeout())
    }
}

impl Connector for SerialConnector {
    type Port = Box<dyn SerialPort>;

    fn connect(&mut self) -> Result<Self::Port, SerialPortError> {
        let port = serialport::new(&self.path, self.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| SerialPortError::Open {
                path: self.path.clone(),
                problem: e.to_string(),
            })?;

        info!(path = %self.path, baud = %self.baud, "Opened serial port");

        Ok(port)
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud)
    }
}
