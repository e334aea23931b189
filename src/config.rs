use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

use crate::{error::Error, server::DEFAULT_PORT};

/// The configuration used for running the relay.
///
/// Every field may be omitted from a configuration file, the defaults
/// match the touch sensor firmware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// The path to the serial port.
    /// Likely "/dev/ttyUSBx" or "COMx".
    pub serial_path: String,

    /// The baud rate the device talks at.
    pub baud_rate: u32,

    /// How long a single read from the serial port may block.
    pub read_timeout_ms: u64,

    /// How long to wait between failed attempts at opening the serial port.
    pub reconnect_delay_ms: u64,

    /// Which address the web server listens on.
    pub bind_address: IpAddr,

    /// Which port the web server listens on.
    pub port: u16,

    /// The browser origin allowed to use the endpoints.
    pub allowed_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_path: "/dev/ttyUSB0".into(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            reconnect_delay_ms: 2000,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            allowed_origin: "http://localhost:4321".into(),
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Ok(Self::ron().from_str::<Config>(input)?)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            serial_path: "/dev/ttyACM0".into(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            allowed_origin: "http://touch.example.com".into(),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Ok(Self::ron().to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p.as_ref()).map_err(|source| Error::ConfigFile {
            path: p.as_ref().to_path_buf(),
            source,
        })?;

        Self::deserialize(&s)
    }

    /// See [`Config::read_timeout_ms`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// See [`Config::reconnect_delay_ms`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// The allowed origin as a header value.
    pub(crate) fn allowed_origin_header(&self) -> Result<HeaderValue, Error> {
        HeaderValue::from_str(&self.allowed_origin).map_err(|e| {
            Error::BadConfig(format!(
                "The allowed origin `{}` is not a valid header value: {e}",
                self.allowed_origin
            ))
        })
    }

    fn check_serial(&self) -> Result<(), Error> {
        if self.serial_path.trim().is_empty() {
            return Err(Error::BadConfig("The serial path is empty.".into()));
        }

        if self.baud_rate == 0 {
            return Err(Error::BadConfig("The baud rate must be above zero.".into()));
        }

        Ok(())
    }

    fn check_timings(&self) -> Result<(), Error> {
        // A zero read timeout would make the reader spin on an idle port.
        if self.read_timeout_ms == 0 {
            return Err(Error::BadConfig(
                "The read timeout must be above zero milliseconds.".into(),
            ));
        }

        if self.reconnect_delay_ms == 0 {
            return Err(Error::BadConfig(
                "The reconnect delay must be above zero milliseconds.".into(),
            ));
        }

        Ok(())
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), Error> {
        self.check_serial()?;
        self.check_timings()?;
        self.allowed_origin_header()?;

        Ok(())
    }
}
