//! Turning lines from the device into samples.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The largest reading the 12 bit ADC produces.
pub const ADC_FULL_SCALE: f64 = 4095.0;

/// The ADC reference voltage, i.e. what [`ADC_FULL_SCALE`] corresponds to.
pub const REFERENCE_VOLTAGE: f64 = 3.3;

/// One reading from the touch sensor.
///
/// This is also exactly what subscribers receive, serialized as JSON:
/// `{"touch_value":512,"voltage":1.65}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    touch_value: i64,
    voltage: f64,
}

impl Sample {
    /// Create a sample from the touch value and the raw ADC reading.
    ///
    /// The ADC reading is scaled to volts and rounded to millivolts.
    /// Readings outside of the nominal 12 bit range are not clamped.
    pub fn from_reading(touch_value: i64, adc_raw: i64) -> Self {
        Self {
            touch_value,
            voltage: adc_to_voltage(adc_raw),
        }
    }

    /// The touch value as reported by the device.
    pub fn touch_value(&self) -> i64 {
        self.touch_value
    }

    /// The voltage, in volts, with three decimals.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// The text sent to subscribers.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "touch={} voltage={:.3}V", self.touch_value, self.voltage)
    }
}

fn adc_to_voltage(adc_raw: i64) -> f64 {
    let volts = adc_raw as f64 / ADC_FULL_SCALE * REFERENCE_VOLTAGE;

    (volts * 1000.0).round() / 1000.0
}

/// Why a line did not become a [`Sample`].
///
/// These are expected on a serial link (boot messages, half lines after a reset)
/// so callers should skip them, not treat them as failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    /// Nothing but whitespace.
    #[error("Empty line")]
    Empty,

    /// The line did not have exactly two comma separated fields.
    #[error("Expected 2 fields, got {0}")]
    FieldCount(usize),

    /// A field was not an integer.
    ///
    /// Integers must fit in an `i64`, larger ones end up here too.
    #[error("The field `{0}` is not an integer")]
    NotAnInteger(String),
}

/// Parse a line of the form `<touch_value>,<adc_raw>`.
pub fn parse(line: &str) -> Result<Sample, Rejected> {
    let line = line.trim();

    if line.is_empty() {
        return Err(Rejected::Empty);
    }

    let fields = line.split(',').collect::<Vec<_>>();

    let [touch_value, adc_raw] = fields[..] else {
        return Err(Rejected::FieldCount(fields.len()));
    };

    Ok(Sample::from_reading(
        parse_integer(touch_value)?,
        parse_integer(adc_raw)?,
    ))
}

fn parse_integer(field: &str) -> Result<i64, Rejected> {
    let field = field.trim();

    field
        .parse()
        .map_err(|_| Rejected::NotAnInteger(field.to_owned()))
}
