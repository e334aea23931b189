#![deny(missing_docs)]

//! This crate relays a touch sensor attached to a serial port to websocket subscribers.
//!
//! The serial port is read on a dedicated thread, since reads block.
//! Each line `<touch_value>,<adc_raw>` becomes a [`sample::Sample`],
//! which is handed over to the async side and broadcast to every subscriber
//! as `{"touch_value":512,"voltage":1.65}`.
//!
//! The serial port is reopened forever if it goes away.
//! Subscribers which can't be delivered to are dropped.

/// Code relating to setting up the server which accepts subscribers.
pub mod server;

/// A client for subscribing to a relay.
pub mod client;

/// The command line interface.
pub mod cli;

/// Handles incoming websockets.
pub(crate) mod websocket;

/// Mocked serial device.
pub mod mock;

/// Serial port driver.
pub mod serial;

/// Parsing lines from the device.
pub mod sample;

/// The live subscribers.
pub mod registry;

/// Broadcasting samples.
pub mod hub;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
