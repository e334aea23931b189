use std::io;

use thiserror::Error;

/// Any error the serial link might encounter.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// The link could not be opened.
    #[error("Could not open `{path}`. Problem: {problem}")]
    Open {
        /// What we tried to open.
        path: String,

        /// Why it did not work.
        problem: String,
    },

    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// The link reached end of stream.
    #[error("Serial port disconnected")]
    Disconnected,

    /// Nobody is receiving samples anymore.
    #[error("The sample handoff is closed")]
    HandoffClosed,
}
