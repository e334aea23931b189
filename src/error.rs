use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration does not make sense.
    #[error("Bad configuration. Problem: {0}")]
    BadConfig(String),

    /// A configuration file could not be read.
    #[error("Could not read the configuration file `{path}`")]
    ConfigFile {
        /// Where we tried to read from.
        path: PathBuf,

        /// The underlying problem.
        #[source]
        source: io::Error,
    },

    /// A configuration file was not valid RON.
    #[error("The configuration could not be deserialized")]
    BadRon(#[from] ron::error::SpannedError),

    /// A configuration could not be serialized to RON.
    #[error("The configuration could not be serialized")]
    Ron(#[from] ron::Error),

    /// IO related errors.
    #[error("Underlying IO problem")]
    Io(#[from] io::Error),

    /// The server could not listen on the requested address.
    #[error("Could not bind to `{addr}`. Problem: {problem}")]
    Bind {
        /// The address we wanted.
        addr: SocketAddr,

        /// What went wrong.
        problem: String,
    },

    /// The server stopped with an error.
    #[error("The server stopped. Problem: {0}")]
    Server(String),

    /// Websocket problems on the client side.
    #[error("Websocket problem")]
    Websocket(#[from] tungstenite::Error),

    /// A message from the server was not a sample.
    #[error("The message `{message}` could not be deserialized. Problem: {problem}")]
    BadMessage {
        /// The problematic message.
        message: String,

        /// The deserialization issue.
        problem: String,
    },
}

impl Error {
    /// If the error is [`Error::BadConfig`], get the problem description.
    pub fn try_into_bad_config(self) -> Option<String> {
        if let Self::BadConfig(problem) = self {
            Some(problem)
        } else {
            None
        }
    }
}
