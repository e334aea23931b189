use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{config::Config, error::Error, sample::Sample, server::DEFAULT_PORT};

/// The command line interface for touch relay.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Also write logs to daily rotated files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Log debug messages to stdout.
    #[arg(short, long)]
    pub verbose: bool,

    /// Read from a simulated touch sensor instead of the serial port.
    #[arg(long)]
    pub mock: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),

    /// Subscribe to a running relay and print the samples.
    Watch {
        /// Server address.
        #[arg(short, long, default_value = "localhost")]
        address: String,

        /// Server port.
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

/// Helpful examples for users.
#[derive(Subcommand, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show an example JSON message (from server to subscriber) of a new sample.
    Sample,
}

/// Print the requested example.
pub fn show_example(example: Examples) -> Result<(), Error> {
    match example {
        Examples::Config => {
            println!("{}", Config::example().serialize_pretty()?);
        }
        Examples::Sample => {
            let sample = Sample::from_reading(512, 2048);
            let serialized = sample
                .to_wire()
                .map_err(|e| Error::BadMessage {
                    message: sample.to_string(),
                    problem: e.to_string(),
                })?;
            println!("{serialized}");
        }
    }

    Ok(())
}
