use std::thread;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use touch_relay::{
    cli, client, config::Config, logging, mock::MockDevice, serial::serial_port::SerialConnector,
    server,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, error, info, Level};

// One thread serves every subscriber. The serial reader gets its own thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        match command {
            cli::Commands::Examples(example) => cli::show_example(example)?,
            cli::Commands::Watch { address, port } => {
                logging::init(Level::INFO, None).await;
                client::watch(&address, port).await?;
            }
        }

        return Ok(());
    }

    let stdout_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    logging::init(stdout_level, cli.log_dir.map(|dir| (Level::DEBUG, dir))).await;

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let server = async {
        if cli.mock {
            let (device, feed) = MockDevice::new("simulated", config.read_timeout());
            thread::Builder::new()
                .name("simulated-device".into())
                .spawn(move || touch_relay::mock::simulate(feed, Duration::from_millis(100)))?;

            server::run_on_port(config, device).await
        } else {
            let connector = SerialConnector::from_config(&config);
            server::run_on_port(config, connector).await
        }
    };

    #[cfg(unix)]
    let hangup = async {
        match signal(SignalKind::hangup()) {
            Ok(mut hangup) => {
                hangup.recv().await;
            }
            Err(e) => {
                error!(%e, "Could not listen for hangups");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup => {
            info!("Told to hang up, quitting")
        }
        result = server => {
            error!("Server returned");
            result?;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    logging::shutdown();

    Ok(())
}
