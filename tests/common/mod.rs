#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use color_eyre::Result;
use futures::StreamExt;
use tokio::{net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use touch_relay::{
    client::SampleStream,
    config::Config,
    mock::{MockDevice, MockFeed},
    sample::Sample,
    server,
};
use tracing::info;

/// Lines with this touch value are only used to find out when a subscriber is registered.
pub const WARMUP_TOUCH_VALUE: i64 = 0;

pub struct Relay {
    pub port: u16,
    pub feed: MockFeed,
    attempts: Arc<AtomicUsize>,
}

impl Relay {
    /// How many times the relay tried to open the device.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

pub fn test_config() -> Config {
    Config {
        read_timeout_ms: 10,
        reconnect_delay_ms: 10,
        ..Default::default()
    }
}

pub async fn start_relay() -> Relay {
    start_relay_refusing(0).await
}

/// Start a relay whose device refuses the first `refusals` connection attempts.
pub async fn start_relay_refusing(refusals: usize) -> Relay {
    let config = test_config();

    let (device, feed) = MockDevice::new("test-device", config.read_timeout());
    let device = device.refusing(refusals);
    let attempts = device.attempts();

    let (port_tx, port_rx) = oneshot::channel();

    tokio::spawn(async move { server::run_any_port(config, device, port_tx).await });
    let port = port_rx
        .await
        .expect("Server should reply with allocated port");

    Relay {
        port,
        feed,
        attempts,
    }
}

pub async fn connect(relay: &Relay) -> Result<SampleStream> {
    info!("Connecting to relay on port {}", relay.port);

    Ok(SampleStream::connect("127.0.0.1", relay.port).await?)
}

pub async fn connect_raw(relay: &Relay) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let (stream, http_response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", relay.port)).await?;

    assert_eq!(
        http_response.status(),
        axum::http::StatusCode::SWITCHING_PROTOCOLS
    );

    Ok(stream)
}

/// The next sample which is not a warmup.
pub async fn receive(samples: &mut SampleStream) -> Result<Sample> {
    loop {
        let sample = timeout(Duration::from_secs(5), samples.next_sample())
            .await??
            .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))?;

        if sample.touch_value() != WARMUP_TOUCH_VALUE {
            return Ok(sample);
        }
    }
}

/// The next text message which is not a warmup.
pub async fn receive_raw(
    client: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Result<String> {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

        let text = message.into_text()?;
        let sample: Sample = serde_json::from_str(&text)?;

        if sample.touch_value() != WARMUP_TOUCH_VALUE {
            return Ok(text);
        }
    }
}

/// Subscribers are registered a little after the websocket handshake.
/// Feed warmup lines until one arrives, so we know this one is registered.
pub async fn wait_until_subscribed(relay: &Relay, samples: &mut SampleStream) -> Result<()> {
    for _ in 0..100 {
        relay.feed.line(&format!("{WARMUP_TOUCH_VALUE},0"));

        if let Ok(sample) = timeout(Duration::from_millis(100), samples.next_sample()).await {
            if sample?.is_some() {
                return Ok(());
            }
        }
    }

    Err(color_eyre::eyre::eyre!("Never got a warmup sample"))
}

pub async fn wait_until_subscribed_raw(
    relay: &Relay,
    client: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Result<()> {
    for _ in 0..100 {
        relay.feed.line(&format!("{WARMUP_TOUCH_VALUE},0"));

        if let Ok(message) = timeout(Duration::from_millis(100), client.next()).await {
            if message.is_some() {
                return Ok(());
            }
        }
    }

    Err(color_eyre::eyre::eyre!("Never got a warmup message"))
}

/// Connect and wait until registered.
pub async fn subscribe(relay: &Relay) -> Result<SampleStream> {
    let mut samples = connect(relay).await?;
    wait_until_subscribed(relay, &mut samples).await?;

    Ok(samples)
}
