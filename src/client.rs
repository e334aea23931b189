use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};
use tungstenite::protocol::Message;

use crate::{error::Error, sample::Sample};

/// A subscriber connection to a running relay.
pub struct SampleStream {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SampleStream {
    /// Connect to the relay at the given address and port.
    pub async fn connect(address: &str, port: u16) -> Result<Self, Error> {
        let url = format!("ws://{address}:{port}/ws");
        info!("Connecting to {url}");

        let (stream, _) = tokio_tungstenite::connect_async(url).await?;

        Ok(Self { stream })
    }

    /// Wait for the next sample.
    ///
    /// Returns `None` once the relay closes the connection.
    pub async fn next_sample(&mut self) -> Result<Option<Sample>, Error> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => {
                    return serde_json::from_str(&text).map(Some).map_err(|e| {
                        Error::BadMessage {
                            message: text,
                            problem: e.to_string(),
                        }
                    });
                }
                Message::Close(_) => {
                    debug!("Relay closed the connection");
                    break;
                }
                other => trace!(?other, "Ignoring message"),
            }
        }

        Ok(None)
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.close(None).await?;

        Ok(())
    }
}

/// Print samples from a relay until it goes away.
pub async fn watch(address: &str, port: u16) -> Result<(), Error> {
    let mut samples = SampleStream::connect(address, port).await?;

    while let Some(sample) = samples.next_sample().await? {
        println!("{sample}");
    }

    Ok(())
}
