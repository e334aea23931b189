//! The serial reader owns the link to the device.
//!
//! It runs on its own thread since reads block (for up to the read timeout),
//! and hands every sample over to the async side through a channel.
//! The link is reopened forever whenever it breaks.

use std::{
    convert::Infallible,
    io::{self, Read},
    thread,
    time::Duration,
};

use bytes::BytesMut;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Decoder;
use tracing::{debug, info, info_span, trace, warn};

use crate::{
    sample::{self, Sample},
    serial::{
        codecs::lines::{decode_permissive, LinesCodec},
        error::SerialPortError,
        Connector,
    },
};

const READ_CHUNK: usize = 256;

/// Where the reader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// No link, and not trying yet.
    Disconnected,

    /// Trying to open the link, possibly waiting between attempts.
    Connecting,

    /// The link is open and being read.
    Connected,
}

/// Reads samples from a device and hands them over to the hub.
pub struct SerialReader<C> {
    connector: C,
    reconnect_delay: Duration,
    state: watch::Sender<LinkState>,
}

impl<C: Connector> SerialReader<C> {
    /// Create a reader which waits `reconnect_delay` after a failed attempt at opening the link,
    /// and after the link breaks.
    ///
    /// The returned receiver observes the [`LinkState`].
    pub fn new(connector: C, reconnect_delay: Duration) -> (Self, watch::Receiver<LinkState>) {
        let (state, state_rx) = watch::channel(LinkState::Disconnected);

        (
            Self {
                connector,
                reconnect_delay,
                state,
            },
            state_rx,
        )
    }

    /// Run the reader on a dedicated thread.
    ///
    /// The thread is not meant to be joined. It returns only once `handoff` has no receiver.
    pub fn spawn(self, handoff: mpsc::UnboundedSender<Sample>) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || self.run(handoff))
    }

    /// Run the read-and-reconnect loop on the current thread.
    pub fn run(mut self, handoff: mpsc::UnboundedSender<Sample>) {
        let span = info_span!("serial", link = %self.connector.describe());
        let _enter = span.enter();

        loop {
            let Some(port) = self.connect(&handoff) else {
                break;
            };

            match self.pump(port, &handoff) {
                Err(SerialPortError::HandoffClosed) => break,
                Err(e) => {
                    warn!(
                        %e,
                        "Serial link lost. Reconnecting in {:?}",
                        self.reconnect_delay
                    );
                    self.set_state(LinkState::Disconnected);
                    // A device may open fine and then fail every read.
                    thread::sleep(self.reconnect_delay);
                }
                Ok(never) => match never {},
            }
        }

        self.set_state(LinkState::Disconnected);
        info!("Nobody is receiving samples, reader stopping");
    }

    fn set_state(&self, state: LinkState) {
        self.state.send_replace(state);
    }

    /// Keep trying to open the link.
    ///
    /// Only gives up (returns `None`) if the handoff is closed.
    fn connect(&mut self, handoff: &mpsc::UnboundedSender<Sample>) -> Option<C::Port> {
        self.set_state(LinkState::Connecting);

        let mut attempt = 1usize;
        loop {
            if handoff.is_closed() {
                return None;
            }

            match self.connector.connect() {
                Ok(port) => {
                    info!(%attempt, "Connected");
                    self.set_state(LinkState::Connected);
                    return Some(port);
                }
                Err(e) => {
                    warn!(
                        %e,
                        %attempt,
                        "Serial port connection error. Retrying in {:?}",
                        self.reconnect_delay
                    );
                    thread::sleep(self.reconnect_delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Read lines until the link breaks.
    ///
    /// A fresh codec and buffer is used per link, so half a line from a broken link
    /// never gets glued onto data from the next one.
    fn pump(
        &self,
        mut port: C::Port,
        handoff: &mpsc::UnboundedSender<Sample>,
    ) -> Result<Infallible, SerialPortError> {
        let mut codec = LinesCodec::default();
        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(line) = codec.decode(&mut buffer)? {
                dispatch(&decode_permissive(&line), handoff)?;
            }

            match port.read(&mut chunk) {
                Ok(0) => return Err(SerialPortError::Disconnected),
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    trace!("Read timed out");
                    if handoff.is_closed() {
                        return Err(SerialPortError::HandoffClosed);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn dispatch(line: &str, handoff: &mpsc::UnboundedSender<Sample>) -> Result<(), SerialPortError> {
    match sample::parse(line) {
        Ok(sample) => {
            debug!(%sample, "Sample");
            handoff
                .send(sample)
                .map_err(|_| SerialPortError::HandoffClosed)
        }
        Err(rejected) => {
            trace!(%rejected, %line, "Skipping line");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Instant,
    };

    use pretty_assertions::assert_eq;

    use super::*;

    /// Hands out the given links in order, then refuses.
    struct Links(Vec<Option<Cursor<Vec<u8>>>>);

    impl Connector for Links {
        type Port = Cursor<Vec<u8>>;

        fn connect(&mut self) -> Result<Self::Port, SerialPortError> {
            if self.0.is_empty() {
                return Err(SerialPortError::Open {
                    path: "links".into(),
                    problem: "no more links".into(),
                });
            }

            self.0.remove(0).ok_or_else(|| SerialPortError::Open {
                path: "links".into(),
                problem: "refused".into(),
            })
        }

        fn describe(&self) -> String {
            "links".into()
        }
    }

    /// Always opens, but every read fails.
    struct Broken(Arc<AtomicUsize>);

    struct BrokenPort;

    impl Read for BrokenPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "always broken"))
        }
    }

    impl Connector for Broken {
        type Port = BrokenPort;

        fn connect(&mut self) -> Result<Self::Port, SerialPortError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(BrokenPort)
        }

        fn describe(&self) -> String {
            "broken".into()
        }
    }

    fn link(bytes: &[u8]) -> Option<Cursor<Vec<u8>>> {
        Some(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn dispatch_skips_rejected_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatch("abc,123", &tx).unwrap();
        dispatch("", &tx).unwrap();
        dispatch("512,2048", &tx).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Sample::from_reading(512, 2048));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dispatch_notices_closed_handoff() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        assert!(matches!(
            dispatch("1,2", &tx),
            Err(SerialPortError::HandoffClosed)
        ));
    }

    #[test]
    fn samples_survive_reconnects_in_order() {
        let links = Links(vec![
            None,
            link(b"1,0\n2,0\n3,"),
            None,
            link(b"4,0\nnoise\n5,0\n"),
        ]);

        let (reader, state) = SerialReader::new(links, Duration::from_millis(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = reader.spawn(tx).unwrap();

        let mut touch_values = vec![];
        while touch_values.len() < 4 {
            let sample = rx.blocking_recv().unwrap();
            touch_values.push(sample.touch_value());
        }

        // The partial "3," from the torn link is never completed by the next link.
        assert_eq!(touch_values, vec![1, 2, 4, 5]);

        drop(rx);
        handle.join().unwrap();

        assert_eq!(*state.borrow(), LinkState::Disconnected);
    }

    #[test]
    fn backs_off_when_every_read_fails() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let delay = Duration::from_millis(100);

        let (reader, _state) = SerialReader::new(Broken(attempts.clone()), delay);
        let (tx, rx) = mpsc::unbounded_channel();

        let started = Instant::now();
        let handle = reader.spawn(tx).unwrap();

        thread::sleep(Duration::from_millis(300));
        let seen = attempts.load(Ordering::SeqCst);
        let elapsed = started.elapsed();

        drop(rx);
        handle.join().unwrap();

        // One attempt up front, then at most one per delay.
        let allowed = 1 + (elapsed.as_millis() / delay.as_millis()) as usize;
        assert!(seen >= 1);
        assert!(seen <= allowed, "{seen} attempts in {elapsed:?}");
    }
}
