//! A mock, useful to test the relay without the actual device.
//!
//! A [`MockDevice`] is a [`Connector`] whose links read whatever is pushed through
//! the paired [`MockFeed`].

use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex, PoisonError,
    },
    thread,
    time::Duration,
};

use tracing::{debug, info, trace};

use crate::serial::{error::SerialPortError, Connector};

#[derive(Debug)]
enum MockEvent {
    Bytes(Vec<u8>),
    Unplug,
}

#[derive(Debug)]
struct Inbox {
    events: mpsc::Receiver<MockEvent>,

    /// The feed is gone, so links cannot be opened anymore.
    hung_up: bool,
}

/// A pretend device.
#[derive(Debug)]
pub struct MockDevice {
    name: String,
    inbox: Arc<Mutex<Inbox>>,
    read_timeout: Duration,
    refusals: usize,
    attempts: Arc<AtomicUsize>,
}

/// Controls what a [`MockDevice`] sends.
#[derive(Debug, Clone)]
pub struct MockFeed {
    events: mpsc::Sender<MockEvent>,
}

impl MockFeed {
    /// Send a line, a newline is appended.
    /// Returns `false` if the device is gone.
    pub fn line(&self, line: &str) -> bool {
        self.bytes(format!("{line}\n").as_bytes())
    }

    /// Send raw bytes.
    /// Returns `false` if the device is gone.
    pub fn bytes(&self, bytes: &[u8]) -> bool {
        self.events.send(MockEvent::Bytes(bytes.to_vec())).is_ok()
    }

    /// Make the current link fail with an IO error, as if the cable was pulled.
    /// The next attempt at connecting succeeds again.
    pub fn unplug(&self) -> bool {
        self.events.send(MockEvent::Unplug).is_ok()
    }
}

impl MockDevice {
    /// Create a device and the feed controlling it.
    pub fn new(name: &str, read_timeout: Duration) -> (Self, MockFeed) {
        let (tx, rx) = mpsc::channel();

        (
            Self {
                name: name.to_owned(),
                inbox: Arc::new(Mutex::new(Inbox {
                    events: rx,
                    hung_up: false,
                })),
                read_timeout,
                refusals: 0,
                attempts: Arc::new(AtomicUsize::new(0)),
            },
            MockFeed { events: tx },
        )
    }

    /// Refuse this many attempts at connecting before accepting.
    pub fn refusing(mut self, refusals: usize) -> Self {
        self.refusals = refusals;
        self
    }

    /// Counts every call to [`Connector::connect`], refused or not.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

impl Connector for MockDevice {
    type Port = MockPort;

    fn connect(&mut self) -> Result<Self::Port, SerialPortError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refuse = |problem: &str| SerialPortError::Open {
            path: self.name.clone(),
            problem: problem.into(),
        };

        if self.refusals > 0 {
            self.refusals -= 1;
            return Err(refuse("refused by mock"));
        }

        if self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .hung_up
        {
            return Err(refuse("mock feed closed"));
        }

        debug!(name = %self.name, "Mock link opened");

        Ok(MockPort {
            inbox: self.inbox.clone(),
            read_timeout: self.read_timeout,
            leftover: vec![],
        })
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

/// An open link to a [`MockDevice`].
#[derive(Debug)]
pub struct MockPort {
    inbox: Arc<Mutex<Inbox>>,
    read_timeout: Duration,
    leftover: Vec<u8>,
}

impl MockPort {
    fn hand_out(&mut self, bytes: Vec<u8>, buf: &mut [u8]) -> usize {
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.leftover = bytes[n..].to_vec();
        n
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.leftover.is_empty() {
            let leftover = std::mem::take(&mut self.leftover);
            return Ok(self.hand_out(leftover, buf));
        }

        let inbox = self.inbox.clone();
        let mut inbox = inbox.lock().unwrap_or_else(PoisonError::into_inner);
        let event = inbox.events.recv_timeout(self.read_timeout);

        match event {
            Ok(MockEvent::Bytes(bytes)) => Ok(self.hand_out(bytes, buf)),
            Ok(MockEvent::Unplug) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device unplugged",
            )),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                inbox.hung_up = true;
                Ok(0)
            }
        }
    }
}

/// Feed a plausible touch sensor signal forever.
///
/// The touch value slowly ramps up and down, and the voltage follows it.
/// Returns once the device is gone.
pub fn simulate(feed: MockFeed, interval: Duration) {
    info!(?interval, "Simulating a touch sensor");

    let mut step: i64 = 0;
    loop {
        let phase = step % 200;
        let touch_value = 20 + if phase < 100 { phase } else { 200 - phase };
        let adc_raw = touch_value * 4095 / 120;

        let line = format!("{touch_value},{adc_raw}");
        trace!(%line, "Simulated");

        if !feed.line(&line) {
            break;
        }

        step += 1;
        thread::sleep(interval);
    }

    info!("Simulated device gone");
}
