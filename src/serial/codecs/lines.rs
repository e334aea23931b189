use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::serial::error::SerialPortError;

/// Lines longer than this are garbage, not samples.
pub(crate) const DEFAULT_MAX_LENGTH: usize = 1024;

/// This codec splits incoming bytes on a configurable delimiter.
///
/// Lines which grow past the maximum length without a delimiter are discarded,
/// up to and including the next delimiter.
#[derive(Debug, Clone)]
pub(crate) struct LinesCodec {
    /// How far we have looked for a delimiter into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,

    max_length: usize,

    /// Set while throwing away the remains of an overlong line.
    discarding: bool,
}

impl LinesCodec {
    /// Create a new codec.
    pub(crate) fn new(read_delimiter: u8, max_length: usize) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
            max_length,
            discarding: false,
        }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n', DEFAULT_MAX_LENGTH)
    }
}

impl Decoder for LinesCodec {
    type Item = Vec<u8>;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = src.len();
            let look_at = &src[self.cursor..read_to];

            match look_at.iter().position(|&byte| byte == self.read_delimiter) {
                Some(position) => {
                    // Since we might "start late" in the buffer (from the cursor),
                    // the "global" position within the buffer has to be calculated.
                    let actual_position = self.cursor + position;

                    // Next time we need to start over.
                    self.cursor = 0;

                    let line = src.split_to(actual_position);

                    // Discard the delimiter.
                    src.advance(1);

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }

                    return Ok(Some(line.to_vec()));
                }
                None if read_to > self.max_length => {
                    debug!(bytes = read_to, "Discarding overlong line");

                    src.clear();
                    self.cursor = 0;
                    self.discarding = true;

                    return Ok(None);
                }
                None => {
                    // No full frame yet. The same buffer comes back next time,
                    // possibly with more data, so skip what we already looked at.
                    self.cursor = read_to;

                    return Ok(None);
                }
            }
        }
    }
}

/// Turn a line into text, dropping any bytes which are not valid utf8.
pub(crate) fn decode_permissive(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}
