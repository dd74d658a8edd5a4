//! Frame reassembly
//!
//! Turns the raw byte stream into de-stuffed frames. The stream can be split at
//! any point, including between the two bytes of an escaped escape, so the
//! reassembler carries whatever it couldn't resolve over to the next chunk.
//!
//! The carried remainder is kept in wire format: the partial frame is escaped
//! again and prefixed with the escape that started it. Scanning the remainder
//! followed by the next chunk then gives the same result as scanning the
//! original bytes in one go.

use bytes::{
    BufMut,
    BytesMut,
};

use crate::{
    ESCAPE,
    MAX_FRAME_LENGTH,
    RawFrame,
    escape_into,
};

/// Partial frames longer than this can't be anything we decode. Dropping them
/// keeps a stream without escapes from growing the remainder forever.
const MAX_PARTIAL_FRAME_LENGTH: usize = 16 * MAX_FRAME_LENGTH;

#[derive(Debug, Default)]
pub struct Reassembler {
    /// Carried over remainder from the last chunk, in wire format.
    buffer: BytesMut,
    num_frames: usize,
    num_discarded_bytes: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the carried remainder and returns all frames that
    /// are complete now.
    ///
    /// A frame is only complete once the escape starting the next frame has
    /// been seen. The returned frames are in stream order and never empty.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = vec![];
        let mut current = BytesMut::with_capacity(MAX_FRAME_LENGTH);
        let mut trailing_escape = false;

        let buffer = &self.buffer[..];
        let mut i = 0;
        while i < buffer.len() {
            let byte = buffer[i];

            if byte != ESCAPE {
                current.put_u8(byte);
            }
            else if i == buffer.len() - 1 {
                // we can't tell yet if this is an escaped escape or the start of
                // the next frame.
                trailing_escape = true;
            }
            else if buffer[i + 1] == ESCAPE {
                // double escape
                current.put_u8(ESCAPE);
                i += 1;
            }
            else if !current.is_empty() {
                // escape followed by something else: start of the next frame
                frames.push(RawFrame(current.split().freeze()));
            }

            i += 1;
        }

        if current.len() > MAX_PARTIAL_FRAME_LENGTH {
            tracing::debug!(len = current.len(), "discarding oversized partial frame");
            self.num_discarded_bytes += current.len();
            current.clear();
        }

        let mut remainder = BytesMut::with_capacity(2 * current.len() + 2);
        if !current.is_empty() {
            remainder.put_u8(ESCAPE);
            escape_into(&current, &mut remainder);
        }
        if trailing_escape {
            remainder.put_u8(ESCAPE);
        }
        self.buffer = remainder;

        self.num_frames += frames.len();
        frames
    }

    /// The carried remainder, in wire format.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }

    /// Drops any partial frame, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of frames emitted so far.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn num_discarded_bytes(&self) -> usize {
        self.num_discarded_bytes
    }
}
