use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

use crate::{
    Error,
    RawFrame,
    reassembler::Reassembler,
};

/// Size of a single read from the underlying reader.
pub const READ_BUFFER_SIZE: usize = 16384;

/// Result of a single read.
#[derive(Clone, Debug)]
pub struct ReadCycle {
    /// Number of bytes the read returned. This is 0 if the reader returned no
    /// data.
    pub num_bytes_read: usize,

    /// Size of the read buffer.
    pub buffer_size: usize,

    /// Frames completed by this read, in stream order.
    pub frames: Vec<RawFrame>,
}

impl ReadCycle {
    /// How much of the read buffer was left unused.
    pub fn margin(&self) -> usize {
        self.buffer_size - self.num_bytes_read
    }

    /// The read filled the whole buffer, so there might have been more data
    /// waiting.
    pub fn is_saturated(&self) -> bool {
        self.num_bytes_read == self.buffer_size
    }
}

pin_project! {
    /// Reads BEAST data and yields the frames completed by each read.
    ///
    /// Unlike most readers this doesn't end when the underlying reader
    /// returns 0 bytes. It yields an empty [`ReadCycle`] instead and leaves it
    /// to the caller to decide whether the connection is gone.
    #[derive(Debug)]
    pub struct BatchReader<R> {
        #[pin]
        reader: R,
        read_buffer: Box<[u8]>,
        reassembler: Reassembler,
    }
}

impl<R> BatchReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_buffer_size(reader, READ_BUFFER_SIZE)
    }

    pub fn with_buffer_size(reader: R, buffer_size: usize) -> Self {
        Self {
            reader,
            read_buffer: vec![0; buffer_size].into_boxed_slice(),
            reassembler: Reassembler::new(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.read_buffer.len()
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncRead> Stream for BatchReader<R> {
    type Item = Result<ReadCycle, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        let mut read_buf = ReadBuf::new(this.read_buffer);
        match this.reader.poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(error)) => Poll::Ready(Some(Err(error.into()))),
            Poll::Ready(Ok(())) => {
                let received = read_buf.filled();
                let num_bytes_read = received.len();
                tracing::trace!(num_bytes_read, "read");

                let frames = if num_bytes_read == 0 {
                    vec![]
                }
                else {
                    this.reassembler.push(received)
                };

                Poll::Ready(Some(Ok(ReadCycle {
                    num_bytes_read,
                    buffer_size: read_buf.capacity(),
                    frames,
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use futures_util::TryStreamExt;

    use crate::{
        ESCAPE,
        RawFrame,
        reader::BatchReader,
    };

    fn mode_ac(code: [u8; 2]) -> RawFrame {
        let mut bytes = vec![b'1', 0, 0, 0, 0, 0, ESCAPE, 0x80];
        bytes.extend_from_slice(&code);
        RawFrame::from(bytes)
    }

    #[tokio::test]
    async fn it_yields_frames_per_read() {
        let frames = [mode_ac([0x12, 0x34]), mode_ac([ESCAPE, 0x00])];
        let mut wire = BytesMut::new();
        for frame in &frames {
            frame.encode(&mut wire);
        }
        wire.extend_from_slice(&[ESCAPE, b'2']);

        let mut reader = BatchReader::with_buffer_size(&wire[..], 16);

        let mut emitted = vec![];
        let mut num_reads = 0;
        let mut total_bytes = 0;
        loop {
            let cycle = reader.try_next().await.unwrap().unwrap();
            if cycle.num_bytes_read == 0 {
                break;
            }
            assert!(cycle.num_bytes_read <= 16);
            assert_eq!(cycle.margin(), 16 - cycle.num_bytes_read);
            total_bytes += cycle.num_bytes_read;
            num_reads += 1;
            emitted.extend(cycle.frames);
        }

        assert_eq!(total_bytes, wire.len());
        assert!(num_reads > 1);
        assert_eq!(emitted, frames);
    }

    #[tokio::test]
    async fn it_reports_saturated_reads() {
        let wire = [0x00; 8];
        let mut reader = BatchReader::with_buffer_size(&wire[..], 8);
        let cycle = reader.try_next().await.unwrap().unwrap();
        assert!(cycle.is_saturated());
        assert_eq!(cycle.margin(), 0);
    }
}
