//! Connection handling for the BEAST stream.
//!
//! The connection is never given up. Failing to connect, read errors and the
//! peer closing the connection all lead to reconnecting. Every reconnect waits
//! [`FeedConfig::retry_delay`] first, so a peer that accepts and immediately
//! closes is retried at that rate.

use std::{
    num::NonZeroUsize,
    time::Duration,
};

use futures_util::StreamExt;
use mlat_feed_beast::{
    BatchReader,
    RawFrame,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::FeedConfig,
    error_log::{
        ErrorCode,
        ErrorLog,
    },
    source::Connector,
};

pub type FrameSender = mpsc::UnboundedSender<Vec<RawFrame>>;

#[derive(Debug, thiserror::Error)]
#[error("giving up after {num_attempts} connection attempts")]
pub struct ReconnectFailed {
    pub num_attempts: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReaderStats {
    pub num_connects: usize,
    pub num_bytes: usize,
    pub num_frames: usize,

    /// Bytes dropped because a partial frame grew too long.
    pub num_discarded_bytes: usize,

    /// Smallest unused part of the read buffer seen so far. `None` if
    /// nothing was read yet.
    pub min_margin: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Disconnect {
    Shutdown,
    ReadError,
    PeerClosed,
}

/// Owns the connection and sends every read's frames to the decoder.
#[derive(Debug)]
pub struct ConnectionManager<C> {
    connector: C,
    connect_timeout: Duration,
    retry_delay: Duration,
    max_connect_attempts: Option<NonZeroUsize>,
    read_buffer_size: usize,
    max_empty_reads: usize,
    error_log: ErrorLog,
    frame_sender: FrameSender,
    shutdown: CancellationToken,
    stats: ReaderStats,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        config: &FeedConfig,
        error_log: ErrorLog,
        frame_sender: FrameSender,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connector,
            connect_timeout: config.connect_timeout,
            retry_delay: config.retry_delay,
            max_connect_attempts: config.max_connect_attempts,
            read_buffer_size: config.read_buffer_size,
            max_empty_reads: config.max_empty_reads.max(1),
            error_log,
            frame_sender,
            shutdown,
            stats: ReaderStats::default(),
        }
    }

    /// Connects and reads until `shutdown` is cancelled.
    pub async fn run(mut self) -> ReaderStats {
        loop {
            let stream = match self.connect().await {
                Ok(Some(stream)) => stream,
                Ok(None) => break,
                Err(error) => {
                    tracing::error!(%error, "reconnect failed");
                    self.error_log.report(ErrorCode::ReconnectFailed);
                    if self.wait_retry_delay().await {
                        break;
                    }
                    continue;
                }
            };

            match self.read_until_disconnect(stream).await {
                Disconnect::Shutdown => break,
                disconnect => {
                    tracing::info!(?disconnect, retry_delay = ?self.retry_delay, "disconnected");
                    if self.wait_retry_delay().await {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            num_frames = self.stats.num_frames,
            num_bytes = self.stats.num_bytes,
            num_discarded_bytes = self.stats.num_discarded_bytes,
            num_connects = self.stats.num_connects,
            min_margin = ?self.stats.min_margin,
            "reader stopped"
        );

        self.stats
    }

    /// Tries to connect until it succeeds.
    ///
    /// Returns `Ok(None)` if shut down while trying.
    pub async fn connect(&mut self) -> Result<Option<C::Stream>, ReconnectFailed> {
        let mut num_attempts = 0;

        loop {
            num_attempts += 1;

            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(None),
                result = tokio::time::timeout(self.connect_timeout, self.connector.connect()) => result,
            };

            match result {
                Ok(Ok(stream)) => {
                    self.stats.num_connects += 1;
                    tracing::info!(num_attempts, "connected");
                    return Ok(Some(stream));
                }
                Ok(Err(error)) => {
                    tracing::warn!(?error, num_attempts, "connection failed");
                }
                Err(_) => {
                    tracing::warn!(timeout = ?self.connect_timeout, num_attempts, "connection timed out");
                }
            }

            self.error_log.report(ErrorCode::ConnectionFailed);

            if let Some(max_connect_attempts) = self.max_connect_attempts {
                if num_attempts >= max_connect_attempts.get() {
                    return Err(ReconnectFailed { num_attempts });
                }
            }

            if self.wait_retry_delay().await {
                return Ok(None);
            }
        }
    }

    async fn read_until_disconnect(&mut self, stream: C::Stream) -> Disconnect {
        // a fresh reader per connection, so a partial frame from the last
        // connection is dropped.
        let mut reader = BatchReader::with_buffer_size(stream, self.read_buffer_size);
        let mut num_empty_reads = 0;
        let mut num_discarded_bytes = 0;

        loop {
            let cycle = tokio::select! {
                _ = self.shutdown.cancelled() => return Disconnect::Shutdown,
                cycle = reader.next() => cycle,
            };

            let cycle = match cycle {
                Some(Ok(cycle)) => cycle,
                Some(Err(error)) => {
                    tracing::warn!(?error, "read failed");
                    self.error_log.report(ErrorCode::ConnectionFailed);
                    return Disconnect::ReadError;
                }
                None => return Disconnect::PeerClosed,
            };

            if cycle.num_bytes_read == 0 {
                self.error_log.report(ErrorCode::EmptyRead);

                num_empty_reads += 1;
                if num_empty_reads >= self.max_empty_reads {
                    return Disconnect::PeerClosed;
                }
            }
            else {
                num_empty_reads = 0;
                self.stats.num_bytes += cycle.num_bytes_read;

                if cycle.is_saturated() {
                    self.error_log.report(ErrorCode::ReadBufferSaturated);
                }

                let margin = cycle.margin();
                if self.stats.min_margin.is_none_or(|min_margin| margin < min_margin) {
                    self.stats.min_margin = Some(margin);
                }
            }

            self.stats.num_frames += cycle.frames.len();

            let discarded = reader.reassembler().num_discarded_bytes();
            if discarded > num_discarded_bytes {
                tracing::debug!(num_bytes = discarded - num_discarded_bytes, "discarded partial frame");
                self.stats.num_discarded_bytes += discarded - num_discarded_bytes;
                num_discarded_bytes = discarded;
            }

            if self.frame_sender.send(cycle.frames).is_err() {
                self.error_log.report(ErrorCode::ForwardFrames);
            }
        }
    }

    /// Returns `true` if shut down while waiting.
    async fn wait_retry_delay(&self) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = tokio::time::sleep(self.retry_delay) => false,
        }
    }
}
