//! Turns raw frames into the records written to the station files.

use std::fmt::Display;

use chrono::{
    Timelike,
    Utc,
};
use mlat_feed_beast::{
    FrameType,
    RawFrame,
    codec::{
        SQUAWK_DOWNLINK_FORMATS,
        decode_downlink_format,
        decode_squawk,
        decode_timestamp,
    },
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error_log::{
    ErrorCode,
    ErrorLog,
};

pub type FrameReceiver = mpsc::UnboundedReceiver<Vec<RawFrame>>;
pub type RecordSender = mpsc::UnboundedSender<Vec<DecodedRecord>>;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame type: {0:#04x}")]
    UnknownType(u8),
    #[error("invalid length for {frame_type:?}: {length}")]
    InvalidLength { frame_type: FrameType, length: usize },
}

/// One line of a station file.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRecord {
    /// Hex of the whole frame, type tag included.
    pub full_message: String,
    pub timestamp_hex: String,
    pub timestamp_value: f64,

    /// Seconds since midnight UTC when the frame was decoded. Only used to
    /// diagnose receiver clock issues.
    pub local_wallclock_seconds: f64,

    /// Meaningless for Mode A/C frames.
    pub downlink_format: u8,

    /// The Mode A/C payload as hex, or the squawk.
    pub code_field: String,
}

impl DecodedRecord {
    /// The second this record is filed under, if its timestamp can name one.
    pub fn segment_second(&self) -> Option<u64> {
        (self.timestamp_value.is_finite() && self.timestamp_value >= 0.0)
            .then(|| self.timestamp_value.floor() as u64)
    }
}

impl Display for DecodedRecord {
    /// Formats the record like the station files have always stored it:
    ///
    /// ```plain
    /// '<full message>', '<timestamp hex>', <timestamp>, <wallclock>, <df>, '<code>'
    /// ```
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}', '{}', {}, {}, {}, '{}'",
            self.full_message,
            self.timestamp_hex,
            LegacyFloat(self.timestamp_value),
            LegacyFloat(self.local_wallclock_seconds),
            self.downlink_format,
            self.code_field,
        )
    }
}

/// Floats always have a decimal point in the station files.
struct LegacyFloat(f64);

impl Display for LegacyFloat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formatted = self.0.to_string();
        if self.0.is_finite() && !formatted.contains('.') {
            write!(f, "{formatted}.0")
        }
        else {
            write!(f, "{formatted}")
        }
    }
}

/// Seconds since midnight UTC, with microsecond resolution.
pub fn wallclock_seconds() -> f64 {
    let now = Utc::now();
    f64::from(now.num_seconds_from_midnight()) + f64::from(now.nanosecond() / 1000) * 1e-6
}

/// Decodes a single frame.
///
/// Returns `Ok(None)` for valid Mode S frames that don't carry a squawk.
pub fn decode_frame(
    frame: &RawFrame,
    local_wallclock_seconds: f64,
) -> Result<Option<DecodedRecord>, DecodeError> {
    let tag = frame.tag().ok_or(DecodeError::Empty)?;
    let frame_type = FrameType::from_byte(tag).ok_or(DecodeError::UnknownType(tag))?;
    let invalid_length = || {
        DecodeError::InvalidLength {
            frame_type,
            length: frame.len(),
        }
    };
    let payload = frame.payload().ok_or_else(invalid_length)?;
    let timestamp = frame.timestamp().ok_or_else(invalid_length)?;

    let downlink_format = decode_downlink_format(payload);

    let code_field = if frame_type.is_mode_s() {
        if !SQUAWK_DOWNLINK_FORMATS.contains(&downlink_format) {
            return Ok(None);
        }
        let Some(squawk) = decode_squawk(payload)
        else {
            return Ok(None);
        };
        squawk.to_string()
    }
    else {
        hex::encode_upper(payload)
    };

    Ok(Some(DecodedRecord {
        full_message: hex::encode_upper(frame.as_bytes()),
        timestamp_hex: timestamp.to_string(),
        timestamp_value: decode_timestamp(&timestamp),
        local_wallclock_seconds,
        downlink_format,
        code_field,
    }))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DecoderStats {
    pub num_frames: usize,
    pub num_invalid: usize,
    pub num_records: usize,
}

#[derive(Debug)]
pub struct Decoder {
    frame_receiver: FrameReceiver,
    record_sender: RecordSender,
    error_log: ErrorLog,
    shutdown: CancellationToken,
    stats: DecoderStats,
}

impl Decoder {
    pub fn new(
        frame_receiver: FrameReceiver,
        record_sender: RecordSender,
        error_log: ErrorLog,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            frame_receiver,
            record_sender,
            error_log,
            shutdown,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Decodes a batch, keeping the frame order. Invalid frames are skipped.
    pub fn decode_batch(&mut self, frames: &[RawFrame]) -> Vec<DecodedRecord> {
        let wallclock = wallclock_seconds();
        let mut records = Vec::with_capacity(frames.len());

        for frame in frames {
            self.stats.num_frames += 1;

            match decode_frame(frame, wallclock) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(?frame, %error, "skipping frame");
                    self.stats.num_invalid += 1;
                }
            }
        }

        records
    }

    /// Decodes batches until `shutdown` is cancelled.
    pub async fn run(mut self) -> DecoderStats {
        let mut upstream_closed = false;

        loop {
            let frames = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frames = self.frame_receiver.recv(), if !upstream_closed => frames,
            };

            let Some(frames) = frames
            else {
                tracing::warn!("frame channel closed");
                self.error_log.report(ErrorCode::DecoderReceive);
                upstream_closed = true;
                continue;
            };

            let records = self.decode_batch(&frames);
            let num_records = records.len();

            if self.record_sender.send(records).is_err() {
                self.error_log.report(ErrorCode::DecoderForward);
            }
            else {
                self.stats.num_records += num_records;
            }
        }

        tracing::info!(
            num_frames = self.stats.num_frames,
            num_invalid = self.stats.num_invalid,
            num_records = self.stats.num_records,
            "decoder stopped"
        );

        self.stats
    }
}
