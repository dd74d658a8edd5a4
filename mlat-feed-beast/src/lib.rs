//! BEAST format
//!
//! The BEAST format is a stream protocol to transmit ADS-B related data frames
//! as they're captured by a receiver. It's an escaped format, meaning frames
//! start with an escape byte, and any occurances of the escape byte in the
//! payload is escaped as two escape bytes.
//!
//! This crate only handles the part of the protocol a multilateration station
//! needs: Mode A/C, Mode S short and Mode S long frames, each with the 6 byte
//! GPS timestamp attached by the receiver.
//!
//! ```plain
//! <esc> "1" : 6 byte MLAT timestamp, 1 byte signal level, 2 byte Mode-AC
//! <esc> "2" : 6 byte MLAT timestamp, 1 byte signal level, 7 byte Mode-S short frame
//! <esc> "3" : 6 byte MLAT timestamp, 1 byte signal level, 14 byte Mode-S long frame
//! ```
//!
//! - [Original documentation][1]
//! - [wiedehopf/readsb encoding][2]
//! - [wiedehopf/readsb decoding][3]
//! - [HULC extension][4]
//!
//! [1]: https://wiki.jetvision.de/wiki/Mode-S_Beast:Data_Output_Formats
//! [2]: https://github.com/wiedehopf/readsb/blob/75decb53c0e66f4c12cf24127578a3fe7d919219/net_io.c#L1754
//! [3]: https://github.com/wiedehopf/readsb/blob/75decb53c0e66f4c12cf24127578a3fe7d919219/net_io.c#L4885
//! [4]: https://static.avionix-tech.com/statics/cms/2023-11-21/GNS5894T_ADSB_Module_datasheet_V1.1.pdf

pub mod codec;
pub mod gillham;
pub mod reader;
pub mod reassembler;

use std::fmt::{
    Debug,
    Display,
};

use byteorder::{
    BigEndian,
    ByteOrder,
};
use bytes::{
    BufMut,
    Bytes,
};

pub use crate::{
    reader::{
        BatchReader,
        ReadCycle,
    },
    reassembler::Reassembler,
};

/// the "escape" byte.
pub const ESCAPE: u8 = 0x1a;

/// Length of the header every frame starts with: type tag, timestamp and
/// signal level.
pub const HEADER_LENGTH: usize = 8;

/// Longest de-stuffed frame we know about (Mode S long).
pub const MAX_FRAME_LENGTH: usize = HEADER_LENGTH + 14;

#[derive(Debug, thiserror::Error)]
#[error("beast error")]
pub enum Error {
    Io(#[from] std::io::Error),
}

/// Type of a frame, as given by its first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    ModeAc,
    ModeSShort,
    ModeSLong,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(Self::ModeAc),
            b'2' => Some(Self::ModeSShort),
            b'3' => Some(Self::ModeSLong),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::ModeAc => b'1',
            Self::ModeSShort => b'2',
            Self::ModeSLong => b'3',
        }
    }

    pub fn payload_length(&self) -> usize {
        match self {
            Self::ModeAc => 2,
            Self::ModeSShort => 7,
            Self::ModeSLong => 14,
        }
    }

    /// Length of the whole de-stuffed frame, including the type tag.
    pub fn frame_length(&self) -> usize {
        HEADER_LENGTH + self.payload_length()
    }

    pub fn is_mode_s(&self) -> bool {
        !matches!(self, Self::ModeAc)
    }
}

/// One de-stuffed frame, exactly as it came off the wire (without the leading
/// escape).
///
/// The reassembler doesn't validate anything but the frame being non-empty.
/// Use [`RawFrame::frame_type`] and [`RawFrame::payload`] to check whether it's
/// a frame we understand.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawFrame(Bytes);

impl RawFrame {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tag(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.tag().and_then(FrameType::from_byte)
    }

    /// Returns the frame type, if the tag is known and the frame has exactly
    /// the length that type requires.
    pub fn valid_frame_type(&self) -> Option<FrameType> {
        self.frame_type()
            .filter(|frame_type| frame_type.frame_length() == self.0.len())
    }

    pub fn timestamp(&self) -> Option<MlatTimestamp> {
        let bytes = self.0.get(1..7)?;
        let mut timestamp = [0; 6];
        timestamp.copy_from_slice(bytes);
        Some(MlatTimestamp(timestamp))
    }

    pub fn signal_level(&self) -> Option<SignalLevel> {
        self.0.get(7).copied().map(SignalLevel)
    }

    /// The Mode A/C or Mode S data, if the frame is valid.
    pub fn payload(&self) -> Option<&[u8]> {
        self.valid_frame_type()
            .map(|_| &self.0[HEADER_LENGTH..])
    }

    /// Escapes the frame and writes it with its leading escape byte.
    pub fn encode<B: BufMut>(&self, buffer: &mut B) {
        buffer.put_u8(ESCAPE);
        escape_into(&self.0, buffer);
    }
}

impl Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawFrame(")?;
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl From<&'static [u8]> for RawFrame {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

/// Writes `data` to `buffer`, doubling every escape byte.
pub fn escape_into<B: BufMut>(data: &[u8], buffer: &mut B) {
    for &byte in data {
        if byte == ESCAPE {
            buffer.put_u8(ESCAPE);
        }
        buffer.put_u8(byte);
    }
}

/// Timestamp used for multilateration.
///
/// It's big-endian. With a GPS receiver attached it's split like this:
///
/// > Upper 18 bits are seconds since last midnight 00:00:00 UTC
/// > Lower 30 bits are nanoseconds of current second
///
/// See the [HULC datasheet][1] and [readsb][2].
///
/// [1]: https://static.avionix-tech.com/statics/cms/2023-11-21/GNS5894T_ADSB_Module_datasheet_V1.1.pdf
/// [2]: https://github.com/wiedehopf/readsb/blob/75decb53c0e66f4c12cf24127578a3fe7d919219/net_io.c#L1701
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MlatTimestamp(pub [u8; 6]);

impl MlatTimestamp {
    /// A timestamp that indicates the data is synthetic, created from a
    /// multilateration result.
    pub const SYNTHETIC_MLAT: Self = Self(*b"\xFF\x00\x4D\x4C\x41\x54");

    pub fn is_synthetic(&self) -> bool {
        &self.0[0..5] == b"\xFF\x00\x4D\x4C\x41"
    }

    pub fn as_u64(&self) -> u64 {
        BigEndian::read_u48(&self.0)
    }

    pub fn decode(&self) -> GpsTime {
        let value = self.as_u64();
        GpsTime {
            seconds: (value >> 30) as u32,
            nanos: (value & 0x3fff_ffff) as u32,
        }
    }
}

impl Display for MlatTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// A decoded [`MlatTimestamp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpsTime {
    /// 18 bits: seconds since midnight UTC
    pub seconds: u32,
    /// 30 bits: nanoseconds of the current second
    pub nanos: u32,
}

impl GpsTime {
    /// Seconds as used in the per-second station files.
    ///
    /// The sub-second field is appended as decimal digits without padding,
    /// so `nanos = 5` gives `.5`, not `.000000005`. Every station in the
    /// network writes it this way, so files from different stations stay
    /// comparable with each other. Use [`GpsTime::as_seconds_f64`] for the
    /// physical value.
    pub fn legacy_seconds(&self) -> f64 {
        format!("{}.{}", self.seconds, self.nanos)
            .parse()
            .unwrap_or(f64::NAN)
    }

    pub fn as_seconds_f64(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.nanos) * 1e-9
    }
}

/// RSSI encoded as one byte.
///
/// <https://github.com/wiedehopf/readsb/blob/75decb53c0e66f4c12cf24127578a3fe7d919219/net_io.c#L1777>
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalLevel(pub u8);

impl SignalLevel {
    /// Fraction of full-scale power, as readsb encodes it:
    ///
    /// ```c
    /// sig = nearbyint(sqrt(mm->signalLevel) * 255);
    /// ```
    pub fn decode(&self) -> f32 {
        (f32::from(self.0) / 255.0).clamp(0.0, 1.0).powi(2)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        FrameType,
        MlatTimestamp,
        RawFrame,
    };

    #[test]
    fn it_checks_frame_length() {
        let mut bytes = vec![b'2'];
        bytes.extend_from_slice(&[0; 14]);
        let frame = RawFrame::from(bytes.clone());
        assert_eq!(frame.valid_frame_type(), Some(FrameType::ModeSShort));
        assert_eq!(frame.payload().map(|payload| payload.len()), Some(7));

        bytes.push(0);
        let frame = RawFrame::from(bytes);
        assert_eq!(frame.frame_type(), Some(FrameType::ModeSShort));
        assert_eq!(frame.valid_frame_type(), None);
        assert_eq!(frame.payload(), None);
    }

    #[test]
    fn it_splits_the_timestamp() {
        // 18 bits seconds: 31563, 30 bits nanos: 123456789
        let value = (31563u64 << 30) | 123456789;
        let bytes = value.to_be_bytes();
        let timestamp = MlatTimestamp(bytes[2..].try_into().unwrap());
        let time = timestamp.decode();
        assert_eq!(time.seconds, 31563);
        assert_eq!(time.nanos, 123456789);
        assert_abs_diff_eq!(time.as_seconds_f64(), 31563.123456789, epsilon = 1e-9);
        assert_eq!(timestamp.to_string(), "1ED2C75BCD15");
    }

    #[test]
    fn legacy_seconds_does_not_pad_the_fraction() {
        // 5 ns and 500 ms both become `.5`. This is kept on purpose, station
        // files have always been written like that.
        let five_nanos = MlatTimestamp([0, 0, 0, 0, 0, 5]).decode();
        let half_second =
            MlatTimestamp(500_000_000u64.to_be_bytes()[2..].try_into().unwrap()).decode();
        assert_eq!(five_nanos.legacy_seconds(), 0.5);
        assert_eq!(half_second.legacy_seconds(), 0.5);
        assert_abs_diff_eq!(five_nanos.as_seconds_f64(), 0.000000005, epsilon = 1e-12);
    }
}
