//! Field decoding for the parts of a frame the station files need.
//!
//! Bit numbers in here count from the most significant bit of the first
//! payload byte, starting at 0, like the Mode S documentation does.

use std::fmt::{
    Debug,
    Display,
};

use crate::{
    MlatTimestamp,
    gillham::decode_gillham_id13,
};

/// Highest valid downlink format. The 5 bit field can hold up to 31, but
/// anything starting with `11` is DF24.
pub const MAX_DOWNLINK_FORMAT: u8 = 24;

/// Downlink formats that carry an identity (squawk) code we record.
pub const SQUAWK_DOWNLINK_FORMATS: [u8; 3] = [5, 17, 21];

/// Decodes the downlink format from bits 0 to 4.
///
/// Values above 24 are folded to 24. For Mode A/C payloads the result has no
/// meaning.
pub fn decode_downlink_format(payload: &[u8]) -> u8 {
    payload
        .first()
        .map_or(0, |byte| (byte >> 3).min(MAX_DOWNLINK_FORMAT))
}

/// Decodes the 6 byte timestamp into seconds, the way the station files
/// store it. See [`GpsTime::legacy_seconds`][crate::GpsTime::legacy_seconds].
pub fn decode_timestamp(timestamp: &MlatTimestamp) -> f64 {
    timestamp.decode().legacy_seconds()
}

/// Decodes the identity code from bits 19 to 31.
///
/// ```plain
/// byte         2        3
/// bit   01234567 01234567
/// value ...CACAC AIBDBDBD
/// ```
///
/// Returns `None` if the payload is shorter than 4 bytes.
pub fn decode_squawk(payload: &[u8]) -> Option<Squawk> {
    let bytes = payload.get(2..4)?;
    let id13 = (u16::from(bytes[0] & 0b00011111) << 8) | u16::from(bytes[1]);
    Some(Squawk::from_u16_unchecked(decode_gillham_id13(id13)))
}

/// Transponder identity code, 4 octal digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Squawk {
    code: u16,
}

impl Squawk {
    pub const fn from_u16_unchecked(code: u16) -> Self {
        Self { code }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        (code < 0o10000).then(|| Self::from_u16_unchecked(code))
    }
}

impl Display for Squawk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04o}", self.code)
    }
}

impl Debug for Squawk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Squawk({:04o})", self.code)
    }
}

impl From<Squawk> for u16 {
    fn from(value: Squawk) -> Self {
        value.code
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::{
        MlatTimestamp,
        codec::{
            Squawk,
            decode_downlink_format,
            decode_squawk,
            decode_timestamp,
        },
    };

    #[test]
    fn it_decodes_the_downlink_format() {
        for df in 0..=24u8 {
            assert_eq!(decode_downlink_format(&[df << 3 | 0b101]), df);
        }
    }

    #[test]
    fn it_folds_invalid_downlink_formats_to_24() {
        for df in 25..=31u8 {
            assert_eq!(decode_downlink_format(&[df << 3]), 24);
        }
    }

    #[test]
    fn it_decodes_squawk_1200() {
        // DF5, A1 at bit 20, B2 at bit 28
        let payload = b"\x28\x00\x08\x08\x12\x34\x56";
        assert_eq!(decode_downlink_format(payload), 5);
        assert_eq!(decode_squawk(payload).unwrap().to_string(), "1200");
    }

    #[test]
    fn it_decodes_all_digit_groups() {
        // DF21, A1 A2 A4 C1 C2 C4 set: bits 19 to 24
        let payload =
            b"\xa8\x00\x1f\x80\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        assert_eq!(decode_downlink_format(payload), 21);
        assert_eq!(decode_squawk(payload).unwrap().to_string(), "7070");

        // D1 D2 D4 at bits 27, 29, 31 and B1 B2 B4 at 26, 28, 30
        let payload = b"\xa8\x00\x1f\xbf\x00\x00\x00";
        assert_eq!(decode_squawk(payload).unwrap().to_string(), "7777");
        // A1 A2 A4 at bits 20, 22, 24 and B1 B2 B4 at 26, 28, 30
        let payload = b"\xa8\x00\x0a\xaa\x00\x00\x00";
        assert_eq!(decode_squawk(payload).unwrap().to_string(), "7700");
    }

    #[test]
    fn it_keeps_leading_zeros() {
        assert_eq!(Squawk::from_u16(0o0042).unwrap().to_string(), "0042");
        assert_eq!(Squawk::from_u16(0o10000), None);
    }

    #[test]
    fn short_payloads_have_no_squawk() {
        assert_eq!(decode_squawk(b"\x28\x00\x08"), None);
    }

    #[test]
    fn it_decodes_the_timestamp_literally() {
        // 31563 seconds, 123 in the sub-second field
        let value = (31563u64 << 30) | 123;
        let timestamp = MlatTimestamp(value.to_be_bytes()[2..].try_into().unwrap());
        assert_abs_diff_eq!(decode_timestamp(&timestamp), 31563.123);
    }
}
