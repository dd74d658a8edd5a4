//! Gillham code
//!
//! <https://en.wikipedia.org/wiki/Gillham_code>

/// Decodes 13-bit identity code as is used in DF5, DF21, and the ADS-B
/// identity fields.
///
/// ```plain
/// input:  C1 A1 C2 A2 C4 A4 ID B1 D1 B2 D2 B4 D4
/// output: A4 A2 A1 B4 B2 B1 C4 C2 C1 D4 D2 D1
/// ```
///
/// the ID bit in the input is ignored (this is the IDENT flag). The output
/// holds one octal digit per group, so `format!("{:04o}")` gives the squawk.
pub fn decode_gillham_id13(code: u16) -> u16 {
    ID13_BITS
        .iter()
        .enumerate()
        .filter(|(i, _)| code & (1 << (12 - i)) != 0)
        .fold(0, |value, (_, output_bit)| value | output_bit)
}

/// Output bit for each input bit, starting at the most significant one.
const ID13_BITS: [u16; 13] = [
    0o0010, // C1
    0o1000, // A1
    0o0020, // C2
    0o2000, // A2
    0o0040, // C4
    0o4000, // A4
    0,      // ID
    0o0100, // B1
    0o0001, // D1
    0o0200, // B2
    0o0002, // D2
    0o0400, // B4
    0o0004, // D4
];

#[cfg(test)]
mod tests {
    use crate::gillham::decode_gillham_id13;

    #[test]
    fn it_decodes_id13() {
        assert_eq!(decode_gillham_id13(2214), 0o5502);
        assert_eq!(decode_gillham_id13(2048), 0o1000);
        assert_eq!(decode_gillham_id13(5147), 0o0635);
    }

    #[test]
    fn it_ignores_the_ident_bit() {
        assert_eq!(decode_gillham_id13(0b0000001000000), 0);
        assert_eq!(
            decode_gillham_id13(2214 | 0b0000001000000),
            decode_gillham_id13(2214)
        );
    }
}
