/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! CheckSum (tag 10) arithmetic.
//!
//! A frame's trailer carries the byte sum of everything before `10=`,
//! truncated to eight bits and written as exactly three decimal digits.

/// Width of the CheckSum value on the wire.
const DIGITS: usize = 3;

/// Sums `data` modulo 256.
///
/// ```
/// use fixgate_tagvalue::calculate_checksum;
///
/// assert_eq!(calculate_checksum(b"8=FIX.4.4\x019=5\x0135=0\x01"), 163);
/// ```
#[inline]
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().copied().fold(0, u8::wrapping_add)
}

/// Renders a CheckSum value with leading zeros.
#[inline]
#[must_use]
pub fn format_checksum(checksum: u8) -> [u8; DIGITS] {
    [100, 10, 1].map(|place| b'0' + checksum / place % 10)
}

/// Reads a three-digit CheckSum value. Anything else, including values
/// above 255, yields `None`.
#[inline]
#[must_use]
pub fn parse_checksum(bytes: &[u8]) -> Option<u8> {
    let digits: [u8; DIGITS] = bytes.try_into().ok()?;
    let value = digits.iter().try_fold(0u16, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u16::from(b - b'0'))
    })?;
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_logout_header() {
        let prefix = b"8=FIX.4.2\x019=12\x0135=5\x0134=1\x01";
        assert_eq!(calculate_checksum(prefix), 170);
        assert_eq!(&format_checksum(calculate_checksum(prefix)), b"170");
        assert_eq!(calculate_checksum(b""), 0);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(calculate_checksum(&[0x80, 0x80, 0x05]), 5);
    }

    #[test]
    fn test_format_pads_to_three_digits() {
        assert_eq!(&format_checksum(0), b"000");
        assert_eq!(&format_checksum(7), b"007");
        assert_eq!(&format_checksum(64), b"064");
        assert_eq!(&format_checksum(255), b"255");
    }

    #[test]
    fn test_parse_trailer_value() {
        assert_eq!(parse_checksum(b"007"), Some(7));
        assert_eq!(parse_checksum(b"255"), Some(255));
        assert_eq!(parse_checksum(b"256"), None);
        assert_eq!(parse_checksum(b"7"), None);
        assert_eq!(parse_checksum(b"0070"), None);
        assert_eq!(parse_checksum(b"1a3"), None);
        assert_eq!(parse_checksum(b"-12"), None);
    }
}
