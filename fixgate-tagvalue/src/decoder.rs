/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Zero-copy FIX message decoder.
//!
//! The decoder walks one complete frame (as produced by the framing codec)
//! and returns a [`RawMessage`] whose fields borrow from that frame.

use crate::checksum::{calculate_checksum, parse_checksum};
use fixgate_core::error::DecodeError;
use fixgate_core::field::{FieldRef, tags};
use fixgate_core::message::{MsgType, RawMessage};
use memchr::memchr;
use smallvec::SmallVec;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Zero-copy FIX message decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
    validate_checksum: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a new decoder for the given input buffer.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Decodes one complete FIX message starting at the current offset.
    ///
    /// The header must start with BeginString (8), BodyLength (9) and
    /// MsgType (35), in that order. Fields are collected up to the CheckSum
    /// (10) field, which is verified unless validation was disabled.
    ///
    /// # Errors
    /// Returns `DecodeError` if the message is malformed or incomplete.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        let begin_string_field = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string_field.tag != tags::BEGIN_STRING || begin_string_field.value.is_empty() {
            return Err(DecodeError::InvalidBeginString);
        }
        let begin_string_start = self.offset_of(begin_string_field.value);
        let begin_string =
            begin_string_start..begin_string_start + begin_string_field.value.len();

        let body_length_field = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length_field.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        body_length_field
            .as_str()?
            .parse::<usize>()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE || msg_type_field.value.is_empty() {
            return Err(DecodeError::MissingMsgType);
        }
        let Ok(msg_type) = msg_type_field.as_str()?.parse::<MsgType>();

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string_field);
        fields.push(body_length_field);
        fields.push(msg_type_field);

        let mut checksum_field: Option<FieldRef<'a>> = None;
        while let Some(field) = self.next_field() {
            if field.tag == tags::CHECKSUM {
                checksum_field = Some(field);
                break;
            }
            fields.push(field);
        }

        if self.validate_checksum {
            let checksum_ref = checksum_field.ok_or(DecodeError::Incomplete)?;
            let declared =
                parse_checksum(checksum_ref.value).ok_or_else(|| DecodeError::InvalidFieldValue {
                    tag: tags::CHECKSUM,
                    reason: "invalid checksum format".to_string(),
                })?;

            // "10=" precedes the value
            let checksum_start = self.offset_of(checksum_ref.value) - 3;
            let calculated = calculate_checksum(&self.input[start_offset..checksum_start]);

            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        let frame = &self.input[start_offset..self.offset];
        let begin_string = begin_string.start - start_offset..begin_string.end - start_offset;
        Ok(RawMessage::new(frame, begin_string, msg_type, fields))
    }

    /// Parses the next field from the buffer.
    ///
    /// Returns `None` when the buffer is exhausted or the remaining bytes do
    /// not form a complete `tag=value<SOH>` field.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        if self.offset >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.offset..];

        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;

        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])?;
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;

        Some(FieldRef::new(tag, value))
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the remaining bytes in the buffer.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.offset..]
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }

    #[inline]
    fn offset_of(&self, value: &[u8]) -> usize {
        value.as_ptr() as usize - self.input.as_ptr() as usize
    }
}

/// Parses a tag number from ASCII bytes.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag(b"8"), Some(8));
        assert_eq!(parse_tag(b"35"), Some(35));
        assert_eq!(parse_tag(b"12345"), Some(12345));
        assert_eq!(parse_tag(b""), None);
        assert_eq!(parse_tag(b"abc"), None);
        assert_eq!(parse_tag(b"12a"), None);
    }

    #[test]
    fn test_next_field() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x01";
        let mut decoder = Decoder::new(input);

        let field1 = decoder.next_field().unwrap();
        assert_eq!(field1.tag, 8);
        assert_eq!(field1.as_str().unwrap(), "FIX.4.4");

        let field2 = decoder.next_field().unwrap();
        assert_eq!(field2.tag, 9);

        let field3 = decoder.next_field().unwrap();
        assert_eq!(field3.tag, 35);
        assert_eq!(field3.as_str().unwrap(), "0");

        assert!(decoder.next_field().is_none());
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_logon() {
        let mut encoder = Encoder::new("FIX.4.2");
        encoder
            .put_str(35, "A")
            .put_str(49, "client")
            .put_str(56, "server")
            .put_uint(34, 1)
            .put_uint(98, 0)
            .put_uint(108, 30);
        let frame = encoder.finish();

        let mut decoder = Decoder::new(&frame);
        let msg = decoder.decode().unwrap();

        assert_eq!(msg.begin_string(), "FIX.4.2");
        assert_eq!(msg.msg_type(), &MsgType::Logon);
        assert_eq!(msg.seq_num().unwrap(), 1);
        assert_eq!(msg.sender_comp_id(), "client");
        assert_eq!(msg.target_comp_id(), "server");
        assert_eq!(msg.get_field_as::<u32>(108).unwrap(), 30);
        assert_eq!(msg.len(), frame.len());
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_decode_application_type() {
        let mut encoder = Encoder::default();
        encoder.put_str(35, "i").put_str(117, "Q1");
        let frame = encoder.finish();

        let msg = Decoder::new(&frame).decode().unwrap();
        assert_eq!(msg.msg_type(), &MsgType::other("i"));
        assert_eq!(msg.get_field_str(117), Some("Q1"));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let input = b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01";
        let err = Decoder::new(input).decode().unwrap_err();
        assert_eq!(
            err,
            DecodeError::ChecksumMismatch {
                calculated: 163,
                declared: 0
            }
        );

        let msg = Decoder::new(input)
            .with_checksum_validation(false)
            .decode()
            .unwrap();
        assert_eq!(msg.msg_type(), &MsgType::Heartbeat);
    }

    #[test]
    fn test_decode_header_order() {
        let input = b"9=5\x018=FIX.4.4\x0135=0\x0110=163\x01";
        assert_eq!(
            Decoder::new(input).decode().unwrap_err(),
            DecodeError::InvalidBeginString
        );

        let input = b"8=FIX.4.4\x0135=0\x0110=163\x01";
        assert_eq!(
            Decoder::new(input).decode().unwrap_err(),
            DecodeError::MissingBodyLength
        );

        let input = b"8=FIX.4.4\x019=5\x0134=1\x0110=163\x01";
        assert_eq!(
            Decoder::new(input).decode().unwrap_err(),
            DecodeError::MissingMsgType
        );
    }

    #[test]
    fn test_decoder_incomplete() {
        let mut decoder = Decoder::new(b"8=FIX.4.4");
        assert!(decoder.next_field().is_none());
        assert_eq!(
            Decoder::new(b"").decode().unwrap_err(),
            DecodeError::Incomplete
        );
    }
}
