/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! FIX message framing.
//!
//! [`FixCodec`] cuts complete messages out of a byte stream using the
//! BodyLength field, and verifies the trailing CheckSum. It implements
//! [`tokio_util::codec::Decoder`], so it can be used with `FramedRead` as
//! well as by [`crate::reader::MessageReader`].

use bytes::BytesMut;
use fixgate_core::error::{DecodeError, FixError};
use fixgate_core::field::tags;
use fixgate_tagvalue::checksum::{calculate_checksum, parse_checksum};
use memchr::memchr;
use thiserror::Error;
use tokio_util::codec::Decoder;

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Length of the `10=NNN<SOH>` trailer.
const TRAILER_LEN: usize = 7;

/// Shortest prefix that can hold `8=x<SOH>9=n<SOH>`.
const MIN_HEADER_LEN: usize = 8;

const SOH: u8 = 0x01;

/// Errors that can occur while framing a stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The stream does not start with `8=`.
    #[error("invalid begin string: message must start with 8=")]
    InvalidBeginString,

    /// The second field is not BodyLength.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength is not a decimal number.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// The bytes after the body are not a CheckSum field.
    #[error("missing checksum field (tag 10)")]
    MissingChecksum,

    /// CheckSum is not three decimal digits.
    #[error("invalid checksum value")]
    InvalidChecksum,

    /// Checksum mismatch.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum.
        calculated: u8,
        /// Declared checksum in message.
        declared: u8,
    },

    /// Message exceeds maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(String),
}

impl CodecError {
    /// Returns true if the error came from the transport, not the data.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CodecError> for FixError {
    fn from(err: CodecError) -> Self {
        let decode = match err {
            CodecError::InvalidBeginString => DecodeError::InvalidBeginString,
            CodecError::MissingBodyLength => DecodeError::MissingBodyLength,
            CodecError::InvalidBodyLength => DecodeError::InvalidBodyLength,
            CodecError::MissingChecksum => DecodeError::MissingRequiredField {
                tag: tags::CHECKSUM,
            },
            CodecError::InvalidChecksum => DecodeError::InvalidFieldValue {
                tag: tags::CHECKSUM,
                reason: "expected three digits".to_string(),
            },
            CodecError::ChecksumMismatch {
                calculated,
                declared,
            } => DecodeError::ChecksumMismatch {
                calculated,
                declared,
            },
            CodecError::MessageTooLarge { size, max_size } => {
                DecodeError::MessageTooLarge { size, max_size }
            }
            CodecError::Io(reason) => return Self::Io(std::io::Error::other(reason)),
        };
        Self::Decode(decode)
    }
}

/// Stream framer for FIX tag=value messages.
#[derive(Debug, Clone)]
pub struct FixCodec {
    max_message_size: usize,
    validate_checksum: bool,
}

impl FixCodec {
    /// Creates a codec with a 1 MiB frame limit and checksum validation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            validate_checksum: true,
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether to validate checksums.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Returns the length of the frame at the start of `src`, or `None` if
    /// more bytes are needed.
    fn frame_len(&self, src: &[u8]) -> Result<Option<usize>, CodecError> {
        if src.len() >= 2 && &src[..2] != b"8=" {
            return Err(CodecError::InvalidBeginString);
        }
        if src.len() < MIN_HEADER_LEN {
            return Ok(None);
        }

        let Some(first_soh) = memchr(SOH, src) else {
            return self.check_partial(src.len()).map(|()| None);
        };

        let body_len_start = first_soh + 1;
        let tag_end = body_len_start + 2;
        if src.len() < tag_end {
            return Ok(None);
        }
        if &src[body_len_start..tag_end] != b"9=" {
            return Err(CodecError::MissingBodyLength);
        }

        let Some(len_soh) = memchr(SOH, &src[tag_end..]).map(|pos| tag_end + pos) else {
            return self.check_partial(src.len()).map(|()| None);
        };

        let digits = &src[tag_end..len_soh];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(CodecError::InvalidBodyLength);
        }
        let body_length: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::InvalidBodyLength)?;

        let total = (len_soh + 1)
            .checked_add(body_length)
            .and_then(|n| n.checked_add(TRAILER_LEN))
            .ok_or(CodecError::InvalidBodyLength)?;
        if total > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: total,
                max_size: self.max_message_size,
            });
        }

        Ok((src.len() >= total).then_some(total))
    }

    fn check_partial(&self, buffered: usize) -> Result<(), CodecError> {
        if buffered > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: buffered,
                max_size: self.max_message_size,
            });
        }
        Ok(())
    }

    fn verify_trailer(&self, frame: &[u8]) -> Result<(), CodecError> {
        let trailer_start = frame.len() - TRAILER_LEN;
        let trailer = &frame[trailer_start..];
        if &trailer[..3] != b"10=" || trailer[TRAILER_LEN - 1] != SOH {
            return Err(CodecError::MissingChecksum);
        }
        if !self.validate_checksum {
            return Ok(());
        }

        let declared = parse_checksum(&trailer[3..6]).ok_or(CodecError::InvalidChecksum)?;
        let calculated = calculate_checksum(&frame[..trailer_start]);
        if calculated != declared {
            return Err(CodecError::ChecksumMismatch {
                calculated,
                declared,
            });
        }
        Ok(())
    }
}

impl Default for FixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FixCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(total) = self.frame_len(src)? else {
            return Ok(None);
        };

        self.verify_trailer(&src[..total])?;
        Ok(Some(src.split_to(total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_tagvalue::Encoder;

    fn heartbeat() -> BytesMut {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0").put_str(49, "A").put_str(56, "B");
        encoder.finish()
    }

    #[test]
    fn test_decode_complete_message() {
        let mut codec = FixCodec::new();
        let msg = heartbeat();
        let mut buf = msg.clone();

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_messages_in_one_buffer() {
        let mut codec = FixCodec::new();
        let mut buf = heartbeat();
        buf.extend_from_slice(&heartbeat());

        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let mut codec = FixCodec::new();
        let msg = heartbeat();
        let mut buf = BytesMut::new();

        for (i, byte) in msg.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < msg.len() {
                assert!(decoded.is_none(), "frame emitted early at byte {i}");
            } else {
                assert_eq!(decoded.unwrap(), msg);
            }
        }
    }

    #[test]
    fn test_decode_invalid_begin_string() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"9=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap_err(),
            CodecError::InvalidBeginString
        );
    }

    #[test]
    fn test_decode_invalid_body_length() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5x\x0135=0\x0110=000\x01"[..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap_err(),
            CodecError::InvalidBodyLength
        );
    }

    #[test]
    fn test_decode_body_length_points_past_trailer() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=3\x0135=0\x0110=163\x01xx"[..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap_err(),
            CodecError::MissingChecksum
        );
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        assert_eq!(
            codec.decode(&mut buf).unwrap_err(),
            CodecError::ChecksumMismatch {
                calculated: 163,
                declared: 0
            }
        );
    }

    #[test]
    fn test_decode_no_checksum_validation() {
        let mut codec = FixCodec::new().with_checksum_validation(false);
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_decode_message_too_large() {
        let mut codec = FixCodec::new().with_max_message_size(16);
        let mut buf = heartbeat();

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { max_size: 16, .. })
        ));
    }

    #[test]
    fn test_codec_error_into_fix_error() {
        let err: FixError = CodecError::InvalidBodyLength.into();
        assert!(matches!(err, FixError::Decode(DecodeError::InvalidBodyLength)));

        let err: FixError = CodecError::Io("reset".to_string()).into();
        assert!(matches!(err, FixError::Io(_)));
    }
}
