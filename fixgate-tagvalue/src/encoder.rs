/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! FIX message encoder.
//!
//! An [`Encoder`] plays two parts. Applications use one as a body builder:
//! they append their fields and hand it to the session. The session keeps its
//! own encoder for assembly: it writes the header, drains the caller's body
//! into it with [`Encoder::append`], and [`Encoder::finish`] frames the result
//! with BeginString, BodyLength and CheckSum. Both stay reusable afterwards.

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, BytesMut};

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Default BeginString used by [`Encoder::default`].
pub const DEFAULT_BEGIN_STRING: &str = "FIX.4.4";

/// FIX message encoder.
///
/// Fields are appended in tag=value format. BeginString, BodyLength and
/// Checksum are added by [`Encoder::finish`].
#[derive(Debug, Clone)]
pub struct Encoder {
    /// Buffer for the message body (between BodyLength and Checksum).
    body: BytesMut,
    /// The BeginString value (e.g., "FIX.4.4").
    begin_string: String,
}

impl Encoder {
    /// Creates a new encoder with the specified BeginString.
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self::with_capacity(begin_string, 256)
    }

    /// Creates a new encoder with pre-allocated capacity.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string
    /// * `capacity` - Initial buffer capacity in bytes
    #[must_use]
    pub fn with_capacity(begin_string: impl Into<String>, capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
            begin_string: begin_string.into(),
        }
    }

    /// Returns the BeginString written by [`Encoder::finish`].
    #[inline]
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Appends a field with a string value.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) -> &mut Self {
        self.put_raw(tag, value.as_bytes())
    }

    /// Appends a field with a signed integer value.
    #[inline]
    pub fn put_int(&mut self, tag: u32, value: i64) -> &mut Self {
        let mut buf = itoa::Buffer::new();
        let s = buf.format(value);
        self.put_raw(tag, s.as_bytes())
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) -> &mut Self {
        let mut buf = itoa::Buffer::new();
        let s = buf.format(value);
        self.put_raw(tag, s.as_bytes())
    }

    /// Appends a field with a boolean value (Y/N).
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) -> &mut Self {
        self.put_raw(tag, if value { b"Y" } else { b"N" })
    }

    /// Appends a field with a single character value.
    #[inline]
    pub fn put_char(&mut self, tag: u32, value: char) -> &mut Self {
        let mut buf = [0u8; 4];
        let s = value.encode_utf8(&mut buf);
        self.put_raw(tag, s.as_bytes())
    }

    /// Appends a field with raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) -> &mut Self {
        let mut tag_buf = itoa::Buffer::new();
        let tag_str = tag_buf.format(tag);

        self.body.reserve(tag_str.len() + value.len() + 2);
        self.body.put_slice(tag_str.as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
        self
    }

    /// Moves every field of `other` to the end of this encoder.
    ///
    /// `other` is left empty.
    pub fn append(&mut self, other: &mut Encoder) -> &mut Self {
        self.body.extend_from_slice(&other.body);
        other.body.clear();
        self
    }

    /// Frames the accumulated fields into a complete message.
    ///
    /// Prepends BeginString (8) and BodyLength (9), appends CheckSum (10),
    /// and leaves the encoder empty for the next message.
    pub fn finish(&mut self) -> BytesMut {
        let body = self.body.split();
        let body_len = body.len();

        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(body_len);

        let mut message =
            BytesMut::with_capacity(self.begin_string.len() + len_str.len() + body_len + 14);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string.as_bytes());
        message.put_u8(SOH);
        message.put_slice(b"9=");
        message.put_slice(len_str.as_bytes());
        message.put_u8(SOH);
        message.put_slice(&body);

        let checksum = format_checksum(calculate_checksum(&message));
        message.put_slice(b"10=");
        message.put_slice(&checksum);
        message.put_u8(SOH);

        message
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if no field has been appended since the last reset.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Returns the raw body bytes.
    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Clears the encoder for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.body.clear();
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_BEGIN_STRING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::parse_checksum;

    #[test]
    fn test_encoder_basic() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");

        let message = encoder.finish();
        assert_eq!(&message[..], b"8=FIX.4.4\x019=5\x0135=0\x0110=163\x01");
    }

    #[test]
    fn test_encoder_checksum_covers_header() {
        let mut encoder = Encoder::new("FIX.4.2");
        encoder.put_str(35, "D").put_str(49, "SENDER").put_uint(34, 1);

        let message = encoder.finish();
        let trailer_start = message.len() - 7;
        assert_eq!(&message[trailer_start..trailer_start + 3], b"10=");
        let declared = parse_checksum(&message[trailer_start + 3..trailer_start + 6]);
        assert_eq!(declared, Some(calculate_checksum(&message[..trailer_start])));
    }

    #[test]
    fn test_encoder_typed_fields() {
        let mut encoder = Encoder::default();
        encoder
            .put_bool(141, true)
            .put_bool(142, false)
            .put_char(54, '1')
            .put_int(44, -5);

        assert_eq!(encoder.body(), b"141=Y\x01142=N\x0154=1\x0144=-5\x01");
    }

    #[test]
    fn test_encoder_finish_resets_for_reuse() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");
        let first = encoder.finish();
        assert!(encoder.is_empty());

        encoder.put_str(35, "0");
        let second = encoder.finish();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encoder_append_drains_other() {
        let mut header = Encoder::new("FIX.4.4");
        header.put_str(35, "i");

        let mut body = Encoder::default();
        body.put_str(117, "Q1");
        header.append(&mut body);

        assert!(body.is_empty());
        assert_eq!(header.body(), b"35=i\x01117=Q1\x01");
    }

    #[test]
    fn test_encoder_clear() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");
        assert!(encoder.body_len() > 0);

        encoder.clear();
        assert_eq!(encoder.body_len(), 0);
        assert_eq!(encoder.begin_string(), "FIX.4.4");
    }
}
