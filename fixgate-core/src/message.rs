/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Message types and views for FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: The session-level message types plus an opaque variant
//!   for application messages
//! - [`RawMessage`]: Zero-copy view into a decoded frame
//! - [`OwnedMessage`]: Owned copy for storage and cross-task transfer

use crate::error::DecodeError;
use crate::field::{FieldRef, tags};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;

/// FIX message type (tag 35).
///
/// Only the administrative types are interpreted by the session layer.
/// Application messages are carried as [`MsgType::Other`] and passed to the
/// handler unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0).
    #[default]
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Logon (A).
    Logon,
    /// Any application-level message type.
    Other(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            other => Self::Other(other.to_string()),
        })
    }
}

impl MsgType {
    /// Creates an application message type from its tag 35 value.
    #[must_use]
    pub fn other(value: impl Into<String>) -> Self {
        Self::Other(value.into())
    }

    /// Returns the tag 35 value of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-copy view into a decoded FIX frame.
///
/// Fields reference the frame buffer; nothing is copied during decoding.
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    buffer: &'a [u8],
    begin_string: Range<usize>,
    msg_type: MsgType,
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    /// Creates a new RawMessage from parsed components.
    ///
    /// # Arguments
    /// * `buffer` - The complete frame
    /// * `begin_string` - Range of the BeginString value inside `buffer`
    /// * `msg_type` - The parsed message type
    /// * `fields` - All fields in wire order, checksum excluded
    #[must_use]
    pub fn new(
        buffer: &'a [u8],
        begin_string: Range<usize>,
        msg_type: MsgType,
        fields: SmallVec<[FieldRef<'a>; 32]>,
    ) -> Self {
        Self {
            buffer,
            begin_string,
            msg_type,
            fields,
        }
    }

    /// Returns the complete frame.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns the BeginString value (e.g., "FIX.4.4").
    #[must_use]
    pub fn begin_string(&self) -> &'a str {
        std::str::from_utf8(&self.buffer[self.begin_string.clone()]).unwrap_or("")
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns the MsgSeqNum (tag 34).
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is missing or not an integer.
    pub fn seq_num(&self) -> Result<u64, DecodeError> {
        self.get_field_as(tags::MSG_SEQ_NUM)
    }

    /// Returns the SenderCompID (tag 49), or an empty string when absent.
    #[must_use]
    pub fn sender_comp_id(&self) -> &'a str {
        self.get_field_str(tags::SENDER_COMP_ID).unwrap_or("")
    }

    /// Returns the TargetCompID (tag 56), or an empty string when absent.
    #[must_use]
    pub fn target_comp_id(&self) -> &'a str {
        self.get_field_str(tags::TARGET_COMP_ID).unwrap_or("")
    }

    /// Returns an iterator over all fields.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef<'a>> {
        self.fields.iter()
    }

    /// Returns the number of fields in the message.
    #[inline]
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Gets the first field with the given tag.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldRef<'a>> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Gets a field value as a string.
    ///
    /// Returns `None` if the field is absent or not valid UTF-8.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&'a str> {
        self.get_field(tag).and_then(|f| f.as_str().ok())
    }

    /// Gets a field value parsed as the specified type.
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is not found or cannot be parsed.
    pub fn get_field_as<T: std::str::FromStr>(&self, tag: u32) -> Result<T, DecodeError> {
        self.get_field(tag)
            .ok_or(DecodeError::MissingRequiredField { tag })?
            .parse()
    }

    /// Returns the frame length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if the frame is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Copies this view into an [`OwnedMessage`].
    #[must_use]
    pub fn to_owned(&self) -> OwnedMessage {
        OwnedMessage::from_raw(self)
    }
}

/// Owned FIX message for storage and cross-task transfer.
#[derive(Debug, Clone)]
pub struct OwnedMessage {
    buffer: Bytes,
    msg_type: MsgType,
    field_offsets: Vec<(u32, Range<usize>)>,
}

impl OwnedMessage {
    /// Copies a [`RawMessage`] into an owned buffer.
    #[must_use]
    pub fn from_raw(raw: &RawMessage<'_>) -> Self {
        let buffer = Bytes::copy_from_slice(raw.buffer);
        let base = raw.buffer.as_ptr() as usize;
        let field_offsets = raw
            .fields
            .iter()
            .map(|f| {
                let start = f.value.as_ptr() as usize - base;
                (f.tag, start..start + f.value.len())
            })
            .collect();

        Self {
            buffer,
            msg_type: raw.msg_type.clone(),
            field_offsets,
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns the message bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Gets a field value by tag.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&[u8]> {
        self.field_offsets
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, range)| &self.buffer[range.clone()])
    }

    /// Gets a field value as a string.
    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&str> {
        self.get_field(tag)
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the MsgSeqNum (tag 34), if present and numeric.
    #[must_use]
    pub fn seq_num(&self) -> Option<u64> {
        self.get_field_str(tags::MSG_SEQ_NUM)
            .and_then(|s| s.parse().ok())
    }

    /// Returns the number of fields.
    #[inline]
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.field_offsets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields(buffer: &[u8]) -> SmallVec<[FieldRef<'_>; 32]> {
        // "8=FIX.4.4|35=A|34=7|49=CLIENT|56=SERVER|"
        let mut fields = SmallVec::new();
        fields.push(FieldRef::new(8, &buffer[2..9]));
        fields.push(FieldRef::new(35, &buffer[13..14]));
        fields.push(FieldRef::new(34, &buffer[18..19]));
        fields.push(FieldRef::new(49, &buffer[23..29]));
        fields.push(FieldRef::new(56, &buffer[33..39]));
        fields
    }

    #[test]
    fn test_msg_type_from_str() {
        assert_eq!("A".parse::<MsgType>().unwrap(), MsgType::Logon);
        assert_eq!("5".parse::<MsgType>().unwrap(), MsgType::Logout);
        assert_eq!("D".parse::<MsgType>().unwrap(), MsgType::other("D"));
    }

    #[test]
    fn test_msg_type_as_str() {
        assert_eq!(MsgType::Logon.as_str(), "A");
        assert_eq!(MsgType::Logout.as_str(), "5");
        assert_eq!(MsgType::other("i").as_str(), "i");
        assert!(MsgType::Logout.is_admin());
        assert!(!MsgType::other("i").is_admin());
    }

    #[test]
    fn test_raw_message_header_accessors() {
        let buffer = b"8=FIX.4.4\x0135=A\x0134=7\x0149=CLIENT\x0156=SERVER\x01";
        let raw = RawMessage::new(buffer, 2..9, MsgType::Logon, sample_fields(buffer));

        assert_eq!(raw.begin_string(), "FIX.4.4");
        assert_eq!(raw.seq_num().unwrap(), 7);
        assert_eq!(raw.sender_comp_id(), "CLIENT");
        assert_eq!(raw.target_comp_id(), "SERVER");
        assert!(raw.get_field_str(58).is_none());
    }

    #[test]
    fn test_raw_message_missing_seq_num() {
        let buffer = b"8=FIX.4.4\x0135=A\x01";
        let mut fields = SmallVec::new();
        fields.push(FieldRef::new(8, &buffer[2..9]));
        let raw = RawMessage::new(buffer, 2..9, MsgType::Logon, fields);
        assert_eq!(
            raw.seq_num().unwrap_err(),
            DecodeError::MissingRequiredField { tag: 34 }
        );
    }

    #[test]
    fn test_owned_message_field_access() {
        let buffer = b"8=FIX.4.4\x0135=A\x0134=7\x0149=CLIENT\x0156=SERVER\x01";
        let raw = RawMessage::new(buffer, 2..9, MsgType::Logon, sample_fields(buffer));
        let owned = raw.to_owned();

        assert_eq!(owned.msg_type(), &MsgType::Logon);
        assert_eq!(owned.get_field_str(49), Some("CLIENT"));
        assert_eq!(owned.seq_num(), Some(7));
        assert_eq!(owned.get_field_str(999), None);
        assert_eq!(owned.field_count(), 5);
    }
}
