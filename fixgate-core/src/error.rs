/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Error types for the FixGate session engine.
//!
//! Every crate in the workspace reports failures through the [`FixError`]
//! hierarchy. Protocol rejections of a single session are not errors at this
//! level: they are answered with a Logout and end that session only.

use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all FixGate operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error while framing or decoding an inbound message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error while assembling an outbound message.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// I/O error from the underlying socket or multiplexer.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while framing and decoding FIX messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },
}

/// Errors that occur while assembling outbound messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A header field value does not fit the protocol limits.
    #[error("invalid header value for tag {tag}: {reason}")]
    InvalidHeader {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No logged-on session is registered under the identity.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The session is not connected, or has already terminated.
    #[error("session not connected")]
    NotConnected,

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection setup error (bind, listen, connect).
    #[error("connection error: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
    }

    #[test]
    fn test_fix_error_from_session() {
        let fix_err: FixError = SessionError::NotConnected.into();
        assert!(matches!(fix_err, FixError::Session(SessionError::NotConnected)));
        assert_eq!(fix_err.to_string(), "session error: session not connected");
    }

    #[test]
    fn test_fix_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let fix_err: FixError = io.into();
        assert!(matches!(fix_err, FixError::Io(_)));
    }

    #[test]
    fn test_session_not_found_display() {
        let err = SessionError::NotFound("server:client".to_string());
        assert_eq!(err.to_string(), "session not found: server:client");
    }
}
