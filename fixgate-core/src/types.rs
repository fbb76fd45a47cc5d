/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Header values the session stamps on every message: the MsgSeqNum counter,
//! the SendingTime clock reading and the two party identifiers.

use arrayvec::ArrayString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest SenderCompID or TargetCompID a session accepts, in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// Length of `YYYYMMDD-HH:MM:SS.sss`.
const SENDING_TIME_LEN: usize = 21;

/// Value of a MsgSeqNum (tag 34). Zero is never sent or expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(u64);

impl SeqNum {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// True for any number a session may start counting from.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Clock reading written as SendingTime (tag 52).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Milliseconds after the Unix epoch. Out-of-range input clamps to the epoch.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        let at = i64::try_from(millis)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self(at)
    }

    /// `YYYYMMDD-HH:MM:SS.sss`, always in UTC.
    #[must_use]
    pub fn format_millis(self) -> ArrayString<SENDING_TIME_LEN> {
        let mut out = ArrayString::new();
        // The rendering is fixed-width and fits exactly.
        let _ = fmt::write(&mut out, format_args!("{}", self.0.format("%Y%m%d-%H:%M:%S%.3f")));
        out
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_millis())
    }
}

/// SenderCompID (tag 49) or TargetCompID (tag 56), stored inline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// `None` when `id` exceeds [`COMP_ID_MAX_LEN`] bytes.
    #[must_use]
    pub fn new(id: &str) -> Option<Self> {
        ArrayString::from(id).ok().map(Self)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for CompId {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}
