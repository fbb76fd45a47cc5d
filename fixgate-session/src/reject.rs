/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Reasons a session is ended with a Logout.

use std::fmt;

/// Protocol violation that ends a session.
///
/// The text is sent to the peer in the Logout (tag 58).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// First message was not a Logon.
    NotLoggedIn,
    /// MsgSeqNum did not match the expected value.
    InvalidSequenceNumber,
    /// TargetCompID does not name this side.
    InvalidTargetCompId,
    /// SenderCompID does not match the configured counterparty.
    InvalidSenderCompId,
    /// The application refused the Logon.
    InvalidLogon,
}

impl RejectReason {
    /// Returns the Logout text for this reason.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::NotLoggedIn => "not logged in",
            Self::InvalidSequenceNumber => "invalid sequence number",
            Self::InvalidTargetCompId => "invalid target comp id",
            Self::InvalidSenderCompId => "invalid sender comp id",
            Self::InvalidLogon => "invalid logon",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_texts() {
        assert_eq!(RejectReason::NotLoggedIn.text(), "not logged in");
        assert_eq!(
            RejectReason::InvalidSequenceNumber.to_string(),
            "invalid sequence number"
        );
        assert_eq!(RejectReason::InvalidLogon.text(), "invalid logon");
    }
}
