/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Sequence number management.
//!
//! Each session owns one [`SequenceManager`]. The outbound counter is
//! consumed once per message header and the inbound counter advances once
//! per accepted message. Both are atomics, so senders on other tasks never
//! contend with the read loop.

use crate::config::SessionConfig;
use crate::reject::RejectReason;
use fixgate_core::types::SeqNum;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live sequence counters of a session.
#[derive(Debug)]
pub struct SequenceManager {
    next_sender_seq: AtomicU64,
    next_target_seq: AtomicU64,
}

impl SequenceManager {
    /// Creates counters starting at 1 in both directions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial(1, 1)
    }

    /// Creates counters with explicit starting values.
    #[must_use]
    pub fn with_initial(sender_seq: u64, target_seq: u64) -> Self {
        Self {
            next_sender_seq: AtomicU64::new(sender_seq),
            next_target_seq: AtomicU64::new(target_seq),
        }
    }

    /// Creates counters seeded from a session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::with_initial(config.next_seq_num, config.expected_seq_num)
    }

    /// Returns the sequence number the next outbound message will carry.
    #[inline]
    #[must_use]
    pub fn next_sender_seq(&self) -> SeqNum {
        SeqNum::new(self.next_sender_seq.load(Ordering::SeqCst))
    }

    /// Returns the sequence number expected on the next inbound message.
    #[inline]
    #[must_use]
    pub fn next_target_seq(&self) -> SeqNum {
        SeqNum::new(self.next_target_seq.load(Ordering::SeqCst))
    }

    /// Takes the next outbound sequence number.
    #[inline]
    pub fn allocate_sender_seq(&self) -> SeqNum {
        SeqNum::new(self.next_sender_seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Advances the inbound counter after a message was accepted.
    #[inline]
    pub fn increment_target_seq(&self) {
        self.next_target_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Compares an inbound sequence number with the expected one.
    #[must_use]
    pub fn validate_incoming(&self, received: u64) -> SequenceResult {
        let expected = self.next_target_seq.load(Ordering::SeqCst);

        match received.cmp(&expected) {
            std::cmp::Ordering::Equal => SequenceResult::Ok,
            std::cmp::Ordering::Less => SequenceResult::TooLow { expected, received },
            std::cmp::Ordering::Greater => SequenceResult::Gap { expected, received },
        }
    }
}

impl Default for SequenceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of an inbound sequence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    /// Sequence number is as expected.
    Ok,
    /// Lower than expected.
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Higher than expected.
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

impl SequenceResult {
    /// Returns true if the sequence is valid.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Converts a mismatch into the reject reason sent to the peer.
    ///
    /// Without message recovery both directions of mismatch end the session.
    ///
    /// # Errors
    /// Returns [`RejectReason::InvalidSequenceNumber`] for any mismatch.
    pub const fn into_result(self) -> Result<(), RejectReason> {
        match self {
            Self::Ok => Ok(()),
            Self::TooLow { .. } | Self::Gap { .. } => Err(RejectReason::InvalidSequenceNumber),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfigBuilder;

    #[test]
    fn test_sequence_manager_starts_at_one() {
        let mgr = SequenceManager::new();
        assert_eq!(mgr.next_sender_seq().value(), 1);
        assert_eq!(mgr.next_target_seq().value(), 1);
    }

    #[test]
    fn test_allocate_sender_seq() {
        let mgr = SequenceManager::new();

        assert_eq!(mgr.allocate_sender_seq().value(), 1);
        assert_eq!(mgr.allocate_sender_seq().value(), 2);
        assert_eq!(mgr.next_sender_seq().value(), 3);
    }

    #[test]
    fn test_validate_incoming() {
        let mgr = SequenceManager::with_initial(1, 5);

        assert!(mgr.validate_incoming(5).is_ok());
        assert_eq!(
            mgr.validate_incoming(4),
            SequenceResult::TooLow {
                expected: 5,
                received: 4
            }
        );
        assert_eq!(
            mgr.validate_incoming(10).into_result(),
            Err(RejectReason::InvalidSequenceNumber)
        );

        mgr.increment_target_seq();
        assert!(mgr.validate_incoming(6).is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = SessionConfigBuilder::new()
            .sender_comp_id("a")
            .target_comp_id("b")
            .next_seq_num(100)
            .expected_seq_num(200)
            .build()
            .unwrap();
        let mgr = SequenceManager::from_config(&config);

        assert_eq!(mgr.next_sender_seq().value(), 100);
        assert_eq!(mgr.next_target_seq().value(), 200);
    }
}
