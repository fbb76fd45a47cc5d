/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session states and roles.
//!
//! A session moves `Connected -> LoggedIn -> Terminated`, or straight from
//! `Connected` to `Terminated` when the logon fails. [`AtomicSessionState`]
//! holds the current state so that other tasks can read it while the read
//! loop drives the transitions.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Transport is up, no Logon accepted yet.
    Connected = 0,
    /// Logon exchanged; application messages flow.
    LoggedIn = 1,
    /// The read loop has ended.
    Terminated = 2,
}

impl SessionState {
    /// Returns true if application messages may flow.
    #[must_use]
    pub const fn is_logged_in(self) -> bool {
        matches!(self, Self::LoggedIn)
    }

    /// Returns true if the session has ended.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connected, Self::LoggedIn)
                | (Self::Connected, Self::Terminated)
                | (Self::LoggedIn, Self::Terminated)
        )
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connected,
            1 => Self::LoggedIn,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::LoggedIn => "logged in",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Which side of the connection a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Server side: waits for the peer's Logon and acknowledges it.
    Acceptor,
    /// Client side: sends the Logon and waits for the acknowledgment.
    Initiator,
}

impl SessionRole {
    /// Returns true if this side answers a valid Logon with its own.
    #[must_use]
    pub const fn acknowledges_logon(self) -> bool {
        matches!(self, Self::Acceptor)
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acceptor => f.write_str("acceptor"),
            Self::Initiator => f.write_str("initiator"),
        }
    }
}

/// [`SessionState`] shared between tasks.
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    /// Creates a holder in `state`.
    #[must_use]
    pub const fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Returns the current state.
    #[must_use]
    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if the transition is allowed.
    ///
    /// Returns the state that was replaced, or `None` if the transition was
    /// refused.
    pub fn transition(&self, next: SessionState) -> Option<SessionState> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                SessionState::from_u8(current)
                    .can_transition_to(next)
                    .then_some(next as u8)
            })
            .ok()
            .map(SessionState::from_u8)
    }
}

impl Default for AtomicSessionState {
    fn default() -> Self {
        Self::new(SessionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use SessionState::*;
        assert!(Connected.can_transition_to(LoggedIn));
        assert!(Connected.can_transition_to(Terminated));
        assert!(LoggedIn.can_transition_to(Terminated));
        assert!(!LoggedIn.can_transition_to(Connected));
        assert!(!Terminated.can_transition_to(LoggedIn));
        assert!(!LoggedIn.can_transition_to(LoggedIn));
    }

    #[test]
    fn test_atomic_state_transitions() {
        let state = AtomicSessionState::default();
        assert_eq!(state.load(), SessionState::Connected);

        assert_eq!(
            state.transition(SessionState::LoggedIn),
            Some(SessionState::Connected)
        );
        assert!(state.load().is_logged_in());

        assert_eq!(
            state.transition(SessionState::Terminated),
            Some(SessionState::LoggedIn)
        );
        assert_eq!(state.transition(SessionState::Terminated), None);
        assert!(state.load().is_terminated());
    }

    #[test]
    fn test_role_acknowledges_logon() {
        assert!(SessionRole::Acceptor.acknowledges_logon());
        assert!(!SessionRole::Initiator.acknowledges_logon());
        assert_eq!(SessionRole::Initiator.to_string(), "initiator");
    }
}
