/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Application callback interface.
//!
//! [`SessionHandler`] receives the events of one session. [`Application`]
//! extends it with the connection-level hooks used by the acceptor and the
//! initiator. Every method has a default, so an application only overrides
//! what it needs.

use crate::session::Session;
use async_trait::async_trait;
use fixgate_core::message::RawMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Returned by [`Application::on_connect_request`] to refuse a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection refused: {reason}")]
pub struct ConnectionRefused {
    /// Why the connection was refused.
    pub reason: String,
}

impl ConnectionRefused {
    /// Creates a refusal with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Per-session callbacks.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Called for every accepted inbound message, Logon included.
    async fn on_message(&self, session: &Arc<Session>, message: &RawMessage<'_>) {
        let _ = (session, message);
    }

    /// Decides whether a Logon that passed the protocol checks is accepted.
    async fn validate_logon(&self, session: &Arc<Session>, logon: &RawMessage<'_>) -> bool {
        let _ = (session, logon);
        true
    }

    /// Called once the session is logged in.
    async fn on_logged_on(&self, session: &Arc<Session>) {
        let _ = session;
    }

    /// Called when the peer sends a Logout, with its Text (58).
    async fn on_logged_out(&self, session: &Arc<Session>, text: &str) {
        let _ = (session, text);
    }

    /// Called exactly once when the session's read loop ends, for any reason.
    ///
    /// Runs from a drop guard, so it must not block.
    fn on_disconnected(&self, session: &Arc<Session>) {
        let _ = session;
    }
}

/// Application hooks for acceptors and initiators.
#[async_trait]
pub trait Application: SessionHandler + 'static {
    /// Called by the acceptor before a session is created for `remote`.
    ///
    /// # Errors
    /// Return [`ConnectionRefused`] to close the connection without a Logout.
    fn on_connect_request(&self, remote: SocketAddr) -> Result<(), ConnectionRefused> {
        let _ = remote;
        Ok(())
    }

    /// Called by the initiator once connected; the usual place to send the Logon.
    async fn on_connected(&self, session: &Arc<Session>) {
        let _ = session;
    }
}

/// Application that accepts everything and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpApplication;

impl SessionHandler for NoOpApplication {}

impl Application for NoOpApplication {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_refused_display() {
        let refused = ConnectionRefused::new("blocked");
        assert_eq!(refused.to_string(), "connection refused: blocked");
    }

    #[test]
    fn test_noop_application_accepts_connections() {
        let app = NoOpApplication;
        let remote: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert!(app.on_connect_request(remote).is_ok());
    }
}
