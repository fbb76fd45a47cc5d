/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! One builder assembles either side: [`EngineBuilder::build_acceptor`] for a
//! server listening on a port, [`EngineBuilder::build_initiator`] for a client
//! connecting to a remote address.

use crate::acceptor::Acceptor;
use crate::handler::{Application, NoOpApplication};
use crate::initiator::Initiator;
use fixgate_core::error::{Result, SessionError};
use fixgate_session::SessionConfig;
use fixgate_transport::Poller;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 9880;

/// Default number of acceptor worker tasks.
pub const DEFAULT_WORKERS: usize = 4;

/// Default time the acceptor waits for sessions to end on shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for configuring a FIX engine.
#[derive(Debug)]
pub struct EngineBuilder<A: Application = NoOpApplication> {
    /// Application callback handler.
    application: Arc<A>,
    /// Session configuration.
    session: Option<SessionConfig>,
    /// Acceptor listen address.
    bind_addr: SocketAddr,
    /// Initiator remote address, `host:port`.
    remote_addr: Option<String>,
    /// Acceptor worker count.
    workers: usize,
    /// Acceptor shutdown drain timeout.
    drain_timeout: Duration,
    /// Poller driving the initiator socket.
    poller: Option<Arc<Poller>>,
}

impl Default for EngineBuilder<NoOpApplication> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<NoOpApplication> {
    /// Creates a new engine builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            application: Arc::new(NoOpApplication),
            session: None,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            remote_addr: None,
            workers: DEFAULT_WORKERS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            poller: None,
        }
    }
}

impl<A: Application> EngineBuilder<A> {
    /// Sets the application callback handler.
    #[must_use]
    pub fn with_application<B: Application>(self, application: B) -> EngineBuilder<B> {
        EngineBuilder {
            application: Arc::new(application),
            session: self.session,
            bind_addr: self.bind_addr,
            remote_addr: self.remote_addr,
            workers: self.workers,
            drain_timeout: self.drain_timeout,
            poller: self.poller,
        }
    }

    /// Sets the session configuration.
    #[must_use]
    pub fn with_session(mut self, config: SessionConfig) -> Self {
        self.session = Some(config);
        self
    }

    /// Listens on `port` on every IPv4 interface.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        self
    }

    /// Sets the exact listen address.
    #[must_use]
    pub const fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the counterparty address for an initiator.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Sets the number of acceptor worker tasks (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets how long shutdown waits for sessions before aborting them.
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Drives the initiator socket with `poller` instead of tokio's reactor.
    ///
    /// The caller runs the poller, typically with
    /// `tokio::task::spawn_blocking(move || poller.run())`.
    #[must_use]
    pub fn with_poller(mut self, poller: Arc<Poller>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn session(&self) -> Option<&SessionConfig> {
        self.session.as_ref()
    }

    /// Returns the listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Returns the worker count.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the drain timeout.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Returns the application handler.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.application)
    }

    /// Builds an acceptor with its own poller.
    ///
    /// # Errors
    /// Returns an error if no session is configured or the poller cannot be
    /// created.
    pub fn build_acceptor(self) -> Result<Acceptor<A>> {
        let config = self
            .session
            .ok_or_else(|| SessionError::Configuration("session not configured".to_string()))?;
        let poller = Arc::new(Poller::new()?);
        Ok(Acceptor::new(
            self.application,
            config,
            self.bind_addr,
            self.workers,
            self.drain_timeout,
            poller,
        ))
    }

    /// Builds an initiator.
    ///
    /// # Errors
    /// Returns an error if the session or the remote address is missing.
    pub fn build_initiator(self) -> Result<Initiator<A>> {
        let config = self
            .session
            .ok_or_else(|| SessionError::Configuration("session not configured".to_string()))?;
        let remote = self
            .remote_addr
            .ok_or_else(|| SessionError::Configuration("remote address not set".to_string()))?;
        Ok(Initiator::new(self.application, config, remote, self.poller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::FixError;
    use fixgate_core::types::CompId;

    fn config() -> SessionConfig {
        SessionConfig::new(
            CompId::new("SENDER").unwrap(),
            CompId::new("TARGET").unwrap(),
            "FIX.4.4",
        )
    }

    #[test]
    fn test_engine_builder_default() {
        let builder = EngineBuilder::new();
        assert_eq!(builder.workers(), DEFAULT_WORKERS);
        assert_eq!(builder.drain_timeout(), Duration::from_secs(5));
        assert_eq!(builder.bind_addr().port(), DEFAULT_PORT);
        assert!(builder.session().is_none());
    }

    #[test]
    fn test_engine_builder_with_session() {
        let builder = EngineBuilder::new()
            .with_session(config())
            .with_port(7001)
            .with_workers(0)
            .with_drain_timeout(Duration::from_millis(250));

        assert_eq!(builder.session().map(SessionConfig::id).as_deref(), Some("SENDER:TARGET"));
        assert_eq!(builder.bind_addr(), "0.0.0.0:7001".parse().unwrap());
        assert_eq!(builder.workers(), 1);
        assert_eq!(builder.drain_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_build_requires_session() {
        let err = EngineBuilder::new().build_acceptor().unwrap_err();
        assert!(matches!(
            err,
            FixError::Session(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_initiator_requires_remote() {
        let err = EngineBuilder::new()
            .with_session(config())
            .build_initiator()
            .unwrap_err();
        assert!(matches!(
            err,
            FixError::Session(SessionError::Configuration(_))
        ));

        let initiator = EngineBuilder::new()
            .with_session(config())
            .with_remote_addr("127.0.0.1:9880")
            .build_initiator()
            .unwrap();
        assert!(!initiator.is_connected());
    }
}
