/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Common utilities shared across examples.

#![allow(dead_code)]

use std::env;

/// Default server port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// MassQuote message type.
pub const MASS_QUOTE: &str = "i";

/// MassQuoteAcknowledgement message type.
pub const MASS_QUOTE_ACK: &str = "b";

/// Example configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ExampleConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Sender CompID.
    pub sender_comp_id: String,
    /// Target CompID.
    pub target_comp_id: String,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval: u64,
}

impl ExampleConfig {
    /// Creates a new configuration for a client.
    #[must_use]
    pub fn client() -> Self {
        Self::from_env("CLIENT", "SERVER")
    }

    /// Creates a new configuration for a server.
    ///
    /// The server accepts any counterparty unless `FIX_TARGET` is set.
    #[must_use]
    pub fn server() -> Self {
        Self::from_env("SERVER", fixgate_session::WILDCARD_COMP_ID)
    }

    fn from_env(sender: &str, target: &str) -> Self {
        Self {
            host: env::var("FIX_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("FIX_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            sender_comp_id: env::var("FIX_SENDER").unwrap_or_else(|_| sender.to_string()),
            target_comp_id: env::var("FIX_TARGET").unwrap_or_else(|_| target.to_string()),
            heartbeat_interval: 30,
        }
    }

    /// Returns the socket address string.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the session configuration.
    ///
    /// # Errors
    /// Returns an error if a CompID is empty or too long.
    pub fn session(&self) -> fixgate_core::Result<fixgate_session::SessionConfig> {
        Ok(fixgate_session::SessionConfigBuilder::new()
            .sender_comp_id(&self.sender_comp_id)
            .target_comp_id(&self.target_comp_id)
            .heartbeat_interval(std::time::Duration::from_secs(self.heartbeat_interval))
            .build()?)
    }
}

/// Initializes logging for examples.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}
