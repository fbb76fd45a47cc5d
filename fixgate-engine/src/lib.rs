/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Engine
//!
//! Acceptor and initiator built on the FixGate session layer.
//!
//! This crate provides:
//! - **Acceptor**: listens for connections and runs one session per socket
//! - **Initiator**: connects to a counterparty and runs its session
//! - **Session**: the per-connection read loop and outbound path
//! - **Application trait**: callbacks for session events and messages
//! - **Builder API**: fluent configuration for either side

pub mod acceptor;
pub mod builder;
pub mod handler;
pub mod initiator;
pub mod session;

pub use acceptor::{Acceptor, ShutdownHandle};
pub use builder::EngineBuilder;
pub use handler::{Application, ConnectionRefused, NoOpApplication, SessionHandler};
pub use initiator::Initiator;
pub use session::Session;
