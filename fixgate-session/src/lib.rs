/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Session
//!
//! Session-layer building blocks used by the engine.
//!
//! - **Configuration**: identities, wildcard target resolution, header assembly
//! - **Sequence management**: atomic inbound and outbound counters
//! - **State**: session states and roles
//! - **Rejects**: Logout reasons for protocol violations
//! - **Messages**: Logon and Logout bodies

pub mod config;
pub mod messages;
pub mod reject;
pub mod sequence;
pub mod state;

pub use config::{SessionConfig, SessionConfigBuilder, WILDCARD_COMP_ID};
pub use reject::RejectReason;
pub use sequence::{SequenceManager, SequenceResult};
pub use state::{AtomicSessionState, SessionRole, SessionState};
