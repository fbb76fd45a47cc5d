/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Core
//!
//! Core types and error definitions shared by every FixGate crate.
//!
//! - **Error types**: Unified error handling with `thiserror`
//! - **Fields**: `FieldRef` and the session-level tag numbers
//! - **Messages**: `MsgType`, the zero-copy `RawMessage` view and `OwnedMessage`
//! - **Values**: `SeqNum`, `Timestamp`, `CompId`

pub mod error;
pub mod field;
pub mod message;
pub mod types;

pub use error::{DecodeError, EncodeError, FixError, Result, SessionError};
pub use field::{FieldRef, tags};
pub use message::{MsgType, OwnedMessage, RawMessage};
pub use types::{CompId, SeqNum, Timestamp};
