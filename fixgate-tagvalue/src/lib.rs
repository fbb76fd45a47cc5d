/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Tag-Value
//!
//! FIX tag=value encoding and decoding.
//!
//! - **Zero-copy parsing**: decoded field values borrow from the frame
//! - **Reusable encoder**: one `Encoder` assembles every outbound message of a session
//! - **Checksum**: computed on encode, verified on decode

pub mod checksum;
pub mod decoder;
pub mod encoder;

pub use checksum::calculate_checksum;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use fixgate_core::message::RawMessage;
