/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Transport
//!
//! I/O substrate for FIX sessions.
//!
//! - **Poller**: `mio`-based readiness multiplexer dispatching per-socket callbacks
//! - **Parker**: single-permit park/unpark signal bridging readiness to tasks
//! - **Streams**: non-blocking sockets whose would-block paths park the task
//! - **Codec**: FIX message framing and the buffered `MessageReader`

pub mod codec;
pub mod parker;
pub mod poller;
pub mod reader;
pub mod stream;
pub mod transport;

pub use codec::{CodecError, FixCodec};
pub use parker::Parker;
pub use poller::{Poller, PollerError, Readiness};
pub use reader::MessageReader;
pub use stream::{SocketReader, SocketStream, SocketWriter};
pub use transport::{Link, TokioReader, TokioWriter, TransportRead, TransportWrite};
