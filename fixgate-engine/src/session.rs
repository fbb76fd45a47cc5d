/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Per-connection session.
//!
//! A [`Session`] is created by the acceptor or the initiator for every
//! connection. Its read loop ([`Session::handle`]) runs on one task and
//! applies the session-layer checks to each inbound message in order:
//!
//! 1. before logon, only a Logon is accepted
//! 2. MsgSeqNum must equal the expected inbound sequence number
//! 3. TargetCompID must name this side
//! 4. SenderCompID must name the counterparty, or resolves a wildcard
//! 5. a Logout that passed the checks above ends the session without a reply
//! 6. a first Logon is offered to [`SessionHandler::validate_logon`]
//!
//! A failed check sends a Logout with the reason and ends the session.
//! Outbound messages may be sent from any task through
//! [`Session::send_message`].

use crate::handler::SessionHandler;
use fixgate_core::error::{FixError, Result, SessionError};
use fixgate_core::message::{MsgType, RawMessage};
use fixgate_core::types::Timestamp;
use fixgate_session::messages::{build_logon, build_logout, logout_text};
use fixgate_session::{
    AtomicSessionState, RejectReason, SequenceManager, SessionConfig, SessionRole, SessionState,
};
use fixgate_tagvalue::{Decoder, Encoder};
use fixgate_transport::{Link, MessageReader, TransportRead, TransportWrite};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// The I/O handles a session is built from.
pub(crate) struct SessionTransport {
    pub(crate) reader: Box<dyn TransportRead>,
    pub(crate) writer: Box<dyn TransportWrite>,
    pub(crate) link: Arc<dyn Link>,
    pub(crate) remote: Option<SocketAddr>,
}

struct Outbound {
    writer: Box<dyn TransportWrite>,
    encoder: Encoder,
}

/// One FIX session over one connection.
pub struct Session {
    connection_id: u64,
    role: SessionRole,
    remote: Option<SocketAddr>,
    config: Mutex<SessionConfig>,
    sequence: SequenceManager,
    state: AtomicSessionState,
    handler: Arc<dyn SessionHandler>,
    outbound: tokio::sync::Mutex<Outbound>,
    link: Arc<dyn Link>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("connection_id", &self.connection_id)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Creates a session and the reader its loop will consume.
    pub(crate) fn new(
        config: SessionConfig,
        role: SessionRole,
        handler: Arc<dyn SessionHandler>,
        transport: SessionTransport,
    ) -> (Arc<Self>, MessageReader) {
        let SessionTransport {
            reader,
            writer,
            link,
            remote,
        } = transport;

        let session = Arc::new(Self {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            role,
            remote,
            sequence: SequenceManager::from_config(&config),
            outbound: tokio::sync::Mutex::new(Outbound {
                writer,
                encoder: config.encoder(),
            }),
            config: Mutex::new(config),
            state: AtomicSessionState::default(),
            handler,
            link,
        });
        let reader = MessageReader::with_codec(reader, Default::default());
        (session, reader)
    }

    /// Returns the session identity, `"<sender>:<target>"`.
    #[must_use]
    pub fn id(&self) -> String {
        self.config.lock().id()
    }

    /// Returns the process-unique id of the underlying connection.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Returns which side of the connection this session is.
    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Returns the current protocol state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Returns true while logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.state().is_logged_in()
    }

    /// Returns a snapshot of the live configuration.
    ///
    /// The target CompID reflects wildcard resolution.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config.lock().clone()
    }

    /// Returns the sequence number of the next outbound message.
    #[must_use]
    pub fn next_seq_num(&self) -> u64 {
        self.sequence.next_sender_seq().value()
    }

    /// Returns the sequence number expected on the next inbound message.
    #[must_use]
    pub fn expected_seq_num(&self) -> u64 {
        self.sequence.next_target_seq().value()
    }

    /// Closes the connection. The read loop then ends on end of stream.
    pub fn disconnect(&self) {
        debug!(session = %self.id(), "disconnecting");
        self.link.close();
    }

    /// Sends a message of type `msg_type` with the fields in `body`.
    ///
    /// The header (including the next outbound MsgSeqNum) and trailer are
    /// added here. `body` is left empty afterwards, whether or not the send
    /// succeeded.
    ///
    /// # Errors
    /// Returns `SessionError::NotConnected` once the session has terminated,
    /// or the transport error if the write fails.
    pub async fn send_message(&self, msg_type: &MsgType, body: &mut Encoder) -> Result<()> {
        let result = self.write_message(msg_type, body).await;
        body.clear();
        result
    }

    async fn write_message(&self, msg_type: &MsgType, body: &mut Encoder) -> Result<()> {
        if self.state().is_terminated() {
            return Err(SessionError::NotConnected.into());
        }

        let mut outbound = self.outbound.lock().await;
        let Outbound { writer, encoder } = &mut *outbound;

        let seq = self.sequence.allocate_sender_seq();
        {
            let config = self.config.lock();
            config.initialize_header(encoder, msg_type, seq, Timestamp::now());
        }
        encoder.append(body);
        let frame = encoder.finish();

        trace!(connection = self.connection_id, %msg_type, seq = seq.value(), "sending");
        writer.write_all(&frame).await.map_err(FixError::from)
    }

    /// Runs the read loop until the connection ends or a check fails.
    ///
    /// [`SessionHandler::on_disconnected`] fires exactly once when this
    /// returns, or when the task running it is aborted.
    pub async fn handle(self: Arc<Self>, mut reader: MessageReader) {
        let _guard = DisconnectGuard(Arc::clone(&self));
        debug!(connection = self.connection_id, role = %self.role, "session started");

        loop {
            let frame = match reader.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(session = %self.id(), "end of stream");
                    break;
                }
                Err(e) if e.is_io() => {
                    debug!(session = %self.id(), error = %e, "read failed");
                    break;
                }
                Err(e) => {
                    warn!(session = %self.id(), error = %e, "malformed frame");
                    break;
                }
            };

            let message = match Decoder::new(&frame).decode() {
                Ok(message) => message,
                Err(e) => {
                    warn!(session = %self.id(), error = %e, "undecodable message");
                    break;
                }
            };

            if !self.process(&message).await {
                break;
            }
        }
    }

    /// Applies the session checks to one message. Returns false to stop.
    async fn process(self: &Arc<Self>, message: &RawMessage<'_>) -> bool {
        let msg_type = message.msg_type();
        let logged_in = self.is_logged_in();
        if !logged_in && *msg_type != MsgType::Logon {
            return self.reject(RejectReason::NotLoggedIn).await;
        }

        let in_sequence = message
            .seq_num()
            .map(|seq| self.sequence.validate_incoming(seq));
        match in_sequence {
            Ok(result) if result.is_ok() => {}
            Ok(result) => {
                debug!(session = %self.id(), ?result, "sequence mismatch");
                return self.reject(RejectReason::InvalidSequenceNumber).await;
            }
            Err(e) => {
                debug!(session = %self.id(), error = %e, "unusable MsgSeqNum");
                return self.reject(RejectReason::InvalidSequenceNumber).await;
            }
        }

        let identity = {
            let mut config = self.config.lock();
            if logged_in {
                config.validate_identity(message.target_comp_id(), message.sender_comp_id())
            } else {
                config.initialize(message)
            }
        };
        if let Err(reason) = identity {
            return self.reject(reason).await;
        }

        if *msg_type == MsgType::Logout {
            self.sequence.increment_target_seq();
            let text = logout_text(message);
            info!(session = %self.id(), text, "logout received");
            self.state.transition(SessionState::Terminated);
            self.handler.on_logged_out(self, text).await;
            return false;
        }

        if !logged_in {
            if !self.handler.validate_logon(self, message).await {
                return self.reject(RejectReason::InvalidLogon).await;
            }
            if self.role.acknowledges_logon() {
                let mut logon = build_logon(self.config.lock().heartbeat_interval_secs());
                if let Err(e) = self.send_message(&MsgType::Logon, &mut logon).await {
                    debug!(session = %self.id(), error = %e, "logon acknowledgment failed");
                    return false;
                }
            }
            self.state.transition(SessionState::LoggedIn);
            info!(session = %self.id(), role = %self.role, "logged on");
            self.handler.on_logged_on(self).await;
        }

        self.handler.on_message(self, message).await;
        self.sequence.increment_target_seq();
        true
    }

    async fn reject(&self, reason: RejectReason) -> bool {
        warn!(session = %self.id(), %reason, "rejecting session");
        let mut logout = build_logout(reason.text());
        if let Err(e) = self.send_message(&MsgType::Logout, &mut logout).await {
            debug!(session = %self.id(), error = %e, "logout not delivered");
        }
        false
    }
}

struct DisconnectGuard(Arc<Session>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let session = &self.0;
        session.state.transition(SessionState::Terminated);
        debug!(session = %session.id(), "session ended");
        session.handler.on_disconnected(session);
    }
}
