/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Client side of the engine.
//!
//! An [`Initiator`] opens one connection to a counterparty and runs a single
//! session over it. With a shared [`Poller`] the socket is driven by the
//! poller and the read loop runs as its own task; without one the session
//! uses tokio's reactor and [`Initiator::handle`] runs the loop inline.

use crate::handler::{Application, SessionHandler};
use crate::session::{Session, SessionTransport};
use async_trait::async_trait;
use fixgate_core::error::{Result, SessionError};
use fixgate_core::message::{MsgType, RawMessage};
use fixgate_session::{SessionConfig, SessionRole};
use fixgate_tagvalue::Encoder;
use fixgate_transport::{MessageReader, Poller, SocketStream, TokioReader, TokioWriter};
use parking_lot::Mutex;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Poller and descriptor of a poller-driven connection.
type Registration = (Arc<Poller>, RawFd);

fn deregister(registration: Option<&Registration>) {
    if let Some((poller, fd)) = registration {
        if let Err(e) = poller.remove_socket(*fd) {
            debug!(fd, error = %e, "socket deregistration failed");
        }
    }
}

struct Connection {
    session: Arc<Session>,
    reader: Option<MessageReader>,
    registration: Option<Registration>,
}

impl Connection {
    /// Closes the link. A socket whose read loop never ran is deregistered
    /// here, since no disconnect hook will do it.
    fn close(&self) {
        self.session.disconnect();
        if self.reader.is_some() {
            deregister(self.registration.as_ref());
        }
    }
}

/// Tracks the connection flag and poller registration of one connection.
struct InitiatorHandler<A> {
    app: Arc<A>,
    connected: Arc<AtomicBool>,
    registration: Option<Registration>,
}

#[async_trait]
impl<A: Application> SessionHandler for InitiatorHandler<A> {
    async fn on_message(&self, session: &Arc<Session>, message: &RawMessage<'_>) {
        self.app.on_message(session, message).await;
    }

    async fn validate_logon(&self, session: &Arc<Session>, logon: &RawMessage<'_>) -> bool {
        self.app.validate_logon(session, logon).await
    }

    async fn on_logged_on(&self, session: &Arc<Session>) {
        self.app.on_logged_on(session).await;
    }

    async fn on_logged_out(&self, session: &Arc<Session>, text: &str) {
        self.app.on_logged_out(session, text).await;
    }

    fn on_disconnected(&self, session: &Arc<Session>) {
        self.connected.store(false, Ordering::Release);
        deregister(self.registration.as_ref());
        info!(session = %session.id(), "disconnected");
        self.app.on_disconnected(session);
    }
}

/// FIX initiator.
pub struct Initiator<A: Application> {
    app: Arc<A>,
    config: SessionConfig,
    remote: String,
    poller: Option<Arc<Poller>>,
    connected: Arc<AtomicBool>,
    connection: Mutex<Option<Connection>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Application> std::fmt::Debug for Initiator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("session", &self.config.id())
            .field("remote", &self.remote)
            .field("poller", &self.poller.is_some())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<A: Application> Initiator<A> {
    pub(crate) fn new(
        app: Arc<A>,
        config: SessionConfig,
        remote: String,
        poller: Option<Arc<Poller>>,
    ) -> Self {
        Self {
            app,
            config,
            remote,
            poller,
            connected: Arc::new(AtomicBool::new(false)),
            connection: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Connects to the counterparty and creates the session.
    ///
    /// Calls [`Application::on_connected`] before returning, which is where
    /// the application usually sends its Logon.
    ///
    /// # Errors
    /// Returns an error if a connection is already open, or if the TCP
    /// connection or socket setup fails.
    pub async fn connect(&self) -> Result<Arc<Session>> {
        if self.is_connected() {
            return Err(SessionError::Connection("already connected".to_string()).into());
        }

        let stream = TcpStream::connect(self.remote.as_str()).await?;
        stream.set_nodelay(true)?;
        let remote = stream.peer_addr().ok();

        let (transport, registration) = match &self.poller {
            Some(poller) => {
                let socket = Arc::new(SocketStream::from_std(stream.into_std()?)?);
                let fd = socket.raw_fd();
                poller.add_socket(fd, Arc::clone(&socket), |readiness, socket: &SocketStream| {
                    socket.on_readiness(readiness);
                })?;
                let (reader, writer) = socket.split();
                let transport = SessionTransport {
                    reader: Box::new(reader),
                    writer: Box::new(writer),
                    link: socket,
                    remote,
                };
                (transport, Some((Arc::clone(poller), fd)))
            }
            None => {
                let std_stream = stream.into_std()?;
                let link = std_stream.try_clone()?;
                let (reader, writer) = TcpStream::from_std(std_stream)?.into_split();
                let transport = SessionTransport {
                    reader: Box::new(TokioReader::new(reader)),
                    writer: Box::new(TokioWriter::new(writer)),
                    link: Arc::new(link),
                    remote,
                };
                (transport, None)
            }
        };

        let handler: Arc<dyn SessionHandler> = Arc::new(InitiatorHandler {
            app: Arc::clone(&self.app),
            connected: Arc::clone(&self.connected),
            registration: registration.clone(),
        });
        let (session, reader) =
            Session::new(self.config.clone(), SessionRole::Initiator, handler, transport);

        *self.connection.lock() = Some(Connection {
            session: Arc::clone(&session),
            reader: Some(reader),
            registration,
        });
        self.connected.store(true, Ordering::Release);
        info!(remote = %self.remote, session = %session.id(), "connected");

        self.app.on_connected(&session).await;
        Ok(session)
    }

    /// Runs the session's read loop.
    ///
    /// With a poller the loop is spawned and this returns at once; use
    /// [`Initiator::join`] to wait for it. Otherwise the loop runs here until
    /// the session ends.
    ///
    /// # Errors
    /// Returns an error if not connected or if the loop was already started.
    pub async fn handle(&self) -> Result<()> {
        let (session, reader) = {
            let mut connection = self.connection.lock();
            let Some(connection) = connection.as_mut() else {
                return Err(SessionError::NotConnected.into());
            };
            (Arc::clone(&connection.session), connection.reader.take())
        };
        let Some(reader) = reader else {
            return Err(SessionError::Connection("read loop already started".to_string()).into());
        };

        if self.poller.is_some() {
            let task = tokio::spawn(session.handle(reader));
            *self.task.lock() = Some(task);
        } else {
            session.handle(reader).await;
        }
        Ok(())
    }

    /// Waits for a read loop started by [`Initiator::handle`] to finish.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(remote = %self.remote, error = %e, "session task failed");
            }
        }
    }

    /// Sends a message on the current session.
    ///
    /// # Errors
    /// Returns `SessionError::NotConnected` without a session, otherwise
    /// the session's send error.
    pub async fn send_message(&self, msg_type: &MsgType, body: &mut Encoder) -> Result<()> {
        let Some(session) = self.session() else {
            body.clear();
            return Err(SessionError::NotConnected.into());
        };
        session.send_message(msg_type, body).await
    }

    /// Closes the connection.
    pub fn disconnect(&self) {
        if let Some(connection) = self.connection.lock().as_ref() {
            connection.close();
        }
        self.connected.store(false, Ordering::Release);
    }

    /// Returns true between a successful connect and the end of the session.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns the current session, if a connection was made.
    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.connection
            .lock()
            .as_ref()
            .map(|connection| Arc::clone(&connection.session))
    }

    /// Returns the application.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.app)
    }
}

impl<A: Application> Drop for Initiator<A> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use crate::handler::NoOpApplication;
    use fixgate_session::SessionConfigBuilder;
    use fixgate_tagvalue::Decoder;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn initiator(remote: String) -> Initiator<NoOpApplication> {
        let config = SessionConfigBuilder::new()
            .sender_comp_id("client")
            .target_comp_id("server")
            .build()
            .unwrap();
        EngineBuilder::new()
            .with_session(config)
            .with_remote_addr(remote)
            .build_initiator()
            .unwrap()
    }

    #[tokio::test]
    async fn test_not_connected() {
        let initiator = initiator("127.0.0.1:1".to_string());
        assert!(!initiator.is_connected());
        assert!(initiator.session().is_none());
        assert!(initiator.handle().await.is_err());

        let mut body = Encoder::default();
        body.put_str(58, "x");
        let err = initiator
            .send_message(&MsgType::Logon, &mut body)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            fixgate_core::FixError::Session(SessionError::NotConnected)
        ));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let initiator = initiator(addr.to_string());
        assert!(initiator.connect().await.is_err());
        assert!(!initiator.is_connected());
    }

    #[tokio::test]
    async fn test_loop_ends_when_peer_logs_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let initiator = initiator(listener.local_addr().unwrap().to_string());

        let session = initiator.connect().await.unwrap();
        assert!(initiator.is_connected());
        assert_eq!(session.role(), SessionRole::Initiator);
        assert_eq!(session.id(), "client:server");

        let (mut peer, _) = listener.accept().await.unwrap();
        let mut frames = Encoder::new("FIX.4.4");
        frames
            .put_str(35, "A")
            .put_str(49, "server")
            .put_str(56, "client")
            .put_uint(34, 1);
        peer.write_all(&frames.finish()).await.unwrap();
        frames
            .put_str(35, "5")
            .put_str(49, "server")
            .put_str(56, "client")
            .put_uint(34, 2)
            .put_str(58, "maintenance");
        peer.write_all(&frames.finish()).await.unwrap();

        timeout(Duration::from_secs(2), initiator.handle())
            .await
            .unwrap()
            .unwrap();
        assert!(!initiator.is_connected());
        assert!(initiator.handle().await.is_err());

        let mut body = Encoder::default();
        assert!(initiator.send_message(&MsgType::other("D"), &mut body).await.is_err());
    }

    #[tokio::test]
    async fn test_messages_carry_session_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let initiator = initiator(listener.local_addr().unwrap().to_string());
        initiator.connect().await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();

        let mut body = fixgate_session::messages::build_logon(30);
        initiator.send_message(&MsgType::Logon, &mut body).await.unwrap();

        let mut reader = MessageReader::new(TokioReader::new(peer));
        let frame = reader.next_frame().await.unwrap().unwrap();
        let logon = Decoder::new(&frame).decode().unwrap();
        assert_eq!(logon.msg_type(), &MsgType::Logon);
        assert_eq!(logon.sender_comp_id(), "client");
        assert_eq!(logon.target_comp_id(), "server");
        assert_eq!(logon.seq_num().unwrap(), 1);
        assert_eq!(logon.get_field_str(108), Some("30"));

        initiator.disconnect();
        assert!(!initiator.is_connected());
    }

    #[tokio::test]
    async fn test_unstarted_connection_releases_poller_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote = listener.local_addr().unwrap().to_string();
        let poller = Arc::new(Poller::new().unwrap());
        let config = SessionConfigBuilder::new()
            .sender_comp_id("client")
            .target_comp_id("server")
            .build()
            .unwrap();
        let build = || {
            EngineBuilder::new()
                .with_session(config.clone())
                .with_remote_addr(remote.clone())
                .with_poller(Arc::clone(&poller))
                .build_initiator()
                .unwrap()
        };

        let first = build();
        first.connect().await.unwrap();
        assert_eq!(poller.socket_count(), 1);
        first.disconnect();
        assert_eq!(poller.socket_count(), 0);
        first.disconnect();
        assert_eq!(poller.socket_count(), 0);

        let second = build();
        second.connect().await.unwrap();
        assert_eq!(poller.socket_count(), 1);
        drop(second);
        assert_eq!(poller.socket_count(), 0);
    }
}
