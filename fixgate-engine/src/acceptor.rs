/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Server side of the engine.
//!
//! The [`Acceptor`] owns the listening socket, a pool of worker tasks and a
//! readiness [`Poller`]. Each accepted connection becomes a [`Session`] whose
//! socket is registered with the poller and whose read loop runs on one of
//! the workers. Logged-in sessions are kept in a registry keyed by their
//! identity so the application can address them with
//! [`Acceptor::send_message`].

use crate::handler::{Application, SessionHandler};
use crate::session::{Session, SessionTransport};
use async_trait::async_trait;
use fixgate_core::error::{Result, SessionError};
use fixgate_core::message::{MsgType, RawMessage};
use fixgate_session::{SessionConfig, SessionRole};
use fixgate_tagvalue::Encoder;
use fixgate_transport::{MessageReader, Poller, PollerError, SocketStream};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Listen backlog of the accepting socket.
const LISTEN_BACKLOG: u32 = 5;

/// Sessions waiting for a worker before the accept loop blocks.
const HANDOFF_CAPACITY: usize = 2;

/// Interval at which the drain checks for remaining sessions.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long aborted sessions get to run their disconnect hooks.
const ABORT_GRACE: Duration = Duration::from_millis(100);

const EMFILE: i32 = 24;
const ENFILE: i32 = 23;

type SessionTask = (Arc<Session>, MessageReader);

/// State shared between the acceptor and its session handlers.
struct AcceptorShared {
    registry: RwLock<HashMap<String, Arc<Session>>>,
    live: Mutex<HashMap<u64, Arc<SocketStream>>>,
    poller: Arc<Poller>,
}

impl AcceptorShared {
    /// Forgets a connection and deregisters its socket.
    fn release(&self, connection_id: u64) {
        let socket = self.live.lock().remove(&connection_id);
        if let Some(socket) = socket {
            if let Err(e) = self.poller.remove_socket(socket.raw_fd()) {
                debug!(connection = connection_id, error = %e, "socket deregistration failed");
            }
        }
    }

    fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    fn live_sockets(&self) -> Vec<Arc<SocketStream>> {
        self.live.lock().values().cloned().collect()
    }
}

/// Bookkeeping layer between the sessions and the application.
struct AcceptorHandler<A> {
    app: Arc<A>,
    shared: Arc<AcceptorShared>,
}

#[async_trait]
impl<A: Application> SessionHandler for AcceptorHandler<A> {
    async fn on_message(&self, session: &Arc<Session>, message: &RawMessage<'_>) {
        self.app.on_message(session, message).await;
    }

    async fn validate_logon(&self, session: &Arc<Session>, logon: &RawMessage<'_>) -> bool {
        self.app.validate_logon(session, logon).await
    }

    async fn on_logged_on(&self, session: &Arc<Session>) {
        let id = session.id();
        let previous = self
            .shared
            .registry
            .write()
            .insert(id.clone(), Arc::clone(session));
        if previous.is_some() {
            warn!(session = %id, "replaced a registered session with the same identity");
        }
        self.app.on_logged_on(session).await;
    }

    async fn on_logged_out(&self, session: &Arc<Session>, text: &str) {
        self.app.on_logged_out(session, text).await;
    }

    fn on_disconnected(&self, session: &Arc<Session>) {
        self.shared.release(session.connection_id());

        let id = session.id();
        {
            let mut registry = self.shared.registry.write();
            if registry
                .get(&id)
                .is_some_and(|registered| Arc::ptr_eq(registered, session))
            {
                registry.remove(&id);
            }
        }
        info!(session = %id, "session disconnected");
        self.app.on_disconnected(session);
    }
}

/// Cloneable trigger for [`Acceptor::shutdown`].
///
/// Handy inside application callbacks, which cannot own the acceptor.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Requests shutdown. Returns immediately.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Binding progress published to [`Acceptor::wait_listening`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenState {
    Pending,
    Listening(SocketAddr),
    Failed,
}

impl ListenState {
    const fn addr(self) -> Option<SocketAddr> {
        match self {
            Self::Listening(addr) => Some(addr),
            Self::Pending | Self::Failed => None,
        }
    }
}

/// FIX acceptor.
pub struct Acceptor<A: Application> {
    app: Arc<A>,
    handler: Arc<AcceptorHandler<A>>,
    config: SessionConfig,
    bind_addr: SocketAddr,
    workers: usize,
    drain_timeout: Duration,
    shared: Arc<AcceptorShared>,
    shutdown: CancellationToken,
    listening: watch::Sender<ListenState>,
    started: AtomicBool,
}

impl<A: Application> std::fmt::Debug for Acceptor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptor")
            .field("session", &self.config.id())
            .field("bind_addr", &self.bind_addr)
            .field("workers", &self.workers)
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl<A: Application> Acceptor<A> {
    pub(crate) fn new(
        app: Arc<A>,
        config: SessionConfig,
        bind_addr: SocketAddr,
        workers: usize,
        drain_timeout: Duration,
        poller: Arc<Poller>,
    ) -> Self {
        let shared = Arc::new(AcceptorShared {
            registry: RwLock::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            poller,
        });
        let handler = Arc::new(AcceptorHandler {
            app: Arc::clone(&app),
            shared: Arc::clone(&shared),
        });
        let (listening, _) = watch::channel(ListenState::Pending);

        Self {
            app,
            handler,
            config,
            bind_addr,
            workers: workers.max(1),
            drain_timeout,
            shared,
            shutdown: CancellationToken::new(),
            listening,
            started: AtomicBool::new(false),
        }
    }

    /// Binds, accepts connections until [`Acceptor::shutdown`], then drains.
    ///
    /// Returns once every session, worker and the poller task have finished.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound, or if the acceptor has
    /// already been started. A failed bind leaves the acceptor startable.
    pub async fn listen(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::Configuration("acceptor already started".to_string()).into());
        }
        self.listening.send_replace(ListenState::Pending);

        let bound = bind(self.bind_addr).and_then(|listener| {
            let local = listener.local_addr()?;
            Ok((listener, local))
        });
        let (listener, local) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                error!(addr = %self.bind_addr, error = %e, "acceptor bind failed");
                self.listening.send_replace(ListenState::Failed);
                self.started.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        self.listening.send_replace(ListenState::Listening(local));
        info!(addr = %local, workers = self.workers, session = %self.config.id(), "acceptor listening");

        let (tx, rx) = mpsc::channel::<SessionTask>(HANDOFF_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = JoinSet::new();
        for index in 0..self.workers {
            workers.spawn(run_worker(index, Arc::clone(&rx)));
        }

        let poller = Arc::clone(&self.shared.poller);
        let poller_task = tokio::task::spawn_blocking(move || poller.run());

        self.accept_loop(&listener, &tx).await;
        drop(listener);

        self.drain(tx, workers, poller_task).await;
        info!(addr = %local, "acceptor stopped");
        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener, tx: &mpsc::Sender<SessionTask>) {
        loop {
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, remote) = match accepted {
                Ok(accepted) => accepted,
                Err(e) if is_descriptor_exhaustion(&e) => {
                    error!(error = %e, "out of file descriptors, no longer accepting");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };

            if let Err(refused) = self.app.on_connect_request(remote) {
                info!(remote = %remote, reason = %refused.reason, "connection refused");
                continue;
            }

            let task = match self.start_session(stream, remote) {
                Ok(task) => task,
                Err(e) => {
                    error!(remote = %remote, error = %e, "session setup failed");
                    continue;
                }
            };

            if let Err(mpsc::error::SendError((session, _))) = tx.send(task).await {
                self.shared.release(session.connection_id());
                error!(remote = %remote, "no worker left to run the session");
                break;
            }
        }
    }

    fn start_session(&self, stream: TcpStream, remote: SocketAddr) -> Result<SessionTask> {
        let socket = Arc::new(SocketStream::from_std(stream.into_std()?)?);
        let (reader, writer) = socket.split();
        let handler: Arc<dyn SessionHandler> = self.handler.clone();

        let (session, reader) = Session::new(
            self.config.clone(),
            SessionRole::Acceptor,
            handler,
            SessionTransport {
                reader: Box::new(reader),
                writer: Box::new(writer),
                link: socket.clone(),
                remote: Some(remote),
            },
        );

        let connection_id = session.connection_id();
        self.shared
            .live
            .lock()
            .insert(connection_id, Arc::clone(&socket));
        let registered = self.shared.poller.add_socket(
            socket.raw_fd(),
            Arc::clone(&socket),
            |readiness, socket: &SocketStream| socket.on_readiness(readiness),
        );
        if let Err(e) = registered {
            self.shared.live.lock().remove(&connection_id);
            return Err(e.into());
        }

        debug!(remote = %remote, connection = connection_id, "connection accepted");
        Ok((session, reader))
    }

    async fn drain(
        &self,
        tx: mpsc::Sender<SessionTask>,
        mut workers: JoinSet<()>,
        poller_task: JoinHandle<std::result::Result<(), PollerError>>,
    ) {
        let sockets = self.shared.live_sockets();
        info!(sessions = sockets.len(), "draining sessions");
        for socket in &sockets {
            socket.close();
        }
        drop(sockets);

        let deadline = Instant::now() + self.drain_timeout;
        while self.shared.live_count() > 0 && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.shared.poller.close();
        match poller_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "poller failed"),
            Err(e) => warn!(error = %e, "poller task failed"),
        }

        drop(tx);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let joined = tokio::time::timeout(remaining, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "worker task failed");
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                workers = workers.len(),
                sessions = self.shared.live_count(),
                "drain timeout elapsed, aborting remaining sessions"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}

            let grace = Instant::now() + ABORT_GRACE;
            while self.shared.live_count() > 0 && Instant::now() < grace {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        }
    }

    /// Requests shutdown. Returns immediately; [`Acceptor::listen`] returns
    /// once the drain completes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns a handle that can trigger shutdown from elsewhere.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Returns the bound address once listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.borrow().addr()
    }

    /// Waits until [`Acceptor::listen`] has bound or failed to bind.
    ///
    /// Returns the bound address, or `None` if binding failed.
    pub async fn wait_listening(&self) -> Option<SocketAddr> {
        let mut rx = self.listening.subscribe();
        match rx.wait_for(|state| *state != ListenState::Pending).await {
            Ok(state) => state.addr(),
            Err(_) => None,
        }
    }

    /// Sends a message to the logged-in session `session_id`.
    ///
    /// Returns `Ok(false)` if no such session is registered; `body` is
    /// cleared either way.
    ///
    /// # Errors
    /// Returns the session's send error.
    pub async fn send_message(
        &self,
        session_id: &str,
        msg_type: &MsgType,
        body: &mut Encoder,
    ) -> Result<bool> {
        let session = self.shared.registry.read().get(session_id).cloned();
        let Some(session) = session else {
            warn!(session = session_id, %msg_type, "unknown session, message dropped");
            body.clear();
            return Ok(false);
        };
        session.send_message(msg_type, body).await?;
        Ok(true)
    }

    /// Looks up a logged-in session.
    ///
    /// # Errors
    /// Returns `SessionError::NotFound` if no session has that identity.
    pub fn session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.shared
            .registry
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()).into())
    }

    /// Returns the identities of all logged-in sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        self.shared.registry.read().keys().cloned().collect()
    }

    /// Returns the number of logged-in sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Returns the application.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.app)
    }
}

fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

fn is_descriptor_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(EMFILE | ENFILE))
}

async fn run_worker(index: usize, rx: Arc<tokio::sync::Mutex<mpsc::Receiver<SessionTask>>>) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            next = async { rx.lock().await.recv().await } => match next {
                Some((session, reader)) => {
                    sessions.spawn(session.handle(reader));
                }
                None => break,
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!(worker = index, error = %e, "session task failed");
                }
            }
        }
    }

    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            error!(worker = index, error = %e, "session task failed");
        }
    }
    debug!(worker = index, "worker stopped");
}
