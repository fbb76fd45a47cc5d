/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Readiness poller.
//!
//! [`Poller`] wraps [`mio::Poll`] and keeps a table from socket descriptor to
//! callback. A dedicated thread drives [`Poller::run`]; every readiness event
//! on a registered socket invokes that socket's callback once with the
//! observed [`Readiness`]. Sessions use the callback to unpark the task
//! waiting on the socket.
//!
//! Interest is edge-triggered: a callback fires when the state changes, not
//! while it persists, so the woken task must drain the socket until it would
//! block again.

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, ErrorKind};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, trace};

const WAKE_TOKEN: Token = Token(usize::MAX);
const DEFAULT_EVENTS_CAPACITY: usize = 64;
const EBADF: i32 = 9;

/// Errors reported by the [`Poller`].
#[derive(Debug, Error)]
pub enum PollerError {
    /// The poller was closed.
    #[error("poller closed")]
    Closed,

    /// The OS multiplexer reported an error.
    #[error("poller io error: {0}")]
    Io(#[from] io::Error),
}

impl From<PollerError> for fixgate_core::FixError {
    fn from(err: PollerError) -> Self {
        match err {
            PollerError::Closed => Self::Io(io::Error::other("poller closed")),
            PollerError::Io(e) => Self::Io(e),
        }
    }
}

/// Readiness observed for one socket in one poll round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Data (or EOF) can be read.
    pub readable: bool,
    /// The send buffer has room.
    pub writable: bool,
    /// The peer shut down its write side.
    pub read_closed: bool,
    /// The local write side can no longer be used.
    pub write_closed: bool,
    /// The socket reported an error.
    pub error: bool,
}

impl Readiness {
    fn from_event(event: &mio::event::Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            read_closed: event.is_read_closed(),
            write_closed: event.is_write_closed(),
            error: event.is_error(),
        }
    }

    /// Returns true if the socket reached end of stream or failed.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.read_closed || self.error
    }
}

type Callback = Arc<dyn Fn(&Readiness) + Send + Sync>;

struct PollState {
    poll: Poll,
    events: Events,
}

/// Readiness multiplexer shared by every socket of an engine.
pub struct Poller {
    state: Mutex<Option<PollState>>,
    registry: Registry,
    waker: Waker,
    closed: AtomicBool,
    sockets: Mutex<HashMap<Token, Callback>>,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("closed", &self.is_closed())
            .field("sockets", &self.socket_count())
            .finish()
    }
}

impl Poller {
    /// Creates a poller.
    ///
    /// # Errors
    /// Returns an error if the OS multiplexer cannot be created.
    pub fn new() -> Result<Self, PollerError> {
        Self::with_capacity(DEFAULT_EVENTS_CAPACITY)
    }

    /// Creates a poller that handles up to `max_events` events per round.
    ///
    /// # Errors
    /// Returns an error if the OS multiplexer cannot be created.
    pub fn with_capacity(max_events: usize) -> Result<Self, PollerError> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        Ok(Self {
            state: Mutex::new(Some(PollState {
                poll,
                events: Events::with_capacity(max_events.max(1)),
            })),
            registry,
            waker,
            closed: AtomicBool::new(false),
            sockets: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a socket for read and write readiness.
    ///
    /// `callback` receives the observed readiness and `user_data` every time
    /// the socket becomes ready. The poller holds `user_data` until the
    /// socket is removed.
    ///
    /// # Errors
    /// Returns an error if the poller is closed or registration fails.
    pub fn add_socket<T, F>(
        &self,
        fd: RawFd,
        user_data: Arc<T>,
        callback: F,
    ) -> Result<(), PollerError>
    where
        T: Send + Sync + ?Sized + 'static,
        F: Fn(&Readiness, &T) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(PollerError::Closed);
        }

        let token = token_for(fd);
        let entry: Callback =
            Arc::new(move |readiness: &Readiness| callback(readiness, &*user_data));
        self.sockets.lock().insert(token, entry);

        let registered = self.registry.register(
            &mut SourceFd(&fd),
            token,
            Interest::READABLE | Interest::WRITABLE,
        );
        if let Err(e) = registered {
            self.sockets.lock().remove(&token);
            return Err(e.into());
        }

        trace!(fd, "socket registered");
        Ok(())
    }

    /// Deregisters a socket.
    ///
    /// Removing a socket that is not registered, or whose descriptor is
    /// already closed, is not an error.
    ///
    /// # Errors
    /// Returns an error if the OS rejects the deregistration for another reason.
    pub fn remove_socket(&self, fd: RawFd) -> Result<(), PollerError> {
        let removed = self.sockets.lock().remove(&token_for(fd));
        if removed.is_none() || self.is_closed() {
            return Ok(());
        }

        match self.registry.deregister(&mut SourceFd(&fd)) {
            Ok(()) => {
                trace!(fd, "socket deregistered");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(EBADF) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocks until at least one socket is ready and dispatches its callback.
    ///
    /// Returns the number of callbacks invoked. An interrupted wait returns
    /// `Ok(0)`.
    ///
    /// # Errors
    /// Returns [`PollerError::Closed`] once [`Poller::close`] has been called.
    pub fn poll(&self) -> Result<usize, PollerError> {
        let mut guard = self.state.lock();
        if self.is_closed() {
            guard.take();
        }
        let Some(state) = guard.as_mut() else {
            return Err(PollerError::Closed);
        };

        if let Err(e) = state.poll.poll(&mut state.events, None) {
            if e.kind() == ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(e.into());
        }

        if self.is_closed() {
            guard.take();
            return Err(PollerError::Closed);
        }

        let ready: Vec<(Callback, Readiness)> = {
            let sockets = self.sockets.lock();
            state
                .events
                .iter()
                .filter(|event| event.token() != WAKE_TOKEN)
                .filter_map(|event| {
                    sockets
                        .get(&event.token())
                        .map(|cb| (Arc::clone(cb), Readiness::from_event(event)))
                })
                .collect()
        };
        drop(guard);

        for (callback, readiness) in &ready {
            callback(readiness);
        }
        Ok(ready.len())
    }

    /// Drives [`Poller::poll`] until the poller is closed.
    ///
    /// # Errors
    /// Returns the first error other than [`PollerError::Closed`].
    pub fn run(&self) -> Result<(), PollerError> {
        debug!("poller started");
        loop {
            match self.poll() {
                Ok(_) => {}
                Err(PollerError::Closed) => {
                    debug!("poller stopped");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Closes the poller and wakes the thread blocked in [`Poller::poll`].
    ///
    /// The OS handle is released by the polling thread. Registered callbacks
    /// are dropped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.waker.wake() {
            debug!(error = %e, "failed to wake poller");
        }
        self.sockets.lock().clear();
    }

    /// Returns true once [`Poller::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the number of registered sockets.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.sockets.lock().len()
    }
}

fn token_for(fd: RawFd) -> Token {
    Token(fd as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsRawFd;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (client, server)
    }

    #[test]
    fn test_poll_dispatches_readable_socket() {
        let poller = Poller::new().unwrap();
        let (mut client, server) = socket_pair();
        let hits = Arc::new(AtomicUsize::new(0));

        poller
            .add_socket(server.as_raw_fd(), Arc::clone(&hits), |readiness, hits| {
                if readiness.readable {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        assert_eq!(poller.socket_count(), 1);

        client.write_all(b"8=FIX.4.4\x01").unwrap();
        let mut dispatched = 0;
        while hits.load(Ordering::SeqCst) == 0 {
            dispatched += poller.poll().unwrap();
        }
        assert!(dispatched >= 1);
    }

    #[test]
    fn test_eof_is_reported() {
        let poller = Poller::new().unwrap();
        let (client, server) = socket_pair();
        let eof = Arc::new(AtomicBool::new(false));

        poller
            .add_socket(server.as_raw_fd(), Arc::clone(&eof), |readiness, eof| {
                if readiness.is_eof() {
                    eof.store(true, Ordering::SeqCst);
                }
            })
            .unwrap();

        drop(client);
        while !eof.load(Ordering::SeqCst) {
            poller.poll().unwrap();
        }
    }

    #[test]
    fn test_remove_unknown_socket_is_noop() {
        let poller = Poller::new().unwrap();
        assert!(poller.remove_socket(12345).is_ok());

        let (_client, server) = socket_pair();
        poller
            .add_socket(server.as_raw_fd(), Arc::new(()), |_, _| {})
            .unwrap();
        poller.remove_socket(server.as_raw_fd()).unwrap();
        poller.remove_socket(server.as_raw_fd()).unwrap();
        assert_eq!(poller.socket_count(), 0);
    }

    #[test]
    fn test_close_unblocks_run() {
        let poller = Arc::new(Poller::new().unwrap());
        let runner = {
            let poller = Arc::clone(&poller);
            std::thread::spawn(move || poller.run())
        };

        std::thread::sleep(Duration::from_millis(20));
        poller.close();
        runner.join().unwrap().unwrap();

        assert!(matches!(poller.poll(), Err(PollerError::Closed)));
        let (_client, server) = socket_pair();
        assert!(matches!(
            poller.add_socket(server.as_raw_fd(), Arc::new(()), |_, _| {}),
            Err(PollerError::Closed)
        ));
    }
}
