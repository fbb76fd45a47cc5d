/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Poller-driven socket stream.
//!
//! [`SocketStream`] owns a non-blocking socket and one [`Parker`] per
//! direction. A read or write that would block parks the calling task; the
//! poller callback ([`SocketStream::on_readiness`]) unparks it and the call
//! is retried. Callers never see `WouldBlock`.

use crate::parker::Parker;
use crate::poller::Readiness;
use crate::transport::{Link, READ_CHUNK, TransportRead, TransportWrite};
use async_trait::async_trait;
use bytes::BytesMut;
use mio::net::TcpStream;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Non-blocking TCP stream whose would-block paths park the calling task.
#[derive(Debug)]
pub struct SocketStream {
    stream: TcpStream,
    read_parker: Parker,
    write_parker: Parker,
    closed: AtomicBool,
}

impl SocketStream {
    /// Wraps a connected std stream, switching it to non-blocking mode with
    /// `TCP_NODELAY`.
    ///
    /// # Errors
    /// Returns an error if the socket options cannot be applied.
    pub fn from_std(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(TcpStream::from_std(stream)))
    }

    /// Wraps an already non-blocking mio stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_parker: Parker::new(),
            write_parker: Parker::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the descriptor to register with the poller.
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Returns the remote address, if still connected.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Returns true once [`SocketStream::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reads into `buf`, parking while no data is available.
    ///
    /// Returns `Ok(0)` at end of stream.
    ///
    /// # Errors
    /// Returns any socket error other than `WouldBlock` and `Interrupted`.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match (&self.stream).read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.is_closed() {
                        return Ok(0);
                    }
                    self.read_parker.park().await;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes the whole of `buf`, parking while the send buffer is full.
    ///
    /// # Errors
    /// Returns `BrokenPipe` if the stream was closed, or any socket error
    /// other than `WouldBlock` and `Interrupted`.
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match (&self.stream).write(buf) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.is_closed() {
                        return Err(ErrorKind::BrokenPipe.into());
                    }
                    self.write_parker.park().await;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Shuts the socket down in both directions and wakes both parked sides.
    ///
    /// Pending reads then observe end of stream.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.stream.shutdown(Shutdown::Both) {
                debug!(fd = self.raw_fd(), error = %e, "socket shutdown failed");
            }
        }
        self.unpark_all();
    }

    /// Poller callback: closes on end of stream or error, then wakes both sides.
    pub fn on_readiness(&self, readiness: &Readiness) {
        trace!(fd = self.raw_fd(), ?readiness, "socket ready");
        if readiness.is_eof() {
            self.close();
        } else {
            self.unpark_all();
        }
    }

    fn unpark_all(&self) {
        self.read_parker.unpark();
        self.write_parker.unpark();
    }

    /// Splits the stream into a reader and a writer sharing the socket.
    #[must_use]
    pub fn split(self: &Arc<Self>) -> (SocketReader, SocketWriter) {
        (
            SocketReader {
                stream: Arc::clone(self),
            },
            SocketWriter {
                stream: Arc::clone(self),
            },
        )
    }
}

impl Link for SocketStream {
    fn close(&self) {
        SocketStream::close(self);
    }
}

/// Read half of a [`SocketStream`].
#[derive(Debug)]
pub struct SocketReader {
    stream: Arc<SocketStream>,
}

#[async_trait]
impl TransportRead for SocketReader {
    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        let start = buf.len();
        buf.resize(start + READ_CHUNK, 0);
        match self.stream.read(&mut buf[start..]).await {
            Ok(n) => {
                buf.truncate(start + n);
                Ok(n)
            }
            Err(e) => {
                buf.truncate(start);
                Err(e)
            }
        }
    }
}

/// Write half of a [`SocketStream`].
#[derive(Debug)]
pub struct SocketWriter {
    stream: Arc<SocketStream>,
}

#[async_trait]
impl TransportWrite for SocketWriter {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await
    }
}
