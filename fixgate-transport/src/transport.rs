/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Transport abstractions used by sessions.
//!
//! A session reads through a [`TransportRead`], writes through a
//! [`TransportWrite`] and force-closes its connection through a [`Link`].
//! The poller-driven [`crate::stream::SocketStream`] halves implement all
//! three; [`TokioReader`] and [`TokioWriter`] adapt any tokio stream.

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::net::{Shutdown, TcpStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Minimum free space reserved in the read buffer before each read.
pub const READ_CHUNK: usize = 4096;

/// Read half of a session transport.
#[async_trait]
pub trait TransportRead: Send {
    /// Reads available bytes into the spare capacity of `buf`.
    ///
    /// Returns the number of bytes appended; `0` means end of stream.
    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize>;
}

/// Write half of a session transport.
#[async_trait]
pub trait TransportWrite: Send {
    /// Writes the whole of `data`.
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Handle used to force a connection closed from outside its tasks.
///
/// Closing makes the peer and the local read loop observe end of stream.
pub trait Link: Send + Sync {
    /// Closes the connection. Closing twice is harmless.
    fn close(&self);
}

impl Link for TcpStream {
    fn close(&self) {
        if let Err(e) = self.shutdown(Shutdown::Both) {
            debug!(error = %e, "shutdown on closed link");
        }
    }
}

/// [`TransportRead`] over any tokio reader.
#[derive(Debug)]
pub struct TokioReader<R> {
    inner: R,
}

impl<R> TokioReader<R> {
    /// Wraps a tokio reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R> TransportRead for TokioReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        buf.reserve(READ_CHUNK);
        self.inner.read_buf(buf).await
    }
}

/// [`TransportWrite`] over any tokio writer.
#[derive(Debug)]
pub struct TokioWriter<W> {
    inner: W,
}

impl<W> TokioWriter<W> {
    /// Wraps a tokio writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> TransportWrite for TokioWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_adapters_move_bytes() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = TokioWriter::new(client);
        let mut reader = TokioReader::new(server);

        writer.write_all(b"35=0\x01").await.unwrap();

        let mut buf = BytesMut::new();
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..], b"35=0\x01");
    }

    #[tokio::test]
    async fn test_tokio_reader_eof() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);

        let mut reader = TokioReader::new(server);
        let mut buf = BytesMut::new();
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_std_link_close_is_idempotent() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        stream.close();
        stream.close();
    }
}
