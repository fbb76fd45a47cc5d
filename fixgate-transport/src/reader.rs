/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Buffered frame reader.

use crate::codec::{CodecError, FixCodec};
use crate::transport::TransportRead;
use bytes::BytesMut;
use std::fmt;
use tokio_util::codec::Decoder;
use tracing::debug;

/// Pulls complete FIX frames out of a [`TransportRead`].
pub struct MessageReader {
    transport: Box<dyn TransportRead>,
    buffer: BytesMut,
    codec: FixCodec,
}

impl fmt::Debug for MessageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReader")
            .field("buffered", &self.buffer.len())
            .field("codec", &self.codec)
            .finish()
    }
}

impl MessageReader {
    /// Creates a reader with the default codec.
    pub fn new(transport: impl TransportRead + 'static) -> Self {
        Self::with_codec(Box::new(transport), FixCodec::new())
    }

    /// Creates a reader with a custom codec.
    #[must_use]
    pub fn with_codec(transport: Box<dyn TransportRead>, codec: FixCodec) -> Self {
        Self {
            transport,
            buffer: BytesMut::with_capacity(8 * 1024),
            codec,
        }
    }

    /// Returns the next complete frame, or `None` at end of stream.
    ///
    /// Bytes of an incomplete frame left at end of stream are discarded.
    ///
    /// # Errors
    /// Returns a framing error for malformed input, or [`CodecError::Io`] if
    /// the transport fails.
    pub async fn next_frame(&mut self) -> Result<Option<BytesMut>, CodecError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if self.transport.read(&mut self.buffer).await? == 0 {
                if !self.buffer.is_empty() {
                    debug!(bytes = self.buffer.len(), "discarding partial frame at eof");
                    self.buffer.clear();
                }
                return Ok(None);
            }
        }
    }

    /// Returns the number of buffered bytes not yet framed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TokioReader, TokioWriter, TransportWrite};
    use fixgate_tagvalue::Encoder;

    fn frame(seq: u64) -> BytesMut {
        let mut encoder = Encoder::new("FIX.4.2");
        encoder.put_str(35, "0").put_uint(34, seq);
        encoder.finish()
    }

    #[tokio::test]
    async fn test_frames_survive_fragmentation() {
        let (client, server) = tokio::io::duplex(8);
        let mut reader = MessageReader::new(TokioReader::new(server));

        let mut bytes = frame(1).to_vec();
        bytes.extend_from_slice(&frame(2));
        let expected = bytes.clone();
        let writer = tokio::spawn(async move {
            let mut writer = TokioWriter::new(client);
            for chunk in bytes.chunks(3) {
                writer.write_all(chunk).await.unwrap();
            }
        });

        let first = reader.next_frame().await.unwrap().unwrap();
        let second = reader.next_frame().await.unwrap().unwrap();
        writer.await.unwrap();

        assert_eq!([&first[..], &second[..]].concat(), expected);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_frame_at_eof_is_discarded() {
        let (client, server) = tokio::io::duplex(256);
        let mut reader = MessageReader::new(TokioReader::new(server));

        let bytes = frame(1);
        let mut writer = TokioWriter::new(client);
        writer.write_all(&bytes[..bytes.len() - 3]).await.unwrap();
        drop(writer);

        assert!(reader.next_frame().await.unwrap().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_garbage_is_a_framing_error() {
        let (client, server) = tokio::io::duplex(256);
        let mut reader = MessageReader::new(TokioReader::new(server));

        let mut writer = TokioWriter::new(client);
        writer.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err, CodecError::InvalidBeginString);
        assert!(!err.is_io());
    }
}
