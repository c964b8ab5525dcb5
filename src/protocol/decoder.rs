//! Stream Decoder
//!
//! Wraps a byte stream and yields one [`Command`] per call to
//! [`Decoder::next_command`], waiting for more data whenever the buffered
//! bytes do not yet hold a complete command.
//!
//! TCP is a stream protocol: one read can return half a command or several
//! commands at once. The decoder accumulates reads in a `BytesMut` and lets
//! the [`CommandParser`] decide when a command is complete.

use crate::protocol::command::Command;
use crate::protocol::parser::{CommandParser, ParseError};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors returned by [`Decoder::next_command`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The peer closed the stream between commands
    #[error("end of stream")]
    EndOfStream,

    /// The peer closed the stream in the middle of a command
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Reading from the stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The buffered bytes are not a valid command
    #[error("{0}")]
    Protocol(#[from] ParseError),
}

/// Decodes commands from an async byte stream.
#[derive(Debug)]
pub struct Decoder<R> {
    reader: R,
    buffer: BytesMut,
    parser: CommandParser,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: CommandParser::new(),
            bytes_read: 0,
        }
    }

    /// Returns the next complete command from the stream.
    ///
    /// Commands already buffered are returned without touching the stream.
    /// After a [`DecodeError::Protocol`] the buffer position is unknown and
    /// the decoder must not be used again.
    pub async fn next_command(&mut self) -> Result<Command, DecodeError> {
        loop {
            if let Some((command, consumed)) = self.parser.parse(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded command"
                );
                return Ok(command);
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.reader.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    DecodeError::EndOfStream
                } else {
                    DecodeError::UnexpectedEof
                });
            }
            self.bytes_read += n as u64;
            trace!(bytes = n, "Read data");
        }
    }
}

impl<R> Decoder<R> {
    /// Number of bytes read but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes read from the stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;
    use tokio_test::io::Builder;

    fn args(cmd: &Command) -> Vec<&[u8]> {
        cmd.args().iter().map(|a| a.as_ref()).collect()
    }

    #[tokio::test]
    async fn test_command_split_across_reads() {
        let stream = Builder::new()
            .read(b"*2\r\n$3\r\nGE")
            .read(b"T\r\n$4\r\nna")
            .read(b"me\r\n")
            .build();
        let mut decoder = Decoder::new(stream);

        let cmd = decoder.next_command().await.unwrap();
        assert_eq!(args(&cmd), vec![&b"GET"[..], b"name"]);
        assert!(matches!(
            decoder.next_command().await,
            Err(DecodeError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_several_commands_in_one_read() {
        let stream = Builder::new()
            .read(b"PING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\nQUIT\r\n")
            .build();
        let mut decoder = Decoder::new(stream);

        let names: Vec<Option<String>> = vec![
            decoder.next_command().await.unwrap().name(),
            decoder.next_command().await.unwrap().name(),
            decoder.next_command().await.unwrap().name(),
        ];
        assert_eq!(
            names,
            vec![
                Some("PING".to_string()),
                Some("ECHO".to_string()),
                Some("QUIT".to_string())
            ]
        );
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.bytes_read(), 34);
    }

    #[tokio::test]
    async fn test_inline_command_from_stream() {
        let stream = Builder::new().read(b"SET key \"hello world\"\r\n").build();
        let mut decoder = Decoder::new(stream);

        let cmd = decoder.next_command().await.unwrap();
        assert_eq!(
            cmd.into_args(),
            vec![
                Bytes::from("SET"),
                Bytes::from("key"),
                Bytes::from("hello world")
            ]
        );
    }

    #[tokio::test]
    async fn test_eof_mid_command() {
        let stream = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();
        let mut decoder = Decoder::new(stream);

        assert!(matches!(
            decoder.next_command().await,
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_protocol_error() {
        let stream = Builder::new().read(b"\"hello\r\n").build();
        let mut decoder = Decoder::new(stream);

        assert!(matches!(
            decoder.next_command().await,
            Err(DecodeError::Protocol(ParseError::UnbalancedQuotes))
        ));
    }

    #[tokio::test]
    async fn test_io_error() {
        let stream = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut decoder = Decoder::new(stream);

        match decoder.next_command().await {
            Err(DecodeError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {:?}", other),
        }
    }
}
