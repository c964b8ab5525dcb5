//! Reply Types
//!
//! Every command produces a [`Reply`]. Replies are kept as structured data
//! until the session writes them, so the framing lives in one place
//! ([`Reply::serialize_into`]).
//!
//! ## Wire Format
//!
//! - Status: `+OK\r\n`
//! - Error: `-ERR unknown command 'foo'\r\n`
//! - Integer: `:1\r\n`
//! - Bulk string: `$5\r\nhello\r\n`
//! - Nil bulk string: `$-1\r\n`
//! - Legacy pong: `$PONG\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line.
    /// Format: `+<string>\r\n`
    Status(String),

    /// Error line. By convention the message starts with `ERR `.
    /// Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed string.
    /// Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// Nil bulk string.
    /// Format: `$-1\r\n`
    Nil,

    /// The historical PING answer, `$PONG\r\n`. It is shaped like a bulk
    /// string but carries no length; clients that validate the length
    /// prefix reject it. Only produced in legacy compatibility mode.
    LegacyPong,
}

impl Reply {
    /// Creates a status reply.
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use emberkv::protocol::Reply;
    /// let err = Reply::error("ERR unknown command 'FOO'");
    /// assert_eq!(err.serialize(), b"-ERR unknown command 'FOO'\r\n");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    pub fn nil() -> Self {
        Reply::Nil
    }

    /// `+OK\r\n`
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Error reply for a command called with the wrong number of arguments.
    /// `name` is echoed as the client sent it.
    pub fn wrong_arity(name: &str) -> Self {
        Reply::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            name
        ))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Nil => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::LegacyPong => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"PONG");
                buf.extend_from_slice(CRLF);
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Nil => write!(f, "(nil)"),
            Reply::LegacyPong => write!(f, "PONG"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Reply::error("ERR unknown command 'FOO'");
        assert_eq!(value.serialize(), b"-ERR unknown command 'FOO'\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Reply::integer(1).serialize(), b":1\r\n");
        assert_eq!(Reply::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_bulk_serialize() {
        assert_eq!(Reply::bulk("hello").serialize(), b"$5\r\nhello\r\n");
        assert_eq!(Reply::bulk("").serialize(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_bulk_is_binary_safe() {
        let value = Reply::bulk(Bytes::from_static(b"a\r\nb"));
        assert_eq!(value.serialize(), b"$4\r\na\r\nb\r\n");
    }

    #[test]
    fn test_nil_serialize() {
        assert_eq!(Reply::nil().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_legacy_pong_serialize() {
        assert_eq!(Reply::LegacyPong.serialize(), b"$PONG\r\n");
    }

    #[test]
    fn test_wrong_arity_keeps_client_casing() {
        assert_eq!(
            Reply::wrong_arity("get"),
            Reply::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Reply::nil().to_string(), "(nil)");
        assert_eq!(Reply::integer(3).to_string(), "(integer) 3");
        assert_eq!(Reply::bulk("v").to_string(), "\"v\"");
        assert_eq!(
            Reply::error("ERR syntax error").to_string(),
            "(error) ERR syntax error"
        );
    }

    #[test]
    fn test_is_error() {
        assert!(Reply::error("ERR syntax error").is_error());
        assert!(!Reply::ok().is_error());
        assert!(!Reply::nil().is_error());
    }
}
