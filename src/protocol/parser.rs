//! Incremental Command Parser
//!
//! Turns buffered bytes into [`Command`]s. The parser never blocks and never
//! owns the buffer; the caller (see [`Decoder`](super::Decoder)) appends
//! network data and calls [`CommandParser::parse`] again.
//!
//! `parse` returns either:
//! - `Ok(Some((command, consumed)))` - a full command; advance the buffer by `consumed`
//! - `Ok(None)` - the command is incomplete, read more data and retry
//! - `Err(ParseError)` - the stream is malformed and cannot be resynchronized
//!
//! A command is only returned once every element is present, so a partial
//! command is never handed to the dispatcher.
//!
//! ## Framed Mode
//!
//! Input starting with `*` is an array of tagged elements:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$4\r\nname\r\n:42\r\n   ->  ["SET", "name", "42"]
//! ```
//!
//! - `:` the rest of the line is taken verbatim
//! - `$` a length line, that many raw bytes, then two bytes that are skipped unchecked
//! - `*` a nested array, flattened into the parent command
//!
//! ## Inline Mode
//!
//! Anything else is a single line, split on spaces, with `"..."` grouping:
//!
//! ```text
//! SET key "hello world"\r\n   ->  ["SET", "key", "hello world"]
//! ```
//!
//! Lines end at the first `\r`; the byte after it is skipped without
//! checking that it is `\n`.

use crate::protocol::command::{Command, Frame};
use crate::protocol::reply::prefix;
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a command.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown element type tag inside a framed command
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// A count or length line is not a decimal integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Negative bulk string length
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Negative array length
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// A quoted inline token is never closed
    #[error("unbalanced quotes in request")]
    UnbalancedQuotes,

    /// Other protocol violations (nesting too deep, oversized inline line)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The bulk string exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of an inline line
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Upper bound on the capacity reserved up front for an array, whatever
/// count the client announces.
const MAX_PREALLOC: usize = 1024;

const LINE_END: u8 = b'\r';

/// Parser for framed and inline commands.
///
/// # Example
///
/// ```
/// use emberkv::protocol::CommandParser;
///
/// let mut parser = CommandParser::new();
/// let (cmd, consumed) = parser.parse(b"GET name\r\n").unwrap().unwrap();
/// assert_eq!(cmd.name().as_deref(), Some("GET"));
/// assert_eq!(consumed, 10);
/// ```
#[derive(Debug, Default)]
pub struct CommandParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl CommandParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one command from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        self.depth = 0;

        match buf.first() {
            None => Ok(None),
            Some(&prefix::ARRAY) => match self.parse_array(buf, 1)? {
                Some((frames, consumed)) => Ok(Some((Command::from(frames), consumed))),
                None => Ok(None),
            },
            Some(_) => parse_inline(buf),
        }
    }

    /// Parses the body of an array whose `*` sits just before `pos`.
    ///
    /// Returns the decoded elements and the position after the array.
    fn parse_array(&mut self, buf: &[u8], pos: usize) -> ParseResult<Option<(Vec<Frame>, usize)>> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        let (count_line, mut pos) = match read_line(buf, pos) {
            Some(line) => line,
            None => return Ok(None),
        };

        let count = parse_decimal(count_line)?;
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }
        let count = count as usize;

        let mut frames = Vec::with_capacity(count.min(MAX_PREALLOC));

        self.depth += 1;

        for _ in 0..count {
            let tag = match buf.get(pos) {
                Some(&tag) => tag,
                None => return Ok(None),
            };

            let element = match tag {
                prefix::INTEGER => read_line(buf, pos + 1)
                    .map(|(text, next)| (Frame::Arg(Bytes::copy_from_slice(text)), next)),
                prefix::BULK_STRING => parse_bulk(buf, pos + 1)?
                    .map(|(data, next)| (Frame::Arg(data), next)),
                prefix::ARRAY => self
                    .parse_array(buf, pos + 1)?
                    .map(|(nested, next)| (Frame::Array(nested), next)),
                other => return Err(ParseError::UnknownPrefix(other)),
            };

            match element {
                Some((frame, next)) => {
                    frames.push(frame);
                    pos = next;
                }
                None => return Ok(None),
            }
        }

        self.depth -= 1;

        Ok(Some((frames, pos)))
    }
}

/// Parses a bulk string whose `$` sits just before `pos`.
fn parse_bulk(buf: &[u8], pos: usize) -> ParseResult<Option<(Bytes, usize)>> {
    let (length_line, data_start) = match read_line(buf, pos) {
        Some(line) => line,
        None => return Ok(None),
    };

    let length = parse_decimal(length_line)?;
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }
    let length = length as usize;

    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    // Payload plus the two framing bytes, which are skipped unchecked.
    let end = data_start + length + 2;
    if buf.len() < end {
        return Ok(None);
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((data, end)))
}

/// Parses one inline line starting at the front of `buf`.
fn parse_inline(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    let (line, consumed) = match read_line(buf, 0) {
        Some(line) => line,
        None if buf.len() > MAX_INLINE_SIZE => {
            return Err(ParseError::ProtocolError(
                "too big inline request".to_string(),
            ))
        }
        None => return Ok(None),
    };

    let args = tokenize_inline(line)?;
    Ok(Some((Command::new(args), consumed)))
}

/// Splits an inline line into arguments.
///
/// Runs of spaces separate tokens. A token starting with `"` runs to the
/// next unescaped `"`; inside it `\"` is a literal quote and every other
/// byte is kept as is. Empty tokens are dropped.
pub fn tokenize_inline(line: &[u8]) -> ParseResult<Vec<Bytes>> {
    let mut args = Vec::new();
    let mut pos = 0;

    while pos < line.len() {
        while line.get(pos) == Some(&b' ') {
            pos += 1;
        }
        if pos >= line.len() {
            break;
        }

        let token = if line[pos] == b'"' {
            pos += 1;
            let mut token = Vec::new();
            loop {
                match line.get(pos) {
                    None => return Err(ParseError::UnbalancedQuotes),
                    Some(b'"') => {
                        pos += 1;
                        break;
                    }
                    Some(b'\\') if line.get(pos + 1) == Some(&b'"') => {
                        token.push(b'"');
                        pos += 2;
                    }
                    Some(&byte) => {
                        token.push(byte);
                        pos += 1;
                    }
                }
            }
            token
        } else {
            let start = pos;
            while pos < line.len() && line[pos] != b' ' {
                pos += 1;
            }
            line[start..pos].to_vec()
        };

        if !token.is_empty() {
            args.push(Bytes::from(token));
        }
    }

    Ok(args)
}

/// Reads a line starting at `pos`.
///
/// The line ends at the first `\r`, and one more byte (normally `\n`) is
/// skipped without being checked. Returns the line content and the
/// position after the skipped byte, or `None` if the line is incomplete.
#[inline]
fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let cr = rest.iter().position(|&b| b == LINE_END)?;
    if cr + 1 >= rest.len() {
        return None;
    }
    Some((&rest[..cr], pos + cr + 2))
}

fn parse_decimal(line: &[u8]) -> ParseResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Helper function to parse a single command from bytes.
pub fn parse_command(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    CommandParser::new().parse(buf)
}
