//! Command Handler
//!
//! Validates a decoded [`Command`], runs it against the [`StorageEngine`]
//! and returns an [`Outcome`]: the reply plus whether the session should
//! keep reading.
//!
//! ## Supported Commands
//!
//! - `GET key` - bulk string, or nil if the key is absent or expired
//! - `SET key value [NX|XX] [EX seconds|PX milliseconds]` - `+OK`, or nil if NX/XX failed
//! - `DEL key [key ...]` - number of keys removed
//! - `PING` - pong
//! - `ECHO message` - the message as a bulk string
//! - `QUIT` - `+OK`, then the session ends
//!
//! Anything else gets `-ERR unknown command '<name>'`. Command errors never
//! end the session and never touch the store.

use crate::protocol::{Command, Reply};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Reply quirks kept for older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compatibility {
    /// Byte-for-byte compatible with the historical server:
    /// - `PING` answers `$PONG\r\n`
    /// - `GET` unquotes values that are stored wrapped in `"..."`
    #[default]
    Legacy,
    /// `PING` answers `+PONG\r\n` and `GET` returns values verbatim.
    Standard,
}

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: Reply,
    /// `false` once the client asked to end the session.
    pub keep_open: bool,
}

impl Outcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            keep_open: true,
        }
    }

    fn close(reply: Reply) -> Self {
        Self {
            reply,
            keep_open: false,
        }
    }
}

/// Existence precondition requested with `SET ... NX|XX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetCondition {
    IfAbsent,
    IfPresent,
}

/// Dispatches commands to their handlers.
///
/// Cheap to clone; every session gets its own copy sharing one store.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    compatibility: Compatibility,
}

impl CommandHandler {
    /// Creates a handler in [`Compatibility::Legacy`] mode.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self::with_compatibility(storage, Compatibility::default())
    }

    pub fn with_compatibility(storage: Arc<StorageEngine>, compatibility: Compatibility) -> Self {
        Self {
            storage,
            compatibility,
        }
    }

    /// Executes a command and returns the reply to send.
    ///
    /// # Example
    ///
    /// ```
    /// use emberkv::commands::CommandHandler;
    /// use emberkv::protocol::{parse_command, Reply};
    /// use emberkv::storage::StorageEngine;
    /// use std::sync::Arc;
    ///
    /// let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
    /// let (cmd, _) = parse_command(b"SET name Ariz\r\n").unwrap().unwrap();
    /// let outcome = handler.execute(&cmd);
    /// assert_eq!(outcome.reply, Reply::ok());
    /// assert!(outcome.keep_open);
    /// ```
    pub fn execute(&self, command: &Command) -> Outcome {
        let (name, raw_name) = match (command.name(), command.raw_name()) {
            (Some(name), Some(raw_name)) => (name, raw_name),
            _ => return Outcome::reply(Reply::error("ERR empty command")),
        };
        let args = &command.args()[1..];

        trace!(command = %name, args = args.len(), "Dispatching command");

        let reply = match name.as_str() {
            "GET" => self.cmd_get(&raw_name, args),
            "SET" => self.cmd_set(&raw_name, args),
            "DEL" => self.cmd_del(&raw_name, args),
            "PING" => self.cmd_ping(&raw_name, args),
            "ECHO" => self.cmd_echo(&raw_name, args),
            "QUIT" => return self.cmd_quit(&raw_name, args),
            _ => {
                debug!(command = %raw_name, "Command not supported");
                Reply::error(format!("ERR unknown command '{}'", raw_name))
            }
        };

        Outcome::reply(reply)
    }

    /// GET key
    fn cmd_get(&self, name: &str, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Reply::wrong_arity(name);
        };

        match self.storage.get(key) {
            Some(value) if self.compatibility == Compatibility::Legacy => {
                Reply::bulk(unquote_legacy(value))
            }
            Some(value) => Reply::bulk(value),
            None => Reply::nil(),
        }
    }

    /// SET key value [NX|XX] [EX seconds|PX milliseconds]
    fn cmd_set(&self, name: &str, args: &[Bytes]) -> Reply {
        if !(2..=5).contains(&args.len()) {
            return Reply::wrong_arity(name);
        }

        let key = args[0].clone();
        let value = args[1].clone();
        let mut options = &args[2..];

        let mut condition = None;
        if let Some(flag) = options.first() {
            condition = match flag.to_ascii_uppercase().as_slice() {
                b"NX" => Some(SetCondition::IfAbsent),
                b"XX" => Some(SetCondition::IfPresent),
                _ => None,
            };
            if condition.is_some() {
                options = &options[1..];
            }
        }

        let ttl = match parse_expiration(name, options) {
            Ok(ttl) => ttl,
            Err(reply) => return reply,
        };

        if let Some(ttl) = ttl {
            debug!(ttl_ms = ttl.as_millis() as u64, "SET with expiration");
        }

        let written = match (condition, ttl) {
            (None, None) => {
                self.storage.set(key, value);
                true
            }
            (None, Some(ttl)) => {
                self.storage.set_with_ttl(key, value, ttl);
                true
            }
            (Some(SetCondition::IfAbsent), ttl) => self.storage.set_if_absent(key, value, ttl),
            (Some(SetCondition::IfPresent), ttl) => self.storage.set_if_present(key, value, ttl),
        };

        if written {
            Reply::ok()
        } else {
            Reply::nil()
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, name: &str, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Reply::wrong_arity(name);
        }

        Reply::integer(self.storage.delete_many(args) as i64)
    }

    /// PING
    fn cmd_ping(&self, name: &str, args: &[Bytes]) -> Reply {
        if !args.is_empty() {
            return Reply::wrong_arity(name);
        }

        match self.compatibility {
            Compatibility::Legacy => Reply::LegacyPong,
            Compatibility::Standard => Reply::status("PONG"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, name: &str, args: &[Bytes]) -> Reply {
        match args {
            [message] => Reply::bulk(message.clone()),
            _ => Reply::wrong_arity(name),
        }
    }

    /// QUIT
    fn cmd_quit(&self, name: &str, args: &[Bytes]) -> Outcome {
        if !args.is_empty() {
            return Outcome::reply(Reply::wrong_arity(name));
        }

        debug!("Client requested QUIT");
        Outcome::close(Reply::ok())
    }
}

/// Parses the optional `EX seconds` / `PX milliseconds` pair of SET.
///
/// The expiry must be a positive integer whose deadline is representable
/// from now.
fn parse_expiration(name: &str, options: &[Bytes]) -> Result<Option<Duration>, Reply> {
    let (unit, amount) = match options {
        [] => return Ok(None),
        [unit, amount] => (unit, amount),
        _ => return Err(Reply::error("ERR syntax error")),
    };

    let millis_per_unit: u64 = match unit.to_ascii_uppercase().as_slice() {
        b"EX" => 1000,
        b"PX" => 1,
        _ => return Err(Reply::error("ERR syntax error")),
    };

    let now = Instant::now();
    std::str::from_utf8(amount)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|&n| n > 0)
        .and_then(|n| (n as u64).checked_mul(millis_per_unit))
        .map(Duration::from_millis)
        .filter(|&ttl| now.checked_add(ttl).is_some())
        .map(Some)
        .ok_or_else(|| Reply::error(format!("ERR invalid expire time in '{}' command", name)))
}

/// Strips one level of `"..."` quoting from a stored value.
///
/// Applies only when the value starts with `"` and its first unescaped `"`
/// after that is the last byte. Inside, `\"` becomes `"`; no other escape is
/// recognized. Any other value is returned unchanged.
fn unquote_legacy(value: Bytes) -> Bytes {
    let Some(inner) = value.strip_prefix(b"\"") else {
        return value;
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        match inner[i] {
            b'\\' if inner.get(i + 1) == Some(&b'"') => {
                out.push(b'"');
                i += 2;
            }
            b'"' if i + 1 == inner.len() => return Bytes::from(out),
            b'"' => break,
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    value
}
