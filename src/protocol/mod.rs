//! Wire Protocol
//!
//! Decoding of client requests and encoding of replies.
//!
//! Requests come in two shapes: framed RESP arrays
//! (`*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`) and legacy inline lines
//! (`GET name\r\n`). Both decode to the same flat [`Command`].
//!
//! ## Modules
//!
//! - `command`: the decoded [`Command`] and the nested-array flattening step
//! - `parser`: incremental parser over a byte buffer
//! - `decoder`: async wrapper that reads from a stream until a command is complete
//! - `reply`: [`Reply`] values and their serialization
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{parse_command, Reply};
//!
//! let (cmd, consumed) = parse_command(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(cmd.name().as_deref(), Some("GET"));
//! assert_eq!(consumed, 23);
//!
//! assert_eq!(Reply::bulk("Ariz").serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod decoder;
pub mod parser;
pub mod reply;

pub use command::{Command, Frame};
pub use decoder::{DecodeError, Decoder};
pub use parser::{parse_command, CommandParser, ParseError, ParseResult};
pub use reply::Reply;
