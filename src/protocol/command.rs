//! Decoded Commands
//!
//! A [`Command`] is the flat, ordered argument list produced by the parser.
//! `args[0]` is the command name; [`Command::name`] is just its upper-cased
//! view.
//!
//! ## Nested Arrays
//!
//! The framed encoding allows an element to be another array. The parser
//! keeps that structure as a [`Frame`] tree and the tree is flattened in
//! exactly one place, `impl From<Vec<Frame>> for Command`. The flattening
//! loses the nesting (`*2 :1 *2 :2 :3` becomes `["1", "2", "3"]`); a
//! hierarchical command type would replace only that conversion.

use bytes::Bytes;

/// One decoded element of a framed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An integer-tagged or bulk-string element.
    Arg(Bytes),
    /// A nested array.
    Array(Vec<Frame>),
}

/// A single request: command name plus arguments, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// The command name, upper-cased for dispatch.
    ///
    /// Returns `None` for an empty command (e.g. a blank inline line).
    pub fn name(&self) -> Option<String> {
        self.args
            .first()
            .map(|name| String::from_utf8_lossy(name).to_uppercase())
    }

    /// The command name exactly as the client sent it.
    pub fn raw_name(&self) -> Option<String> {
        self.args
            .first()
            .map(|name| String::from_utf8_lossy(name).into_owned())
    }

    /// All arguments, including the name at index 0.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of arguments, including the name.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn into_args(self) -> Vec<Bytes> {
        self.args
    }
}

impl From<Vec<Frame>> for Command {
    fn from(frames: Vec<Frame>) -> Self {
        let mut args = Vec::with_capacity(frames.len());
        flatten_into(frames, &mut args);
        Command { args }
    }
}

fn flatten_into(frames: Vec<Frame>, args: &mut Vec<Bytes>) {
    for frame in frames {
        match frame {
            Frame::Arg(arg) => args.push(arg),
            Frame::Array(nested) => flatten_into(nested, args),
        }
    }
}
