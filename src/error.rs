/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! Structured error taxonomy for the client.
//!
//! Every error the crate can produce is one variant of [`Error`]. A variant
//! may be further classified by code-prefix (e.g. a command error whose
//! prefix is `WRONGPASS` is also an authentication failure) via the
//! `is_*` helpers below, letting a single wire tag carry more than one
//! meaning.

use std::fmt;
use std::io;

/// A coarse classification of an [`Error`], useful for `match`-free triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown protocol byte, unexpected EOF, or a socket syscall failure.
    Connection,
    /// Deadline exceeded while opening a transport or driving a TLS handshake.
    ConnectTimeout,
    /// Deadline exceeded while reading a reply.
    ReadTimeout,
    /// Deadline exceeded while writing a command.
    WriteTimeout,
    /// The server replied with a simple or blob error frame.
    Command,
}

/// The code prefixes this crate knows how to sub-classify. Anything else
/// falls back to a generic command error.
const AUTH_CODES: &[&str] = &["WRONGPASS", "NOAUTH"];
const PERM_CODES: &[&str] = &["NOPERM"];
const REDIRECT_CODES: &[&str] = &["MOVED", "ASK"];

/// A protocol, transport or server-reported error.
#[derive(Debug)]
pub enum Error {
    /// The stream is no longer usable: bad framing, reset, or a syscall error.
    Connection(String),
    /// Raw I/O failure surfaced from the underlying transport.
    Io(io::Error),
    /// The connect/TLS-handshake deadline elapsed.
    ConnectTimeout,
    /// The read deadline elapsed.
    ReadTimeout,
    /// The write deadline elapsed.
    WriteTimeout,
    /// The server reported an error for a command (a `-` or `!` frame).
    Command {
        /// The whitespace-delimited prefix, e.g. `WRONGTYPE`.
        code: String,
        /// The remainder of the error line.
        message: String,
    },
}

impl Error {
    /// Construct a command error, splitting the code prefix off the message
    /// the same way the decoder does when it first sees the frame.
    pub fn command(line: &str) -> Self {
        match line.split_once(' ') {
            Some((code, message)) => Error::Command {
                code: code.to_owned(),
                message: message.to_owned(),
            },
            None => Error::Command {
                code: line.to_owned(),
                message: String::new(),
            },
        }
    }

    /// This error's coarse [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) | Error::Io(_) => ErrorKind::Connection,
            Error::ConnectTimeout => ErrorKind::ConnectTimeout,
            Error::ReadTimeout => ErrorKind::ReadTimeout,
            Error::WriteTimeout => ErrorKind::WriteTimeout,
            Error::Command { .. } => ErrorKind::Command,
        }
    }

    /// The server error code prefix, if this is a command error.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Command { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Whether this error's transport-level effect must close the stream.
    ///
    /// True for everything except a plain command error, which the server
    /// can keep replying after. A *read-timeout* closes the stream under
    /// this default: outside a scoped `with_timeout` call, an elapsed read
    /// deadline means the reply may still be in flight, and letting the
    /// next call's read pick it up would mis-frame the wire. Callers that
    /// scope their own read (`blocking_call`, `PubSub::next_event`) must
    /// intercept `Error::ReadTimeout` themselves before consulting this --
    /// there the timeout is an expected "no data yet", not desynchronization.
    pub fn closes_stream(&self) -> bool {
        !matches!(self, Error::Command { .. })
    }

    /// Whether this is a command error reporting a failed authentication.
    pub fn is_authentication(&self) -> bool {
        self.code().is_some_and(|c| AUTH_CODES.contains(&c))
    }

    /// Whether this is a command error reporting a missing permission.
    pub fn is_permission(&self) -> bool {
        self.code().is_some_and(|c| PERM_CODES.contains(&c))
    }

    /// Whether this is a cluster-redirection hint (`MOVED`/`ASK`).
    pub fn is_redirect(&self) -> bool {
        self.code().is_some_and(|c| REDIRECT_CODES.contains(&c))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(msg) => write!(f, "connection error: {msg}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::ConnectTimeout => write!(f, "connect timed out"),
            Error::ReadTimeout => write!(f, "read timed out"),
            Error::WriteTimeout => write!(f, "write timed out"),
            Error::Command { code, message } => write!(f, "({code}) {message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::ReadTimeout,
            _ => Error::Io(e),
        }
    }
}

/// A generic result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
