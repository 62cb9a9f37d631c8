/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! The publish/subscribe handle produced by [`crate::session::Session::pubsub`].
//!
//! Taking ownership of the stream is the point: once a [`Session`] hands it
//! off, the half-duplex discipline inverts (writes become fire-and-forget,
//! reads become a server-driven event source), and the two modes must never
//! be reachable through the same handle at the same time. Expressing the
//! hand-off as a move rather than a shared reference makes that a property
//! the type system checks rather than a runtime invariant to remember.
//!
//! [`Session`]: crate::session::Session

use std::time::Duration;

use crate::buffered_stream::BufferedStream;
use crate::error::{Error, Result};
use crate::resp::{self, Value};

/// A stream handed off from a [`crate::session::Session`], now dedicated to
/// pub/sub traffic.
pub struct PubSub {
    stream: BufferedStream,
}

impl PubSub {
    pub(crate) fn new(stream: BufferedStream) -> Self {
        Self { stream }
    }

    /// Send a command (e.g. `SUBSCRIBE channel`) without waiting for or
    /// decoding a reply -- subscription acknowledgements and published
    /// messages both arrive later as ordinary push frames via
    /// [`Self::next_event`].
    pub fn call<I, A>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let mut buf = Vec::new();
        resp::encode_command(&mut buf, args);
        self.stream.write(&buf)?;
        self.stream.flush()
    }

    /// Decode the next server-pushed value. `timeout` scopes the read
    /// deadline for this call only; a `None` timeout blocks indefinitely.
    /// An elapsed deadline returns `Ok(None)` rather than an error -- an
    /// idle channel is normal, not a protocol fault -- and leaves the
    /// stream open for a subsequent call to pick up the next push.
    pub fn next_event(&mut self, timeout: Option<Duration>) -> Result<Option<Value>> {
        let decoded = match timeout {
            Some(d) => self.stream.with_timeout(d, resp::decode),
            None => resp::decode(&mut self.stream),
        };
        match decoded {
            Ok(value) => Ok(Some(value)),
            Err(Error::ReadTimeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release the underlying transport. Idempotent in effect: dropping a
    /// `PubSub` without calling this still closes the socket.
    pub fn close(mut self) {
        self.stream.close();
    }
}
