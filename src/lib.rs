/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! A synchronous client for a key-value data store that speaks RESP3: a
//! versioned, self-describing wire protocol.
//!
//! This crate is the protocol engine and nothing above it -- no command
//! spelling, no connection pool, no cluster routing. It is Unix-only: the
//! TLS handshake loop and the Unix-domain-socket transport both go straight
//! through `std::os::unix` and `libc::poll` rather than a portable polling
//! abstraction. It owns three layers, leaves-first:
//!
//! - [`transport`]: TCP, Unix-domain and TLS byte streams with
//!   connect/read/write deadlines.
//! - [`resp`]: the RESP3 codec -- encoding commands, decoding every value
//!   kind including streaming aggregates and attribute-prefixed values.
//! - [`session`]: the connection state machine built on top of both --
//!   handshake, single calls, pipelines, `MULTI`/`EXEC` transactions, cursor
//!   scans, and the hand-off into [`pubsub`] mode.
//!
//! ```no_run
//! use resp3::{Config, Session};
//!
//! let mut session = Session::new(Config::new().with_host("localhost"));
//! let pong = session.call(["PING"])?;
//! # Ok::<(), resp3::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod pubsub;
pub mod resp;
pub mod session;
pub mod transport;

pub(crate) mod buffered_stream;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use pubsub::PubSub;
pub use resp::Value;
pub use session::{Pipeline, Scan, Session};
