/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! Byte-oriented transports: TCP, Unix-domain sockets, and TLS layered on
//! either. [`crate::buffered_stream::BufferedStream`] is the only consumer
//! of this module outside of its own constructors.

mod tcp;
mod tls;
#[cfg(unix)]
mod unix;

pub use tcp::TcpTransport;
pub use tls::{TlsParams, TlsTransport};
#[cfg(unix)]
pub use unix::UnixTransport;

use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// A full-duplex byte stream with per-operation deadlines.
///
/// Implementors are expected to be thin wrappers around a blocking socket:
/// deadlines are realized with `SO_RCVTIMEO`/`SO_SNDTIMEO`-style socket
/// options (see each impl's `set_read_timeout`/`set_write_timeout`), not by
/// this crate re-implementing a reactor.
pub trait Transport: Read + Write + Send {
    /// Install (or clear, with `None`) the read deadline used by every
    /// subsequent `read` call until changed again.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;
    /// Install (or clear, with `None`) the write deadline used by every
    /// subsequent `write` call until changed again.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()>;
    /// Disable Nagle's algorithm; a no-op for transports that have no notion
    /// of it (Unix-domain sockets).
    fn set_nodelay(&self, nodelay: bool) -> Result<()>;
    /// Release the underlying socket. Best-effort: a failure here is not
    /// escalated since the caller is already tearing the connection down.
    fn close(&mut self);
}

/// Poll a raw descriptor for readability or writability, honoring an
/// absolute deadline. Used exclusively by [`TlsTransport::connect`] to drive
/// the handshake's non-blocking step/wait loop -- OpenSSL can want either
/// direction at any step regardless of which way `connect` is facing, so we
/// wait on both rather than tracking which one was last reported. The
/// steady-state data path relies on socket-level timeouts instead.
pub(crate) fn poll_either(fd: RawFd, deadline: Option<Instant>) -> Result<()> {
    let events = libc::POLLIN | libc::POLLOUT;
    let timeout_ms = match deadline {
        None => -1,
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ConnectTimeout);
            }
            (deadline - now).as_millis().min(i32::MAX as u128) as i32
        }
    };
    let mut pfd = libc::pollfd { fd, events, revents: 0 };
    // SAFETY: `pfd` is a valid, exclusively-owned pollfd for the duration of
    // this call and `nfds` matches the single-element array.
    let rc = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };
    match rc {
        0 => Err(Error::ConnectTimeout),
        n if n < 0 => Err(Error::Io(std::io::Error::last_os_error())),
        _ => Ok(()),
    }
}

/// Turn an optional [`Duration`] into an optional absolute deadline anchored
/// at "now".
pub(crate) fn deadline_from(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|d| Instant::now() + d)
}
