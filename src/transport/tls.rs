/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! TLS layered on a connected byte transport, using `openssl`'s blocking
//! `SslStream` driven through a manual non-blocking handshake loop instead
//! of an async adapter.

use super::Transport;
use crate::error::{Error, Result};
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslStream, SslVerifyMode};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

/// The subset of socket operations the TLS handshake loop and the steady
/// state deadline plumbing need, implemented for both concrete transports
/// so [`TlsTransport`] can be layered on either.
pub(crate) trait RawSocket: Read + Write + AsRawFd + std::fmt::Debug + Send {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_nodelay(&self, _nodelay: bool) -> io::Result<()> {
        Ok(())
    }
}

impl RawSocket for TcpStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
    fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        TcpStream::set_nodelay(self, nodelay)
    }
}

impl RawSocket for UnixStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixStream::set_nonblocking(self, nonblocking)
    }
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_write_timeout(self, timeout)
    }
}

/// Opaque TLS parameters forwarded from [`crate::Config::with_ssl_params`].
#[derive(Debug, Clone, Default)]
pub struct TlsParams {
    pub ca_file: Option<String>,
    pub verify: bool,
}

impl TlsParams {
    pub fn from_map(map: &std::collections::HashMap<String, String>) -> Self {
        let verify = match map.get("verify").map(String::as_str) {
            Some("0") | Some("false") => false,
            _ => true,
        };
        Self {
            ca_file: map.get("ca_file").cloned(),
            verify,
        }
    }
}

pub struct TlsTransport<S: RawSocket> {
    stream: SslStream<S>,
}

impl<S: RawSocket> TlsTransport<S> {
    /// Drive the handshake to completion over `socket`, alternating between
    /// issuing the handshake step and waiting for the descriptor to become
    /// readable or writable, honoring `connect_timeout` on every wait.
    pub fn connect(
        socket: S,
        host: &str,
        params: &TlsParams,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let deadline = connect_timeout.map(|d| Instant::now() + d);
        let fd = socket.as_raw_fd();

        let mut builder = SslConnector::builder(SslMethod::tls()).map_err(ssl_err)?;
        if !params.verify {
            builder.set_verify(SslVerifyMode::NONE);
        }
        if let Some(ca_file) = &params.ca_file {
            builder.set_ca_file(ca_file).map_err(ssl_err)?;
        }
        let connector = builder.build();
        let configuration = connector.configure().map_err(ssl_err)?;

        socket.set_nonblocking(true).map_err(Error::Io)?;

        let mut handshake = match configuration.connect(host, socket) {
            Ok(stream) => return Self::finish(stream),
            Err(HandshakeError::WouldBlock(mid)) => mid,
            Err(e) => return Err(handshake_err(e)),
        };
        loop {
            // The handshake can stall on either direction (a renegotiation or
            // a split record can make the next step want a write even though
            // we're mid-`connect`), so wait on both rather than tracking
            // which one OpenSSL last reported.
            super::poll_either(fd, deadline)?;
            match handshake.handshake() {
                Ok(stream) => return Self::finish(stream),
                Err(HandshakeError::WouldBlock(mid)) => handshake = mid,
                Err(e) => return Err(handshake_err(e)),
            }
        }
    }

    fn finish(stream: SslStream<S>) -> Result<Self> {
        stream.get_ref().set_nonblocking(false).map_err(Error::Io)?;
        Ok(Self { stream })
    }
}

fn ssl_err(e: openssl::error::ErrorStack) -> Error {
    Error::Connection(format!("TLS setup failed: {e}"))
}

fn handshake_err<S: std::fmt::Debug>(e: HandshakeError<S>) -> Error {
    Error::Connection(format!("TLS handshake failed: {e}"))
}

impl<S: RawSocket> Read for TlsTransport<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: RawSocket> Write for TlsTransport<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<S: RawSocket> Transport for TlsTransport<S> {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.get_ref().set_read_timeout(timeout).map_err(Error::Io)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.get_ref().set_write_timeout(timeout).map_err(Error::Io)
    }

    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream.get_ref().set_nodelay(nodelay).map_err(Error::Io)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown();
    }
}
