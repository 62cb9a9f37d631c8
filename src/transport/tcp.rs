/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

use super::Transport;
use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// A TCP transport with Nagle's algorithm disabled; pipelines and
/// transactions otherwise pay an extra round trip.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Resolve `host:port` and connect to the first address that accepts
    /// within `connect_timeout` (no deadline blocks indefinitely).
    pub fn connect(host: &str, port: u16, connect_timeout: Option<Duration>) -> Result<Self> {
        let deadline = connect_timeout.map(|d| Instant::now() + d);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(Error::Io)?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Connection(format!("no addresses resolved for {host}:{port}")));
        }
        let mut last_err = None;
        for addr in addrs {
            let remaining = match deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::ConnectTimeout);
                    }
                    Some(deadline - now)
                }
            };
            let attempt = match remaining {
                Some(remaining) => TcpStream::connect_timeout(&addr, remaining),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(Error::Io)?;
                    return Ok(Self { stream });
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(Error::ConnectTimeout),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.map(Error::Io).unwrap_or(Error::ConnectTimeout))
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub(crate) fn try_clone(&self) -> Result<TcpStream> {
        self.stream.try_clone().map_err(Error::Io)
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Error::Io)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout).map_err(Error::Io)
    }

    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream.set_nodelay(nodelay).map_err(Error::Io)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
