/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

use super::Transport;
use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// A Unix-domain socket transport. Opened unconditionally -- no connect
/// deadline applies, since a local socket is always reachable.
pub struct UnixTransport {
    stream: UnixStream,
}

impl UnixTransport {
    pub fn connect(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(Error::Io)?;
        Ok(Self { stream })
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub(crate) fn try_clone(&self) -> Result<UnixStream> {
        self.stream.try_clone().map_err(Error::Io)
    }
}

impl Read for UnixTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for UnixTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for UnixTransport {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Error::Io)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_write_timeout(timeout).map_err(Error::Io)
    }

    fn set_nodelay(&self, _nodelay: bool) -> Result<()> {
        // Unix-domain sockets have no Nagle-style coalescing to disable.
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
