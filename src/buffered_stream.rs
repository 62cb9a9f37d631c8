/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! A line- and length-aware read buffer wrapped around a [`Transport`]. Reads
//! accumulate into a `BytesMut` so a short read that lands mid-frame is
//! simply left for the next call to pick up; `fill_buf` blocks on
//! `Transport::read` rather than driving an async `read_buf`.

use crate::error::{Error, Result};
use crate::transport::Transport;
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Initial (and per-fill) read chunk size.
const BUF_CAP: usize = 8 * 1024;

/// A buffered, deadline-aware byte stream over a connected [`Transport`].
///
/// All of `read_line`, `read_exact` and `write` operate against a single
/// `BytesMut` accumulator so a short read that lands mid-frame is simply
/// left for the next call to pick up; nothing here ever blocks waiting for
/// a specific amount of data beyond what was asked for.
pub(crate) struct BufferedStream {
    transport: Box<dyn Transport>,
    buf: BytesMut,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl BufferedStream {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Result<Self> {
        transport.set_read_timeout(read_timeout)?;
        transport.set_write_timeout(write_timeout)?;
        Ok(Self {
            transport,
            buf: BytesMut::with_capacity(BUF_CAP),
            read_timeout,
            write_timeout,
        })
    }

    /// Write `bytes` to the transport, failing *write-timeout* if the
    /// deadline elapses before every byte is accepted.
    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write_all(bytes).map_err(classify_write)
    }

    /// Force any data buffered by the transport (e.g. a TLS record) out to
    /// the wire.
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.transport.flush().map_err(classify_write)
    }

    /// Read up to, and excluding, the next CRLF; the CRLF itself is
    /// consumed from the buffer but not returned.
    pub(crate) fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos).to_vec();
                self.buf.advance(2);
                return Ok(line);
            }
            self.fill_buf()?;
        }
    }

    /// Read exactly `n` bytes, blocking across as many transport reads as
    /// needed.
    pub(crate) fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        while self.buf.len() < n {
            self.fill_buf()?;
        }
        Ok(self.buf.split_to(n).to_vec())
    }

    /// Block on the transport for more bytes and append them to `buf`.
    /// Retries transparently on `Interrupted`; any other timeout or I/O
    /// error is surfaced, and a clean EOF is reported as a connection error
    /// since no RESP3 frame ends with the stream simply closing.
    fn fill_buf(&mut self) -> Result<()> {
        let mut scratch = [0u8; BUF_CAP];
        loop {
            match self.transport.read(&mut scratch) {
                Ok(0) => return Err(Error::Connection("connection closed by peer".into())),
                Ok(n) => {
                    self.buf.extend_from_slice(&scratch[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(Error::ReadTimeout),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Run `f` with both deadlines temporarily overridden to `duration`,
    /// restoring the previous deadlines before returning -- on success,
    /// on a command error, and on a read- or write-timeout alike.
    pub(crate) fn with_timeout<F, R>(&mut self, duration: Duration, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let prev_read = self.read_timeout;
        let prev_write = self.write_timeout;
        self.set_timeouts(Some(duration), Some(duration))?;
        let result = f(self);
        let restored = self.set_timeouts(prev_read, prev_write);
        match result {
            Ok(value) => restored.map(|()| value),
            Err(e) => Err(e),
        }
    }

    fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> Result<()> {
        self.transport.set_read_timeout(read)?;
        self.transport.set_write_timeout(write)?;
        self.read_timeout = read;
        self.write_timeout = write;
        Ok(())
    }

    pub(crate) fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.transport.set_nodelay(nodelay)
    }

    pub(crate) fn close(&mut self) {
        self.transport.close();
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn classify_write(e: io::Error) -> Error {
    if is_timeout(&e) {
        Error::WriteTimeout
    } else {
        Error::Io(e)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
