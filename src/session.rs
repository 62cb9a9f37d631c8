/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! The connection-carrying half of the crate: handshake, single-call
//! dispatch, pipelining, transactions, cursor scans and the hand-off into
//! pub/sub mode.
//!
//! [`Session`] owns at most one live [`BufferedStream`] at a time. Every
//! public operation that touches the network starts by lazily opening and
//! handshaking that stream if it isn't already there, and tears it down on
//! any failure that the error taxonomy says should close the connection --
//! the next call simply reopens and re-handshakes on a fresh transport.

use std::collections::VecDeque;
use std::time::Duration;

use crate::buffered_stream::BufferedStream;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pubsub::PubSub;
use crate::resp::{self, Value};
use crate::transport::{TcpTransport, TlsParams, TlsTransport, Transport};
#[cfg(unix)]
use crate::transport::UnixTransport;

/// A synchronous handle to one logical connection.
///
/// Not internally shared: the documented concurrency model is one caller at
/// a time, with any pooling left to an external collaborator. Nothing here
/// uses interior mutability for cross-thread sharing, so a `Session` is
/// `Send` but callers wanting concurrent access build their own
/// synchronization around it.
pub struct Session {
    config: Config,
    stream: Option<BufferedStream>,
}

impl Session {
    /// Build a session from `config`. No I/O happens until the first call.
    pub fn new(config: Config) -> Self {
        Self { config, stream: None }
    }

    /// Issue one command and decode its reply. A server-reported error is
    /// raised as [`Error::Command`]; any transport-level failure that the
    /// error taxonomy marks as connection-closing invalidates the stream so
    /// the next call reopens from scratch.
    pub fn call<I, A>(&mut self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let mut buf = Vec::new();
        resp::encode_command(&mut buf, args);
        self.dispatch_one(&buf)
    }

    /// Like [`Self::call`], but the read is wrapped in a scoped
    /// [`BufferedStream::with_timeout`]. A *read-timeout* is translated to
    /// `Ok(None)` rather than surfaced: the documented behavior for commands
    /// that themselves block server-side, where the client treats an
    /// elapsed deadline as "no data yet" rather than a framing problem.
    pub fn blocking_call<I, A>(&mut self, timeout: Option<Duration>, args: I) -> Result<Option<Value>>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let mut buf = Vec::new();
        resp::encode_command(&mut buf, args);
        self.ensure_connected()?;
        let decoded = {
            let stream = self.stream.as_mut().expect("just connected");
            let write_result = stream.write(&buf).and_then(|()| stream.flush());
            match write_result {
                Ok(()) => match timeout {
                    Some(d) => stream.with_timeout(d, resp::decode),
                    None => resp::decode(stream),
                },
                Err(e) => Err(e),
            }
        };
        match decoded {
            Ok(Value::CommandError { code, message }) => Err(Error::Command { code, message }),
            Ok(v) => Ok(Some(v)),
            Err(Error::ReadTimeout) => Ok(None),
            Err(e) => {
                if e.closes_stream() {
                    self.invalidate();
                }
                Err(e)
            }
        }
    }

    /// Start building a pipeline. Nothing is written to the wire until it is
    /// passed to [`Self::execute_pipeline`].
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new()
    }

    /// Write every command accumulated in `pipeline`, then decode exactly
    /// that many replies in order. If any slot holds a command error, the
    /// first one (by request index) is raised; otherwise all results are
    /// returned in request order, command errors included as values in
    /// slots that aren't the reported one. A slot built with
    /// [`Pipeline::add_with_timeout`] whose deadline elapses resolves to
    /// [`Value::Null`] rather than tearing the connection down, the same
    /// "no data yet" treatment [`Self::blocking_call`] gives a plain call.
    pub fn execute_pipeline(&mut self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        self.ensure_connected()?;
        if let Err(e) = self.write_and_flush(&pipeline.buf) {
            if e.closes_stream() {
                self.invalidate();
            }
            return Err(e);
        }
        let mut results = Vec::with_capacity(pipeline.overrides.len());
        let mut first_error: Option<Error> = None;
        for &read_timeout in &pipeline.overrides {
            let stream = self.stream.as_mut().expect("connected above");
            let decoded = match read_timeout {
                Some(d) => stream.with_timeout(d, resp::decode),
                None => resp::decode(stream),
            };
            match decoded {
                Ok(value @ Value::CommandError { .. }) => {
                    if first_error.is_none() {
                        if let Value::CommandError { code, message } = &value {
                            first_error = Some(Error::Command {
                                code: code.clone(),
                                message: message.clone(),
                            });
                        }
                    }
                    results.push(value);
                }
                Ok(value) => results.push(value),
                Err(Error::ReadTimeout) if read_timeout.is_some() => {
                    // This slot's read was inside its own scoped with_timeout,
                    // so the elapsed deadline doesn't mean the stream is
                    // desynchronized -- the server may still produce this
                    // reply later, the same case blocking_call handles.
                    results.push(Value::Null);
                }
                Err(e) => {
                    if e.closes_stream() {
                        self.invalidate();
                    }
                    return Err(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Run a `MULTI` / `EXEC` transaction.
    ///
    /// If `watch` is non-empty, issues `WATCH k1 ... kN` as a synchronous
    /// call before building the batch. `build` appends the commands to run
    /// inside the transaction; if it returns `Err` before the batch is
    /// dispatched, `UNWATCH` is issued and the failure is re-signaled
    /// without ever sending `MULTI`/`EXEC`. On success the batch is
    /// dispatched exactly like a pipeline and the `EXEC` reply -- the last
    /// element -- is returned.
    pub fn transaction<F>(&mut self, watch: &[&[u8]], build: F) -> Result<Value>
    where
        F: FnOnce(&mut Pipeline) -> Result<()>,
    {
        if !watch.is_empty() {
            let mut watch_cmd: Vec<&[u8]> = vec![b"WATCH"];
            watch_cmd.extend_from_slice(watch);
            self.call(watch_cmd)?;
        }
        let mut pipeline = Pipeline::new();
        pipeline.add(["MULTI"]);
        if let Err(e) = build(&mut pipeline) {
            // The builder itself failed, before anything was dispatched.
            // Re-issue UNWATCH synchronously and surface the original error.
            let _ = self.call(["UNWATCH"]);
            return Err(e);
        }
        pipeline.add(["EXEC"]);
        let mut results = self.execute_pipeline(&pipeline)?;
        Ok(results.pop().expect("EXEC is always the last slot"))
    }

    /// Iterate a cursor-based scan that takes no key argument (e.g. `SCAN`).
    pub fn scan_each<'a>(&'a mut self, verb: &str, args: &[&[u8]]) -> Scan<'a> {
        Scan::new(self, verb.as_bytes().to_vec(), None, args)
    }

    /// Iterate a cursor-based scan keyed to a collection (e.g. `HSCAN key`,
    /// `SSCAN key`).
    pub fn scan_key_each<'a>(&'a mut self, verb: &str, key: &[u8], args: &[&[u8]]) -> Scan<'a> {
        Scan::new(self, verb.as_bytes().to_vec(), Some(key.to_vec()), args)
    }

    /// Hand the current stream off to a [`PubSub`] handle. The session's own
    /// stream reference is cleared; the next call on `self` opens and
    /// handshakes a fresh transport.
    pub fn pubsub(&mut self) -> Result<PubSub> {
        self.ensure_connected()?;
        let stream = self.stream.take().expect("just connected");
        Ok(PubSub::new(stream))
    }

    /// Close the connection, if any, without signaling an error. Idempotent.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("session closed by caller");
        }
    }

    fn dispatch_one(&mut self, encoded: &[u8]) -> Result<Value> {
        self.ensure_connected()?;
        let decoded = self.write_and_flush(encoded).and_then(|()| {
            let stream = self.stream.as_mut().expect("connected above");
            resp::decode(stream)
        });
        match decoded {
            Ok(Value::CommandError { code, message }) => Err(Error::Command { code, message }),
            Ok(v) => Ok(v),
            Err(e) => {
                if e.closes_stream() {
                    self.invalidate();
                }
                Err(e)
            }
        }
    }

    fn write_and_flush(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().expect("ensure_connected called first");
        stream.write(bytes)?;
        stream.flush()
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        log::debug!("opening connection to {}", self.target_description());
        let transport = self.open_transport().map_err(|e| {
            log::warn!("failed to open transport: {e}");
            e
        })?;
        let mut stream = BufferedStream::new(transport, self.config.read_timeout, self.config.write_timeout)?;
        if let Err(e) = self.handshake(&mut stream) {
            stream.close();
            log::error!("handshake failed: {e}");
            return Err(e);
        }
        log::debug!("session connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn open_transport(&self) -> Result<Box<dyn Transport>> {
        if self.config.uses_unix_socket() {
            #[cfg(unix)]
            {
                let path = self.config.path.as_deref().expect("uses_unix_socket");
                let sock = UnixTransport::connect(path)?;
                if self.config.ssl {
                    let raw = sock.try_clone()?;
                    let params = TlsParams::from_map(&self.config.ssl_params);
                    let tls = TlsTransport::connect(raw, &self.config.host, &params, self.config.connect_timeout)?;
                    return Ok(Box::new(tls));
                }
                return Ok(Box::new(sock));
            }
            #[cfg(not(unix))]
            {
                return Err(Error::Connection("unix-domain sockets are unsupported on this platform".into()));
            }
        }
        let sock = TcpTransport::connect(&self.config.host, self.config.port, self.config.connect_timeout)?;
        if self.config.ssl {
            let raw = sock.try_clone()?;
            let params = TlsParams::from_map(&self.config.ssl_params);
            let tls = TlsTransport::connect(raw, &self.config.host, &params, self.config.connect_timeout)?;
            return Ok(Box::new(tls));
        }
        Ok(Box::new(sock))
    }

    /// `HELLO 3 [AUTH user pass]` followed by `SELECT db` if configured.
    fn handshake(&self, stream: &mut BufferedStream) -> Result<()> {
        let mut hello: Vec<Vec<u8>> = vec![b"HELLO".to_vec(), b"3".to_vec()];
        if let Some(password) = &self.config.password {
            hello.push(b"AUTH".to_vec());
            hello.push(self.config.username.clone().into_bytes());
            hello.push(password.clone().into_bytes());
        }
        send_and_expect_non_error(stream, hello)?;

        if let Some(db) = self.config.db {
            send_and_expect_non_error(stream, vec![b"SELECT".to_vec(), db.to_string().into_bytes()])?;
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            log::warn!("session faulted, stream closed");
        }
    }

    fn target_description(&self) -> String {
        match &self.config.path {
            Some(path) => path.clone(),
            None => format!("{}:{}", self.config.host, self.config.port),
        }
    }
}

fn send_and_expect_non_error(stream: &mut BufferedStream, args: Vec<Vec<u8>>) -> Result<Value> {
    let mut buf = Vec::new();
    resp::encode_command(&mut buf, args);
    stream.write(&buf)?;
    stream.flush()?;
    match resp::decode(stream)? {
        Value::CommandError { code, message } => Err(Error::Command { code, message }),
        v => Ok(v),
    }
}

/// A batch of encoded commands awaiting dispatch via
/// [`Session::execute_pipeline`], with a per-slot optional read-timeout
/// override.
pub struct Pipeline {
    buf: Vec<u8>,
    overrides: Vec<Option<Duration>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Append one command with no read-timeout override.
    pub fn add<I, A>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        resp::encode_command(&mut self.buf, args);
        self.overrides.push(None);
        self
    }

    /// Append one command whose reply read is wrapped in a scoped
    /// `with_timeout(read_timeout)`.
    pub fn add_with_timeout<I, A>(&mut self, read_timeout: Duration, args: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        resp::encode_command(&mut self.buf, args);
        self.overrides.push(Some(read_timeout));
        self
    }

    /// The number of commands accumulated so far.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// A lazy, non-restartable iterator over a cursor-based scan.
///
/// Each call to [`Iterator::next`] that runs dry on buffered elements issues
/// the scan verb again with the last cursor the server returned, comparing
/// cursors as plain text (never as numbers): a server may hand back a value
/// with leading zeros, and only the literal string `"0"` marks the end of
/// the traversal.
pub struct Scan<'a> {
    session: &'a mut Session,
    verb: Vec<u8>,
    key: Option<Vec<u8>>,
    extra_args: Vec<Vec<u8>>,
    cursor: String,
    buffered: VecDeque<Value>,
    done: bool,
}

impl<'a> Scan<'a> {
    fn new(session: &'a mut Session, verb: Vec<u8>, key: Option<Vec<u8>>, args: &[&[u8]]) -> Self {
        Self {
            session,
            verb,
            key,
            extra_args: args.iter().map(|a| a.to_vec()).collect(),
            cursor: "0".to_owned(),
            buffered: VecDeque::new(),
            done: false,
        }
    }

    fn fetch_next_batch(&mut self) -> Result<()> {
        let mut command: Vec<Vec<u8>> = vec![self.verb.clone()];
        if let Some(key) = &self.key {
            command.push(key.clone());
        }
        command.push(self.cursor.clone().into_bytes());
        command.extend(self.extra_args.iter().cloned());

        match self.session.call(command)? {
            Value::Array(Some(mut parts)) | Value::Push(mut parts) if parts.len() == 2 => {
                let elements = parts.pop().expect("len checked above");
                let cursor_value = parts.pop().expect("len checked above");
                self.cursor = cursor_text(&cursor_value)?;
                self.buffered.extend(scan_elements(elements)?);
                if self.cursor == "0" {
                    self.done = true;
                }
                Ok(())
            }
            other => Err(Error::Connection(format!(
                "malformed scan reply: expected a 2-element (cursor, elements) array, got {other:?}"
            ))),
        }
    }
}

fn cursor_text(value: &Value) -> Result<String> {
    match value {
        Value::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Ok(s.clone()),
        Value::Integer(n) => Ok(n.to_string()),
        other => Err(Error::Connection(format!("malformed scan cursor: {other:?}"))),
    }
}

fn scan_elements(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(Some(items)) | Value::Set(items) => Ok(items),
        other => Err(Error::Connection(format!("malformed scan elements: {other:?}"))),
    }
}

impl<'a> Iterator for Scan<'a> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        loop {
            if let Some(v) = self.buffered.pop_front() {
                return Some(Ok(v));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_next_batch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
