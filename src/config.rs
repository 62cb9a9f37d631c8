/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! Connection configuration.
//!
//! [`Config`] is a plain builder: construct with [`Config::new`] or
//! [`Config::default`] and chain `with_*` calls. Nothing here touches the
//! network; it is only consulted the first time a [`crate::Session`] needs
//! to open a transport.

use std::collections::HashMap;
use std::time::Duration;

/// Default server port, matching the data store's well-known listening port.
pub const DEFAULT_PORT: u16 = 6379;
/// Default phase timeout applied to connect/read/write unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default username sent during `HELLO 3 AUTH`.
pub const DEFAULT_USERNAME: &str = "default";

/// Connection parameters for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) path: Option<String>,
    pub(crate) username: String,
    pub(crate) password: Option<String>,
    pub(crate) db: Option<i64>,
    pub(crate) ssl: bool,
    pub(crate) ssl_params: HashMap<String, String>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            path: None,
            username: DEFAULT_USERNAME.to_owned(),
            password: None,
            db: None,
            ssl: false,
            ssl_params: HashMap::new(),
            connect_timeout: Some(DEFAULT_TIMEOUT),
            read_timeout: Some(DEFAULT_TIMEOUT),
            write_timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl Config {
    /// Start from the defaults: `localhost:6379`, no auth, a 3 second timeout
    /// on every phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the target host. Ignored once [`Self::with_path`] is set.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the target port. Ignored once [`Self::with_path`] is set.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect over a Unix-domain socket instead of TCP; this takes priority
    /// over `host`/`port` when present.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Username sent during the `HELLO 3 AUTH` handshake.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Password sent during the handshake; when unset, `HELLO 3` is issued
    /// without an `AUTH` clause.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Logical database index selected with `SELECT` right after the
    /// handshake.
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = Some(db);
        self
    }

    /// Wrap the transport in TLS.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Opaque keys forwarded to the TLS transport. Recognized keys are
    /// `ca_file` (path to a PEM bundle used instead of the system trust
    /// store) and `verify` (`"0"`/`"false"` disables peer verification).
    /// Unrecognized keys are ignored rather than rejected.
    pub fn with_ssl_params(mut self, params: HashMap<String, String>) -> Self {
        self.ssl_params = params;
        self
    }

    /// Set connect, read and write timeouts all at once. Call the
    /// phase-specific setters afterwards to override just one of them.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self.read_timeout = Some(timeout);
        self.write_timeout = Some(timeout);
        self
    }

    /// `None` means "block indefinitely" while opening the transport.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `None` means "block indefinitely" on a read.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// `None` means "block indefinitely" on a write.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub(crate) fn uses_unix_socket(&self) -> bool {
        self.path.is_some()
    }
}
