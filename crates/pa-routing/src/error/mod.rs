//! Domain errors raised by channels, rules, the router and the runner.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use nix::errno::Errno;
use pa_config::ConfigError;
use thiserror::Error;

use crate::router::Route;

/// Longest excerpt of an offending line kept in [`EndpointError::Malformed`].
const EXCERPT_CHARS: usize = 120;

/// Errors raised while reading from or writing to an endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The peer went away: end of stream, reset, broken pipe, or the channel
    /// was already closed locally.
    #[error("endpoint closed: {reason}")]
    Closed {
        /// Short description of how closure was detected.
        reason: String,
        /// Underlying I/O error, when closure was reported by the OS.
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// Any other transport failure.
    #[error("endpoint I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A complete line could not be decoded as a JSON object. Only that line
    /// is lost; the endpoint remains usable.
    #[error("malformed message: {message} (line: {excerpt:?})")]
    Malformed {
        /// Leading part of the offending line.
        excerpt: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// A message could not be encoded as JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl EndpointError {
    /// Builds a closure error with no OS error attached.
    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
            source: None,
        }
    }

    /// Classifies an I/O error: end of stream, reset and broken pipe become
    /// [`EndpointError::Closed`], everything else [`EndpointError::Io`].
    pub(crate) fn from_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Self::Closed {
                reason: error.kind().to_string(),
                source: Some(Arc::new(error)),
            },
            _ => Self::Io {
                source: Arc::new(error),
            },
        }
    }

    /// Builds a decoding error for `line`.
    pub(crate) fn malformed(line: &[u8], message: impl Into<String>) -> Self {
        let excerpt = String::from_utf8_lossy(line)
            .chars()
            .take(EXCERPT_CHARS)
            .collect();
        Self::Malformed {
            excerpt,
            message: message.into(),
        }
    }

    /// Returns `true` when the endpoint can no longer be used.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Returns `true` when only a single line was rejected.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Errors raised when constructing a [`crate::Rule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The fixed target or the computed prefix was empty.
    #[error("rule target must not be empty")]
    EmptyTarget,
    /// The attribute a computed rule reads was empty.
    #[error("computed rule attribute must not be empty")]
    EmptyAttribute,
    /// A clause key was empty.
    #[error("rule clause keys must not be empty")]
    EmptyClauseKey,
    /// The same clause key was given twice.
    #[error("rule clause '{key}' given more than once")]
    DuplicateClause {
        /// Repeated key.
        key: String,
    },
}

/// Failures surfaced by [`crate::Router::tick`].
///
/// Each variant names the endpoint involved so the embedder can deregister
/// it and, if desired, restart the backing process.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Reading from a faucet failed.
    #[error("faucet '{name}' failed: {source}")]
    Faucet {
        /// Registered faucet name.
        name: String,
        /// Underlying endpoint error.
        #[source]
        source: EndpointError,
    },
    /// Writing to a sink failed; the message being delivered is lost.
    #[error("sink {route} failed: {source}")]
    Sink {
        /// Sink the message was routed to.
        route: Route,
        /// Underlying endpoint error.
        #[source]
        source: EndpointError,
    },
}

impl RouterError {
    /// Returns the endpoint error behind this failure.
    #[must_use]
    pub const fn endpoint_error(&self) -> &EndpointError {
        match self {
            Self::Faucet { source, .. } | Self::Sink { source, .. } => source,
        }
    }

    /// Returns `true` when the failing endpoint is closed for good.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.endpoint_error().is_closed()
    }
}

/// Errors raised while supervising application processes.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The application table could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No template is registered under the requested name.
    #[error("application '{name}' is not configured")]
    UnknownApp {
        /// Name that was looked up.
        name: String,
    },

    /// No process is running under the requested alias.
    #[error("no process is running as '{alias}'")]
    UnknownAlias {
        /// Alias that was looked up.
        alias: String,
    },

    /// A socket application has no socket path configured or overridden.
    #[error("application '{app}' uses the socket transport but no socket path is set")]
    MissingSocketPath {
        /// Application name.
        app: String,
    },

    /// The process could not be spawned or its pipes captured.
    #[error("application '{app}' failed to start: {message}")]
    Spawn {
        /// Application name.
        app: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// A leftover socket file could not be removed before spawning.
    #[error("failed to remove stale socket {path}: {source}")]
    StaleSocket {
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A pipe or socket could not be switched to non-blocking mode.
    #[error("failed to prepare channel for '{app}': {source}")]
    Channel {
        /// Application name.
        app: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process exited before its socket accepted a connection.
    #[error("application '{app}' exited before its socket was ready (status: {status:?})")]
    StartupFailed {
        /// Application name.
        app: String,
        /// Exit code, when the process exited normally.
        status: Option<i32>,
    },

    /// The socket did not accept a connection within the deadline.
    #[error("timed out after {timeout_ms} ms waiting for '{app}' to listen on {path}")]
    SocketTimeout {
        /// Application name.
        app: String,
        /// Socket path.
        path: Utf8PathBuf,
        /// Deadline that expired.
        timeout_ms: u64,
    },

    /// Connecting to the socket failed for a reason other than "not yet
    /// listening".
    #[error("failed to connect to '{app}' on {path}: {source}")]
    Connect {
        /// Application name.
        app: String,
        /// Socket path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The termination signal could not be delivered.
    #[error("failed to signal '{alias}' (pid {pid}): {source}")]
    Signal {
        /// Process alias.
        alias: String,
        /// Process id.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },

    /// Waiting on or polling the process failed.
    #[error("failed to wait for '{alias}': {source}")]
    Wait {
        /// Process alias.
        alias: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}
