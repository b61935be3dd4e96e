use crate::http::types::reason;
use std::io;
use thiserror::Error;

/// Request-path failure kinds, each mapping to exactly one HTTP status.
///
/// `Transport` closes the connection without a response; everything else
/// is rendered as a plain HTML error shell.
#[derive(Debug)]
pub enum ServeError {
    /// Malformed request line or header block.
    Parse(&'static str),
    /// No route or no such file.
    NotFound,
    /// Path traversal, invalid manual area, or an otherwise refused path.
    Forbidden(&'static str),
    /// Invalid query parameter.
    BadArgument(&'static str),
    /// Connection pool exhausted.
    Backpressure,
    /// Snapshot, template, subprocess or allocation failure.
    Internal(&'static str),
    /// Socket-level error; no response is attempted.
    Transport(io::Error),
}

impl ServeError {
    #[inline]
    pub(crate) const fn status(&self) -> u16 {
        match self {
            ServeError::Parse(_) | ServeError::BadArgument(_) => 400,
            ServeError::Forbidden(_) => 403,
            ServeError::NotFound => 404,
            ServeError::Internal(_) => 500,
            ServeError::Backpressure => 503,
            // Not rendered; the status is only for logging.
            ServeError::Transport(_) => 0,
        }
    }

    #[inline]
    pub(crate) fn message(&self) -> &str {
        match self {
            ServeError::Parse(m)
            | ServeError::Forbidden(m)
            | ServeError::BadArgument(m)
            | ServeError::Internal(m) => m,
            ServeError::NotFound => "no such resource",
            ServeError::Backpressure => "server is at capacity",
            ServeError::Transport(_) => "",
        }
    }
}

impl From<io::Error> for ServeError {
    fn from(err: io::Error) -> Self {
        ServeError::Transport(err)
    }
}

/// The HTML shell every user-visible error is wrapped in. Never a stack
/// trace, never tool output.
pub(crate) fn error_page(status: u16, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{status} {phrase}</title></head>\n\
         <body>\n<h1>{status} {phrase}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
        phrase = reason(status),
    )
}

/// Canned response for connections rejected at accept time; sent whole by
/// the dedicated 503 responder without going through a response record.
pub(crate) const AT_CAPACITY_RESPONSE: &[u8] = concat!(
    "HTTP/1.1 503 Service Unavailable\r\n",
    "content-type: text/html\r\n",
    "content-length: 131\r\n",
    "connection: close\r\n",
    "\r\n",
    "<!DOCTYPE html>\n<html>\n<head><title>503 Service Unavailable</title></head>\n",
    "<body>\n<h1>503 Service Unavailable</h1>\n</body>\n</html>\n",
)
.as_bytes();

/// Failures that abort startup before the listener accepts anything.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("listener setup failed: {0}")]
    Listener(#[source] io::Error),
    #[error("template store: {0}")]
    Templates(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration file / flag rejection, always naming the offending key.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: value {value:?} is out of range ({range})")]
    OutOfRange {
        key: &'static str,
        value: String,
        range: &'static str,
    },
    #[error("{key}: cannot parse {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("config file {path}: {reason}")]
    Unreadable { path: String, reason: String },
}
