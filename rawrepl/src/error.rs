//! Error types for raw REPL operations.

use std::time::Duration;

use crate::session::SessionState;

/// Alias for `Result<T, rawrepl::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by sessions and file transfers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The serial device could not be opened within the retry budget.
    #[error("failed to access {device} after {attempts} attempt(s): {reason}")]
    Connection {
        /// Device path that was tried.
        device: String,
        /// Number of open attempts made.
        attempts: u32,
        /// Error from the last attempt.
        reason: String,
    },

    /// A banner, prompt, or acknowledgement did not arrive. The session is
    /// desynchronized; a physical reconnect is the usual remedy.
    #[error("{0}")]
    Protocol(String),

    /// The board did not acknowledge a submitted command.
    #[error("could not exec command (got `{}`)", .received.escape_ascii())]
    Exec {
        /// Bytes received in place of `OK`.
        received: Vec<u8>,
    },

    /// A framed read ran out of time before its terminator arrived.
    #[error("timed out after {waited:?} waiting for `{expected}`")]
    Timeout {
        /// Terminator that was being waited for, ASCII-escaped.
        expected: String,
        /// Idle time accumulated before giving up.
        waited: Duration,
        /// Everything read before the timeout.
        received: Vec<u8>,
    },

    /// The remote interpreter raised an exception.
    #[error("remote execution failed: {}", String::from_utf8_lossy(.stderr).trim_end())]
    Remote {
        /// Normal output produced before the exception.
        stdout: Vec<u8>,
        /// Error output (usually a traceback).
        stderr: Vec<u8>,
    },

    /// A directory already existed and the caller asked for strict creation.
    #[error("directory already exists: {0}")]
    DirectoryExists(String),

    /// The operation was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("interrupted by user")]
    Cancelled,

    /// An operation was called in a session state that does not allow it.
    #[error("cannot {op} while session is {state}")]
    InvalidState {
        /// The attempted operation.
        op: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// Read-back output was not a valid bytes literal.
    #[error("malformed data from device: {0}")]
    Literal(#[from] rawrepl_proto::LiteralError),

    /// Configuration file could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error from the transport or local filesystem.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for [`Error::Cancelled`].
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
