//! Error type of the fetch operation.

use crate::protocol::ProtocolError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned when fetching credentials.
///
/// Errors from the transport client name the helper executable and the phase
/// (lookup, start, decode, exit) that failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The helper executable could not be found or is not executable.
    #[error("could not lookup credential helper {path:?}: {source}")]
    Resolution {
        /// The path or name that was looked up.
        path: String,
        /// Why the lookup failed.
        #[source]
        source: io::Error,
    },

    /// The helper process could not be started.
    #[error("could not start credential helper {path:?}: {source}")]
    Start {
        /// The resolved path of the helper.
        path: PathBuf,
        /// The spawn error.
        #[source]
        source: io::Error,
    },

    /// The helper did not write a valid response to its standard output.
    #[error("could not read response from credential helper {path:?}: {source}")]
    ResponseDecode {
        /// The resolved path of the helper.
        path: PathBuf,
        /// Why the response could not be decoded.
        #[source]
        source: ProtocolError,
    },

    /// The helper exited unsuccessfully.
    ///
    /// Any response the helper wrote before failing is discarded.
    #[error("error running credential helper {path:?}: {status}{}", stderr_suffix(.stderr))]
    Invocation {
        /// The resolved path of the helper.
        path: PathBuf,
        /// Description of how the process ended (e.g. `exit status 1`).
        status: String,
        /// Everything the helper wrote to its standard error.
        stderr: String,
    },

    /// The invocation was cancelled and the helper process was killed.
    #[error("credential helper {path:?} was cancelled")]
    Cancelled {
        /// The resolved path of the helper.
        path: PathBuf,
    },

    /// A protocol message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The caching credential helper has been closed.
    #[error("cannot get credentials from closed credential helper")]
    Closed,

    /// The configured cache TTL is negative.
    #[error("ttl must not be negative, got {0}")]
    InvalidTtl(time::Duration),

    /// A background task had to be started outside of a Tokio runtime.
    #[error("caching credential helper must be created within a Tokio runtime")]
    NoRuntime,

    /// The credential helper does not implement the command.
    #[error("credential helper does not support command '{command}'")]
    Unsupported {
        /// The protocol command, e.g. `get`.
        command: &'static str,
    },

    /// A credential helper implementation failed.
    #[error(transparent)]
    Helper(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error raised by a credential helper implementation.
    ///
    /// The error's message is shown as-is, e.g. by the helper server mode.
    pub fn helper<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Helper(err.into())
    }

    /// Returns `true` if the error is [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr:\n{stderr}")
    }
}
