//! Recoverable errors raised by the debugger core.
//!
//! Contract violations (re-entering the pause hook, resuming while running,
//! malformed state paths) are not represented here: they panic.

use thiserror::Error;

/// The error type for the fallible, non-fatal debugger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebuggerError {
    /// A task was offered to an executor that no longer accepts work.
    #[error("the serial executor has shut down")]
    ExecutorShutDown,

    /// A wire identifier could not be parsed as a remote object id.
    #[error("invalid remote object id `{0}`")]
    InvalidObjectId(String),
}

/// Result type for fallible debugger operations.
pub type DebuggerResult<T> = Result<T, DebuggerError>;
