//! Error types for the remote-execution bridge.
//!
//! Every reachable failure surfaces as a distinct [`BridgeError`] kind so
//! callers can tell an environment problem from a remote-signaled failure
//! from a local timeout.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Failure kinds for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The current execution context is not embedded inside the expected
    /// host. A precondition failure, never retried.
    #[error("not running inside the embedded host environment")]
    NotEmbedded,

    /// The peer's script raised the error sentinel. Carries every fragment
    /// collected during the call, error sentinel included, for diagnostics.
    #[error("remote execution failed ({} diagnostic fragment(s) collected)", fragments.len())]
    RemoteSignaled { fragments: Vec<Value> },

    /// No completion sentinel arrived within the configured window. The
    /// remote execution may still finish later; only the local wait is
    /// cancelled.
    #[error("operation `{operation}` produced no completion within {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// The poll protocol exhausted its attempt ceiling without observing the
    /// expected effect.
    #[error("status polling gave up after {attempts} attempt(s)")]
    GaveUp { attempts: u32 },

    /// A status check answered with something other than a known token.
    #[error("status check reported unexpected token `{token}`")]
    PollFailed { token: String },

    /// The task queue worker is gone; no further tasks can be accepted.
    #[error("task queue is shut down")]
    QueueClosed,

    /// The underlying messaging primitive refused an outbound write.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The context bundle could not be fetched or decoded.
    #[error("failed to load context bundle: {message}")]
    BundleLoad { message: String },

    /// A remote operation answered with a value of the wrong shape.
    #[error("unexpected reply from operation `{operation}`: {detail}")]
    UnexpectedReply { operation: String, detail: String },
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
