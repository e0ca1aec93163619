//! Wire-level message classification and outbound script construction.
//!
//! Inbound payloads are untyped: reserved string values carry control
//! meaning (completion, error), heartbeat noise carries a marker substring,
//! and everything else is data. [`classify`] is the single place that
//! decides which is which; nothing else in the crate compares sentinel
//! strings.

use serde_json::Value;

/// Exact payload the peer emits when a call's output is complete.
pub const DONE_SENTINEL: &str = "done";

/// Exact payload the peer emits when the injected script raised an error.
///
/// Not itself terminal: the peer may still emit trailing diagnostic
/// fragments before the completion sentinel.
pub const ERROR_SENTINEL: &str = "error";

/// Marker substring identifying heartbeat/ping payloads to be dropped.
pub const PING_MARKER: &str = "ping";

/// One inbound message after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A unit of a possibly multi-part response. An empty string is a valid
    /// fragment, distinct from "no response yet".
    Fragment(Value),
    /// The completion sentinel.
    Done,
    /// The error sentinel.
    Error,
    /// Heartbeat noise; never reaches an aggregator.
    Ignored,
}

/// Classify one raw inbound payload.
pub fn classify(payload: &Value) -> Inbound {
    match payload.as_str() {
        Some(DONE_SENTINEL) => Inbound::Done,
        Some(ERROR_SENTINEL) => Inbound::Error,
        Some(text) if text.contains(PING_MARKER) => Inbound::Ignored,
        _ => Inbound::Fragment(payload.clone()),
    }
}

/// Build the executable message for one call: the reusable context bundle
/// followed by a call expression with JSON-serialized, comma-joined
/// arguments, terminated by `;`.
pub(crate) fn build_call_script(bundle: &str, operation: &str, args: &[Value]) -> String {
    let mut script = String::with_capacity(bundle.len() + operation.len() + 32);
    script.push_str(bundle);
    if !bundle.is_empty() && !bundle.ends_with('\n') {
        script.push('\n');
    }
    script.push_str(operation);
    script.push('(');
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            script.push(',');
        }
        // `Value`'s Display is compact JSON, which is exactly the encoding
        // the peer's script interpreter expects for literals.
        script.push_str(&arg.to_string());
    }
    script.push_str(");");
    script
}
