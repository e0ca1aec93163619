//! Per-invocation reassembly of an unframed multi-part response.
//!
//! One aggregator exists for the duration of one call. It collects
//! fragments until the completion sentinel, tracking whether the error
//! sentinel was seen along the way. The error sentinel alone does not
//! terminate the call: the peer may still emit trailing diagnostic
//! fragments before signaling completion.

use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{ERROR_SENTINEL, Inbound};

/// The logical result of one remote invocation.
///
/// Most operations return exactly one value; a handful intentionally emit
/// several, so a single collected fragment collapses to [`Single`] while
/// anything else stays an ordered list.
///
/// [`Single`]: ScriptOutput::Single
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutput {
    /// Exactly one fragment was collected.
    Single(Value),
    /// Zero or several fragments were collected, in arrival order.
    Many(Vec<Value>),
}

impl ScriptOutput {
    fn from_fragments(mut fragments: Vec<Value>) -> Self {
        if fragments.len() == 1 {
            Self::Single(fragments.remove(0))
        } else {
            Self::Many(fragments)
        }
    }

    /// The output as a string, when it is a single string fragment.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(value) => value.as_str(),
            Self::Many(_) => None,
        }
    }

    /// The output as an integer, when it is a single numeric fragment.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Single(value) => value.as_i64(),
            Self::Many(_) => None,
        }
    }
}

/// State machine for one in-flight call: collecting until terminal.
pub(crate) struct ResponseAggregator {
    fragments: Vec<Value>,
    remote_error: bool,
}

impl ResponseAggregator {
    pub(crate) fn new() -> Self {
        Self {
            fragments: Vec::new(),
            remote_error: false,
        }
    }

    /// Feed one classified message. Returns `Some` on the terminal
    /// transition, `None` while still collecting.
    pub(crate) fn accept(&mut self, message: Inbound) -> Option<BridgeResult<ScriptOutput>> {
        match message {
            Inbound::Fragment(value) => {
                self.fragments.push(value);
                None
            }
            Inbound::Error => {
                // Recorded as a fragment too, so the rejection carries the
                // sentinel's position among the diagnostics.
                self.fragments.push(Value::String(ERROR_SENTINEL.to_string()));
                self.remote_error = true;
                None
            }
            // A completion with nothing collected is leftover heartbeat
            // residue (or the tail of an abandoned earlier call), not a real
            // completion for this one.
            Inbound::Done if self.fragments.is_empty() => None,
            Inbound::Done => {
                let fragments = std::mem::take(&mut self.fragments);
                Some(if self.remote_error {
                    Err(BridgeError::RemoteSignaled { fragments })
                } else {
                    Ok(ScriptOutput::from_fragments(fragments))
                })
            }
            Inbound::Ignored => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_fragment_resolves_to_scalar() {
        let mut agg = ResponseAggregator::new();
        assert!(agg.accept(Inbound::Fragment(json!("a"))).is_none());

        let outcome = agg.accept(Inbound::Done).expect("done is terminal");
        assert_eq!(outcome.unwrap(), ScriptOutput::Single(json!("a")));
    }

    #[test]
    fn multiple_fragments_resolve_to_ordered_list() {
        let mut agg = ResponseAggregator::new();
        agg.accept(Inbound::Fragment(json!("a")));
        agg.accept(Inbound::Fragment(json!("b")));

        let outcome = agg.accept(Inbound::Done).expect("done is terminal");
        assert_eq!(outcome.unwrap(), ScriptOutput::Many(vec![json!("a"), json!("b")]));
    }

    /// The error sentinel does not terminate the call; only completion does,
    /// and the result is then a rejection carrying every fragment.
    #[test]
    fn error_sentinel_rejects_on_completion_with_diagnostics() {
        let mut agg = ResponseAggregator::new();
        agg.accept(Inbound::Fragment(json!("TypeError: x is undefined")));
        assert!(agg.accept(Inbound::Error).is_none(), "error alone is not terminal");
        agg.accept(Inbound::Fragment(json!("at line 3")));

        let outcome = agg.accept(Inbound::Done).expect("done is terminal");
        match outcome {
            Err(BridgeError::RemoteSignaled { fragments }) => {
                assert_eq!(
                    fragments,
                    vec![
                        json!("TypeError: x is undefined"),
                        json!("error"),
                        json!("at line 3"),
                    ]
                );
            }
            other => panic!("expected RemoteSignaled, got {other:?}"),
        }
    }

    #[test]
    fn stray_done_with_no_fragments_is_ignored() {
        let mut agg = ResponseAggregator::new();
        assert!(agg.accept(Inbound::Done).is_none(), "leftover heartbeat ack");

        // The real reply still completes normally afterwards.
        agg.accept(Inbound::Fragment(json!("value")));
        let outcome = agg.accept(Inbound::Done).expect("done is terminal");
        assert_eq!(outcome.unwrap(), ScriptOutput::Single(json!("value")));
    }

    #[test]
    fn empty_string_fragment_counts_as_collected() {
        let mut agg = ResponseAggregator::new();
        agg.accept(Inbound::Fragment(json!("")));

        let outcome = agg.accept(Inbound::Done).expect("done is terminal");
        assert_eq!(outcome.unwrap(), ScriptOutput::Single(json!("")));
    }

    #[test]
    fn script_output_accessors() {
        assert_eq!(ScriptOutput::Single(json!("ok")).as_str(), Some("ok"));
        assert_eq!(ScriptOutput::Single(json!(5)).as_i64(), Some(5));
        assert_eq!(ScriptOutput::Many(vec![json!("a")]).as_str(), None);
        assert_eq!(ScriptOutput::Single(json!("x")).as_i64(), None);
    }
}
