//! Single-call execution: build the script, send it, reassemble the reply.
//!
//! The invoker performs exactly one remote invocation at a time *per call*;
//! it enforces no ordering across calls. Serialization against the shared
//! peer is the task queue's job, which is why `invoke` is crate-private:
//! application code must route through the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::aggregator::{ResponseAggregator, ScriptOutput};
use crate::bundle::ContextBundle;
use crate::channel::{ChannelAdapter, HostTransport};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::build_call_script;

const LOG_TARGET: &str = "ukibashi::invoker";

pub(crate) struct CallInvoker<T: HostTransport> {
    adapter: Arc<ChannelAdapter<T>>,
    bundle: ContextBundle,
    call_timeout: Duration,
    /// Monotonic per-process call counter, for log correlation of late or
    /// orphaned replies.
    next_call_id: AtomicI64,
}

impl<T: HostTransport> CallInvoker<T> {
    pub(crate) fn new(
        adapter: Arc<ChannelAdapter<T>>,
        bundle: ContextBundle,
        call_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            bundle,
            call_timeout,
            next_call_id: AtomicI64::new(1),
        }
    }

    /// Execute one named remote operation and reassemble its reply.
    ///
    /// Subscribes before sending so a fast reply cannot be missed, then
    /// races aggregation against the configured timeout. Returning drops
    /// the subscription either way; messages arriving afterwards for this
    /// call find no listener and are discarded by the adapter.
    pub(crate) async fn invoke(
        &self,
        operation: &str,
        args: &[Value],
    ) -> BridgeResult<ScriptOutput> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        let bundle = self.bundle.get().await?;
        let script = build_call_script(&bundle, operation, args);

        let mut inbound = self.adapter.subscribe();
        self.adapter.send(&script)?;
        log::debug!(
            target: LOG_TARGET,
            "call #{call_id}: sent `{operation}` ({} bytes)",
            script.len()
        );

        let mut aggregator = ResponseAggregator::new();
        let deadline = tokio::time::sleep(self.call_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    log::warn!(
                        target: LOG_TARGET,
                        "call #{call_id}: `{operation}` timed out after {:?}",
                        self.call_timeout
                    );
                    return Err(BridgeError::Timeout {
                        operation: operation.to_string(),
                        timeout: self.call_timeout,
                    });
                }
                received = inbound.recv() => match received {
                    Ok(message) => {
                        if let Some(outcome) = aggregator.accept(message) {
                            if outcome.is_ok() {
                                log::debug!(target: LOG_TARGET, "call #{call_id}: completed");
                            } else {
                                log::debug!(target: LOG_TARGET, "call #{call_id}: peer signaled error");
                            }
                            return outcome;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Fragments were lost to channel overrun; the reply
                        // can no longer be assembled faithfully. The call
                        // settles by timeout unless a later sentinel lands.
                        log::warn!(
                            target: LOG_TARGET,
                            "call #{call_id}: inbound receiver lagged, {skipped} message(s) lost"
                        );
                    }
                    Err(RecvError::Closed) => {
                        return Err(BridgeError::Transport {
                            message: "inbound channel closed".to_string(),
                        });
                    }
                }
            }
        }
    }
}
