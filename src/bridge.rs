//! The bridge facade: one owned object tying adapter, invoker, and queue
//! together, injected into callers rather than living as ambient state.
//!
//! All application access to the peer routes through the queue. The raw
//! single-call invoker is deliberately unreachable from outside the crate;
//! compound tasks get at it only through a [`TaskScope`], which exists only
//! inside a queued task.
//!
//! # Bundle contract
//!
//! The context bundle defines the remote operations named by the constants
//! below. Every bundle operation echoes at least one value before the
//! completion sentinel: a completion with no preceding fragment is
//! indistinguishable from heartbeat residue and is ignored by the
//! aggregator.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::aggregator::ScriptOutput;
use crate::bundle::{BundleLoader, ContextBundle};
use crate::channel::{ChannelAdapter, ChannelMessage, HostTransport, PeerId};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::invoker::CallInvoker;
use crate::poll::{self, PollSettings};
use crate::queue::{TaskQueue, TaskResult};

const LOG_TARGET: &str = "ukibashi::bridge";

/// Remote operations defined by the bundle script.
mod remote_ops {
    /// Returns the current number of image layers.
    pub(super) const COUNT_LAYERS: &str = "countImageLayers";
    /// Opens a base64 image as a new layer; the layer materializes
    /// asynchronously on the peer after the call returns.
    pub(super) const PASTE_IMAGE: &str = "pasteImageAsNewLayer";
    /// Checks whether a layer beyond the witnessed count exists; if so,
    /// applies the deferred placement and answers a status token.
    pub(super) const PLACE_PASTED_LAYER: &str = "placePastedLayerIfAdded";
    /// Exports only the active layer, hiding the rest for the duration.
    pub(super) const EXPORT_ACTIVE_LAYER: &str = "exportActiveLayer";
    /// Exports all layers merged.
    pub(super) const EXPORT_MERGED: &str = "exportMergedImage";
    /// Renders the active selection as a black/white mask and exports it.
    pub(super) const EXPORT_SELECTION_MASK: &str = "exportSelectionMask";
}

/// Image format argument for the export operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    fn as_remote_arg(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPG",
        }
    }
}

/// Target placement of a pasted layer, in peer document coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerBounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Capability handed to a queued compound task.
///
/// The only way to reach the raw single-call invoker, so direct unqueued
/// invocations stay impossible from application code.
pub struct TaskScope<T: HostTransport> {
    invoker: Arc<CallInvoker<T>>,
}

impl<T: HostTransport> TaskScope<T> {
    /// Run one remote operation inside the current queued task.
    pub async fn call(&self, operation: &str, args: &[Value]) -> BridgeResult<ScriptOutput> {
        self.invoker.invoke(operation, args).await
    }
}

/// Bridge to an embedded scriptable editor reachable only through a
/// one-way, untyped message channel.
pub struct HostBridge<T: HostTransport> {
    adapter: Arc<ChannelAdapter<T>>,
    invoker: Arc<CallInvoker<T>>,
    queue: TaskQueue,
    config: BridgeConfig,
}

impl<T: HostTransport> HostBridge<T> {
    /// Build a bridge instance. Must be called from within a tokio runtime;
    /// the queue worker is spawned here.
    pub fn new(
        transport: T,
        peer: PeerId,
        loader: Arc<dyn BundleLoader>,
        config: BridgeConfig,
    ) -> Self {
        let adapter = Arc::new(ChannelAdapter::new(transport, peer, config.channel_capacity));
        let bundle = ContextBundle::new(loader);
        let invoker = Arc::new(CallInvoker::new(
            Arc::clone(&adapter),
            bundle,
            config.call_timeout,
        ));
        Self {
            adapter,
            invoker,
            queue: TaskQueue::new(),
            config,
        }
    }

    /// Feed one raw host message into the bridge. The host integration
    /// calls this for every message the embedding environment receives;
    /// filtering is the bridge's job, not the caller's.
    pub fn deliver(&self, message: ChannelMessage) {
        self.adapter.deliver(message);
    }

    /// Run one named remote operation as a queued task.
    pub async fn invoke_as_task(
        &self,
        operation: &str,
        args: Vec<Value>,
    ) -> BridgeResult<ScriptOutput> {
        let invoker = Arc::clone(&self.invoker);
        let operation = operation.to_string();
        self.queue
            .run(async move { invoker.invoke(&operation, &args).await })
            .await
    }

    /// Run an arbitrary compound operation as a single queued task.
    ///
    /// Every remote call the thunk makes through its [`TaskScope`] happens
    /// under the queue's single-flight guarantee, with no unrelated call
    /// interleaved.
    pub async fn run_task<F, Fut>(&self, task: F) -> BridgeResult<ScriptOutput>
    where
        F: FnOnce(TaskScope<T>) -> Fut,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let scope = TaskScope {
            invoker: Arc::clone(&self.invoker),
        };
        self.queue.run(task(scope)).await
    }

    /// Paste a base64 image into the peer as a new layer and wait until the
    /// peer has actually materialized and placed it.
    ///
    /// The paste call returns before the layer exists, so completion is
    /// observable only by re-asking: one queued task captures the current
    /// layer count as a witness and issues the paste; status checks then
    /// poll the placement operation with that witness until the new layer
    /// is seen and placed, or polling gives up.
    pub async fn paste_and_place(&self, image: &str, bounds: LayerBounds) -> BridgeResult<()> {
        let witness = {
            let image = image.to_string();
            self.run_task(move |scope| async move {
                let count = scope.call(remote_ops::COUNT_LAYERS, &[]).await?;
                scope
                    .call(remote_ops::PASTE_IMAGE, &[json!(image)])
                    .await?;
                Ok(count)
            })
            .await?
        };

        let prior_layers = witness.as_i64().ok_or_else(|| BridgeError::UnexpectedReply {
            operation: remote_ops::COUNT_LAYERS.to_string(),
            detail: "expected a numeric layer count".to_string(),
        })?;
        log::debug!(
            target: LOG_TARGET,
            "pasted image; polling for layer {} to materialize",
            prior_layers + 1
        );

        let settings = PollSettings {
            interval: self.config.poll_interval,
            max_attempts: self.config.max_poll_attempts,
        };
        let invoker = Arc::clone(&self.invoker);
        poll::poll_until_complete(&self.queue, settings, move || {
            let invoker = Arc::clone(&invoker);
            let args = vec![
                json!(prior_layers),
                json!(bounds.left),
                json!(bounds.top),
                json!(bounds.width),
                json!(bounds.height),
            ];
            async move { invoker.invoke(remote_ops::PLACE_PASTED_LAYER, &args).await }
        })
        .await?;
        Ok(())
    }

    /// Export only the active layer.
    pub async fn export_active_layer(&self, format: ImageFormat) -> BridgeResult<ScriptOutput> {
        self.invoke_as_task(
            remote_ops::EXPORT_ACTIVE_LAYER,
            vec![json!(format.as_remote_arg())],
        )
        .await
    }

    /// Export all layers merged.
    pub async fn export_merged(&self, format: ImageFormat) -> BridgeResult<ScriptOutput> {
        self.invoke_as_task(
            remote_ops::EXPORT_MERGED,
            vec![json!(format.as_remote_arg())],
        )
        .await
    }

    /// Export the active selection as a black/white mask.
    pub async fn export_selection_mask(&self, format: ImageFormat) -> BridgeResult<ScriptOutput> {
        self.invoke_as_task(
            remote_ops::EXPORT_SELECTION_MASK,
            vec![json!(format.as_remote_arg())],
        )
        .await
    }

    /// The queued task currently executing, if any.
    pub fn active_task_id(&self) -> Option<crate::queue::TaskId> {
        self.queue.active_task_id()
    }
}
