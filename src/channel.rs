//! Adapter over the raw asynchronous, untyped messaging primitive.
//!
//! The adapter owns the only outbound path (`send`) and the only inbound
//! path (`deliver`). Inbound messages are validated against the expected
//! peer, classified once, and fanned out to whichever call is currently
//! listening. Subscribing hands back a receiver; dropping that receiver is
//! the unsubscribe.

use tokio::sync::broadcast;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{self, Inbound};

const LOG_TARGET: &str = "ukibashi::channel";

/// Opaque identity of the peer a message claims to originate from.
///
/// The host integration assigns these; the adapter only compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

/// One raw inbound message as handed over by the host integration.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Declared source of the message.
    pub source: PeerId,
    /// Untyped payload.
    pub payload: serde_json::Value,
}

/// Seam to the host's messaging primitive.
///
/// Implementations wrap whatever one-way channel the embedding environment
/// provides. `post` must not block on the peer; delivery guarantees are the
/// peer's problem, timeouts are the bridge's.
pub trait HostTransport: Send + Sync + 'static {
    /// Write one script text to the peer.
    fn post(&self, script: &str) -> Result<(), String>;

    /// Whether the current execution context is embedded inside the
    /// expected host at all.
    fn is_embedded(&self) -> bool;
}

/// Filters and fans out channel traffic for one bridge instance.
pub struct ChannelAdapter<T: HostTransport> {
    transport: T,
    peer: PeerId,
    inbound: broadcast::Sender<Inbound>,
}

impl<T: HostTransport> ChannelAdapter<T> {
    pub(crate) fn new(transport: T, peer: PeerId, capacity: usize) -> Self {
        let (inbound, _) = broadcast::channel(capacity);
        Self {
            transport,
            peer,
            inbound,
        }
    }

    /// Send one script to the peer.
    ///
    /// Fails fast with [`BridgeError::NotEmbedded`] when not running inside
    /// the expected host; this is a precondition, not a recoverable error.
    pub(crate) fn send(&self, script: &str) -> BridgeResult<()> {
        if !self.transport.is_embedded() {
            return Err(BridgeError::NotEmbedded);
        }
        self.transport
            .post(script)
            .map_err(|message| BridgeError::Transport { message })
    }

    /// Subscribe to classified inbound traffic. Must happen before the
    /// matching `send` so a fast reply cannot slip past the receiver.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Inbound> {
        self.inbound.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Feed one raw message from the host into the bridge.
    ///
    /// Foreign-source messages and heartbeat payloads are dropped here and
    /// never reach an aggregator. Everything else is forwarded verbatim,
    /// empty strings included.
    pub fn deliver(&self, message: ChannelMessage) {
        if message.source != self.peer {
            log::warn!(
                target: LOG_TARGET,
                "dropping message from foreign source {:?} (expected {:?})",
                message.source,
                self.peer
            );
            return;
        }

        match protocol::classify(&message.payload) {
            Inbound::Ignored => {
                log::trace!(target: LOG_TARGET, "dropping heartbeat payload");
            }
            classified => {
                // No receiver just means no call is in flight right now;
                // replies to an abandoned call land here and are discarded.
                if self.inbound.send(classified).is_err() {
                    log::trace!(target: LOG_TARGET, "no pending call; payload discarded");
                }
            }
        }
    }
}
