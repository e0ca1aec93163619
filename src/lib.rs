//! ukibashi — a remote-execution bridge for driving an embedded scriptable
//! editor over a one-way, untyped, asynchronous message channel.
//!
//! The peer runs one injected script at a time and answers with an unframed
//! stream of messages. This crate turns named remote operations into
//! serialized, timed, fragment-reassembled futures:
//!
//! - [`channel`] wraps the raw messaging primitive and filters noise;
//! - the response aggregator reassembles multi-part replies up to the
//!   completion sentinel;
//! - the invoker builds and sends one call (context bundle + call
//!   expression) under a timeout;
//! - [`queue`] serializes all callers into strict FIFO, single-flight
//!   order;
//! - the poll protocol layers retry-until-visible semantics on top for
//!   effects the peer completes after the initial call returns.

pub mod bridge;
pub mod bundle;
pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;

mod aggregator;
mod invoker;
mod poll;

pub use aggregator::ScriptOutput;
pub use bridge::{HostBridge, ImageFormat, LayerBounds, TaskScope};
pub use bundle::{BundleLoader, HttpBundleLoader, StaticBundleLoader};
pub use channel::{ChannelMessage, HostTransport, PeerId};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use queue::{TaskId, TaskQueue};
