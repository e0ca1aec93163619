//! Bridge configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default window a single call may wait for its completion sentinel.
///
/// The peer gives no delivery guarantees, so this is the only bound on a
/// call's lifetime. Large enough for slow export operations, small enough
/// that a wedged peer does not stall the queue for long.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(8);

/// Default spacing between status checks of the poll protocol.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default ceiling on status checks before the poll protocol gives up.
///
/// 120 checks at the default interval is six seconds of polling, which
/// comfortably covers deferred layer materialization on a loaded peer.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

/// Default capacity of the inbound fan-out channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Tunables for one bridge instance.
///
/// All fields carry defaults, so a partial configuration deserializes fine:
///
/// ```
/// use ukibashi::config::BridgeConfig;
///
/// let config: BridgeConfig = serde_json::from_str(r#"{"max_poll_attempts": 40}"#).unwrap();
/// assert_eq!(config.max_poll_attempts, 40);
/// assert_eq!(config.call_timeout, ukibashi::config::DEFAULT_CALL_TIMEOUT);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Per-call timeout; a call with no completion sentinel inside this
    /// window rejects locally with [`BridgeError::Timeout`].
    ///
    /// [`BridgeError::Timeout`]: crate::error::BridgeError::Timeout
    pub call_timeout: Duration,
    /// Interval between status checks in the poll protocol.
    pub poll_interval: Duration,
    /// Maximum number of status checks before giving up.
    pub max_poll_attempts: u32,
    /// Capacity of the inbound broadcast channel.
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
