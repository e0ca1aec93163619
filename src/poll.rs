//! Poll-until-complete: a compound protocol for effects the peer finishes
//! after the initial call returns.
//!
//! Built only on the task queue and the invoker: each status check is just
//! another queued task competing fairly with unrelated calls. Overlap is
//! prevented by construction — the loop awaits each check before taking
//! the next tick, and ticks that elapsed meanwhile are skipped rather than
//! queued up.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::aggregator::ScriptOutput;
use crate::error::{BridgeError, BridgeResult};
use crate::queue::{TaskQueue, TaskResult};

const LOG_TARGET: &str = "ukibashi::poll";

/// Token a status check answers when the expected effect is visible and has
/// been finalized.
pub(crate) const SUCCESS_TOKEN: &str = "success";

/// Token a status check answers when the effect is not visible yet.
pub(crate) const RETRY_TOKEN: &str = "fail";

pub(crate) struct PollSettings {
    pub(crate) interval: Duration,
    pub(crate) max_attempts: u32,
}

/// Repeatedly run `check` through the queue until it reports success.
///
/// `check` is invoked once per attempt to produce a fresh queued task.
/// Outcomes per attempt:
/// - `"success"` — stop, return the check's output;
/// - `"fail"` — effect not visible yet, poll again after the interval;
/// - task rejection — stop, propagate the error;
/// - any other reply — stop with [`BridgeError::PollFailed`].
///
/// Exhausting `max_attempts` yields [`BridgeError::GaveUp`] instead of
/// polling forever.
pub(crate) async fn poll_until_complete<C, F>(
    queue: &TaskQueue,
    settings: PollSettings,
    mut check: C,
) -> BridgeResult<ScriptOutput>
where
    C: FnMut() -> F,
    F: Future<Output = TaskResult> + Send + 'static,
{
    let mut ticks = tokio::time::interval(settings.interval);
    // The overlap guard: a tick that fires while a check is still in
    // flight is skipped instead of piling a second check onto the queue.
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval completes immediately; spend it so
    // the first check runs one interval after the mutating call settled.
    ticks.tick().await;

    for attempt in 1..=settings.max_attempts {
        ticks.tick().await;
        let output = queue.run(check()).await?;

        match output.as_str() {
            Some(SUCCESS_TOKEN) => {
                log::debug!(target: LOG_TARGET, "effect observed after {attempt} check(s)");
                return Ok(output);
            }
            Some(RETRY_TOKEN) => {
                log::trace!(
                    target: LOG_TARGET,
                    "check {attempt}/{}: effect not visible yet",
                    settings.max_attempts
                );
            }
            other => {
                let token = other
                    .map(str::to_string)
                    .unwrap_or_else(|| "<non-string reply>".to_string());
                log::warn!(target: LOG_TARGET, "status check answered `{token}`");
                return Err(BridgeError::PollFailed { token });
            }
        }
    }

    log::warn!(
        target: LOG_TARGET,
        "gave up after {} status check(s)",
        settings.max_attempts
    );
    Err(BridgeError::GaveUp {
        attempts: settings.max_attempts,
    })
}
