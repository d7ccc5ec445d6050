//! Bounded polling for eventually consistent side effects.

use crate::error::{HarnessError, HarnessResult};
use log::trace;
use std::future::Future;
use std::time::{Duration, Instant};

/// Result of one polling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    /// The awaited condition holds
    Ready(T),
    /// Not yet; the string describes what was observed
    Pending(String),
}

/// Budget and cadence of a polling wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Probe until it reports [`Observation::Ready`] or the budget runs out.
///
/// The probe runs at least once. An error from the probe aborts the wait.
/// On timeout the error carries the elapsed time, the number of attempts and
/// the last pending observation.
pub async fn poll_until<T, F, Fut>(mut probe: F, policy: PollPolicy) -> HarnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<Observation<T>>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let last_observation = match probe().await? {
            Observation::Ready(value) => {
                trace!("Condition met after {} attempt(s) in {:?}", attempts, start.elapsed());
                return Ok(value);
            }
            Observation::Pending(snapshot) => snapshot,
        };

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(HarnessError::Timeout {
                elapsed,
                attempts,
                last_observation,
            });
        }
        trace!("Attempt {} pending: {}", attempts, last_observation);
        tokio::time::sleep(policy.interval.min(policy.timeout - elapsed)).await;
    }
}

/// Wait until an async boolean condition holds.
///
/// Returns how long the wait took.
pub async fn wait_for<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    poll_interval: Duration,
) -> HarnessResult<Duration>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    poll_until(
        || {
            let check = predicate();
            async move {
                Ok(if check.await {
                    Observation::Ready(())
                } else {
                    Observation::Pending("condition returned false".to_string())
                })
            }
        },
        PollPolicy::new(timeout, poll_interval),
    )
    .await?;
    Ok(start.elapsed())
}
