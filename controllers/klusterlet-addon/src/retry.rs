//! Bounded retry of a single store operation.
//!
//! Only transient store errors are retried. Delays grow exponentially and
//! are jittered so clusters failing together do not retry in lockstep.
//! Before every retry the cluster registration is re-read, so a cluster that
//! went away mid-pass aborts the pass instead of burning the remaining
//! attempts.

use crate::backoff::ExponentialBackoff;
use crate::error::ControllerError;
use addon_store::StoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
        }
    }
}

/// Scales `delay` by a random factor between 0.5 and 1.5.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Runs `op` until it succeeds, fails permanently or runs out of attempts.
///
/// `alive` is awaited before each retry; `Ok(false)` ends the loop with
/// `ControllerError::Terminated`.
pub async fn retry_with_backoff<T, Op, Fut, Alive, AliveFut>(
    policy: &RetryPolicy,
    cluster: &str,
    what: &str,
    mut alive: Alive,
    mut op: Op,
) -> Result<T, ControllerError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
    Alive: FnMut() -> AliveFut,
    AliveFut: Future<Output = Result<bool, StoreError>>,
{
    let mut backoff = ExponentialBackoff::new(policy.initial, policy.max);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if attempt > 1 && !alive().await? {
            debug!(cluster = %cluster, "Cluster gone while retrying {}, aborting", what);
            return Err(ControllerError::Terminated(cluster.to_string()));
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = jittered(backoff.next_backoff());
                warn!(
                    cluster = %cluster,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "{} failed: {}, retrying in {:?}",
                    what,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(ControllerError::Store(e)),
        }
    }
}
