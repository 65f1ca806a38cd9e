//! Waiting for launched instances to show up in the backend inventory.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backend::{Backend, RunningInstance};
use crate::error::{LaunchError, LaunchResult};

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded inventory polling.
#[derive(Debug, Clone, Copy)]
pub struct ConvergencePoller {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ConvergencePoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Sleep, then list, until exactly `expected` instances run.
    ///
    /// A failed listing counts as a miss. After `max_attempts` misses the
    /// last observed count is reported in [`LaunchError::LaunchTimeout`].
    pub async fn wait<B>(
        &self,
        backend: &B,
        sleeper: &dyn Sleeper,
        expected: usize,
    ) -> LaunchResult<BTreeMap<String, RunningInstance>>
    where
        B: Backend + ?Sized,
    {
        let mut observed = 0;
        for attempt in 1..=self.max_attempts {
            sleeper.sleep(self.interval).await;
            match backend.list_running_instances().await {
                Ok(instances) if instances.len() == expected => {
                    info!(attempt, expected, "all instances running");
                    return Ok(instances);
                }
                Ok(instances) => {
                    observed = instances.len();
                    debug!(attempt, observed, expected, "waiting for instances");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "inventory listing failed");
                }
            }
        }
        Err(LaunchError::LaunchTimeout {
            expected,
            observed,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingSleeper, ScriptedBackend};

    #[tokio::test]
    async fn returns_once_counts_match() {
        let backend = ScriptedBackend::new(vec![Ok(0), Err(()), Ok(2), Ok(3)]);
        let sleeper = CountingSleeper::default();
        let poller = ConvergencePoller::new(Duration::from_millis(500), 10);

        let instances = poller.wait(&backend, &sleeper, 3).await.unwrap();
        assert_eq!(instances.len(), 3);
        assert_eq!(sleeper.count(), 4);
        assert_eq!(backend.listings(), 4);
    }

    #[tokio::test]
    async fn times_out_after_exactly_max_attempts() {
        let backend = ScriptedBackend::new(vec![Ok(1)]);
        let sleeper = CountingSleeper::default();
        let poller = ConvergencePoller::new(Duration::from_secs(1), 5);

        let err = poller.wait(&backend, &sleeper, 2).await.unwrap_err();
        assert!(matches!(
            err,
            LaunchError::LaunchTimeout {
                expected: 2,
                observed: 1,
                attempts: 5
            }
        ));
        assert_eq!(sleeper.count(), 5);
        assert_eq!(backend.listings(), 5);
        assert_eq!(sleeper.total(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn more_instances_than_expected_is_not_convergence() {
        let backend = ScriptedBackend::new(vec![Ok(4)]);
        let sleeper = CountingSleeper::default();
        let poller = ConvergencePoller::new(Duration::ZERO, 3);
        assert!(poller.wait(&backend, &sleeper, 3).await.is_err());
    }
}
