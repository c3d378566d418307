use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::Result;

/// Backoff never grows past this multiple of the nominal interval.
pub const MAX_BACKOFF_FACTOR: u32 = 10;

/// One unit of work the scheduler drives.
pub trait PollCycle {
    fn poll_once(&mut self) -> impl Future<Output = Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Polling,
    BackoffWait,
}

/// Drives poll cycles on a timer with exponential backoff.
///
/// The next cycle is only scheduled once the previous one has settled, so
/// two cycles can never run at the same time.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    failures: u32,
    state: SchedulerState,
}

/// `min(interval * 2^failures, interval * 10)`; the plain interval after a success.
pub fn backoff_delay(interval: Duration, failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    interval
        .saturating_mul(factor)
        .min(interval.saturating_mul(MAX_BACKOFF_FACTOR))
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            failures: 0,
            state: SchedulerState::Idle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    /// Delay before the next cycle given the current failure count.
    pub fn next_delay(&self) -> Duration {
        backoff_delay(self.interval, self.failures)
    }

    pub fn begin_cycle(&mut self) {
        debug_assert_ne!(self.state, SchedulerState::Polling, "cycle already in flight");
        self.state = SchedulerState::Polling;
    }

    /// Record the outcome of the cycle in flight and return the delay until the next one.
    pub fn settle(&mut self, outcome: &Result<()>) -> Duration {
        match outcome {
            Ok(()) => {
                self.failures = 0;
                self.state = SchedulerState::Idle;
                let delay = self.next_delay();
                debug!(next_in_secs = delay.as_secs(), "poll cycle succeeded");
                delay
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                self.state = SchedulerState::BackoffWait;
                let delay = self.next_delay();
                warn!(
                    error = %e,
                    failures = self.failures,
                    retry_in_secs = delay.as_secs(),
                    "poll cycle failed"
                );
                delay
            }
        }
    }

    /// Poll immediately, then keep polling until `shutdown` resolves.
    /// Shutdown is honored between cycles, after the outcome was recorded.
    pub async fn run<C, F>(&mut self, cycle: &mut C, shutdown: F)
    where
        C: PollCycle,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.begin_cycle();
            let outcome = cycle.poll_once().await;
            let delay = self.settle(&outcome);
            tokio::select! {
                _ = &mut shutdown => {
                    info!(failures = self.failures, "poll scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
