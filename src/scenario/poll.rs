//! Convergence polling
//!
//! Nodes converge asynchronously after relay, reconnect, and block
//! generation; scenarios observe convergence by polling a predicate at a
//! fixed interval. The deadline is optional: an unbounded poller hangs on
//! a bug instead of masking it with a flaky timeout, so scenarios opt in
//! to deadlines explicitly.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Terminal result of a polling wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    TimedOut,
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied)
    }
}

/// Repeatedly evaluates a predicate until it holds
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    deadline: Option<Duration>,
}

impl Poller {
    /// A poller with the given re-check interval and no deadline
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Bound the total wait; `TimedOut` is returned once it elapses
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Poll `probe` until it returns true, the deadline elapses, or the
    /// probe fails. The probe decides which of its errors are fatal;
    /// transient conditions belong inside it, mapped to `Ok(false)`.
    pub async fn wait_for<F, Fut, E>(&self, mut probe: F) -> Result<PollOutcome, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let started = Instant::now();
        loop {
            if probe().await? {
                return Ok(PollOutcome::Satisfied);
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.interval >= deadline {
                    return Ok(PollOutcome::TimedOut);
                }
            }
            sleep(self.interval).await;
        }
    }
}
