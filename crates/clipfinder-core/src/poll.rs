//! Poll-with-timeout primitive used while waiting on acquisitions

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { waited: Duration },
    TimedOut { waited: Duration },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn waited(&self) -> Duration {
        match self {
            PollOutcome::Ready { waited } | PollOutcome::TimedOut { waited } => *waited,
        }
    }
}

/// Checks a condition every `interval` until it holds or `budget` is spent
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    budget: Duration,
}

impl Poller {
    pub fn new(interval: Duration, budget: Duration) -> Self {
        Self {
            interval: interval.min(budget),
            budget,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Same interval, smaller budget
    pub fn with_budget(&self, budget: Duration) -> Self {
        Self::new(self.interval, budget)
    }

    /// The condition is always checked at least once, even with a zero budget
    pub fn wait_until<F>(&self, mut ready: F) -> PollOutcome
    where
        F: FnMut() -> bool,
    {
        let started = Instant::now();
        loop {
            if ready() {
                return PollOutcome::Ready {
                    waited: started.elapsed(),
                };
            }

            let waited = started.elapsed();
            if waited >= self.budget {
                return PollOutcome::TimedOut { waited };
            }

            let remaining = self.budget - waited;
            let nap = self.interval.min(remaining);
            if nap.is_zero() {
                std::thread::yield_now();
            } else {
                std::thread::sleep(nap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_immediately() {
        let poller = Poller::new(Duration::from_millis(50), Duration::from_secs(10));
        let outcome = poller.wait_until(|| true);
        assert!(outcome.is_ready());
        assert!(outcome.waited() < Duration::from_millis(50));
    }

    #[test]
    fn test_ready_after_a_few_polls() {
        let poller = Poller::new(Duration::from_millis(1), Duration::from_secs(5));
        let mut calls = 0;
        let outcome = poller.wait_until(|| {
            calls += 1;
            calls == 4
        });
        assert!(outcome.is_ready());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_times_out() {
        let poller = Poller::new(Duration::from_millis(2), Duration::from_millis(10));
        let outcome = poller.wait_until(|| false);
        assert!(!outcome.is_ready());
        assert!(outcome.waited() >= Duration::from_millis(10));
    }

    #[test]
    fn test_zero_budget_checks_once() {
        let poller = Poller::new(Duration::from_secs(1), Duration::ZERO);
        assert_eq!(poller.interval(), Duration::ZERO);
        let mut calls = 0;
        let outcome = poller.wait_until(|| {
            calls += 1;
            false
        });
        assert!(!outcome.is_ready());
        assert_eq!(calls, 1);
    }
}
