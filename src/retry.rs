use std::time::Duration;

/// Bounded attempt counter with a fixed delay between attempts.
///
/// Lives only for the duration of network bring-up. A budget of zero
/// attempts is raised to one: bring-up always probes at least once.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    backoff: Duration,
    used: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            used: 0,
        }
    }

    /// Consume one attempt, returning its 1-based number, or `None` once exhausted.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.used >= self.max_attempts {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    /// Whether another attempt remains after the ones already taken.
    pub fn has_remaining(&self) -> bool {
        self.used < self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts consumed so far.
    pub fn used(&self) -> u32 {
        self.used
    }
}
