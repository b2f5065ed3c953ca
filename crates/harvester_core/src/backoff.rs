use std::time::Duration;

/// Exponential backoff bounded by a cap: `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        next_delay(self.base, self.cap, attempt)
    }
}

/// Pure delay computation. Saturates to `cap` instead of overflowing.
pub fn next_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |delay| delay.min(cap))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    Wait(Duration),
    /// The cap was already waited out once; escalate.
    GiveUp,
}

/// Transient state of one retry driver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    pub label: String,
    pub attempt: u32,
    pub current_delay: Duration,
    waited_cap: bool,
}

impl RetryAttempt {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attempt: 0,
            current_delay: Duration::ZERO,
            waited_cap: false,
        }
    }

    /// Records a transient failure and decides what the driver does next.
    ///
    /// The cap may be waited once; a second failure at the cap gives up.
    pub fn on_transient(&mut self, policy: &BackoffPolicy) -> RetryDecision {
        let delay = policy.delay_for(self.attempt);
        if delay >= policy.cap {
            if self.waited_cap {
                return RetryDecision::GiveUp;
            }
            self.waited_cap = true;
        }
        self.current_delay = delay;
        self.attempt += 1;
        RetryDecision::Wait(delay)
    }
}
