use std::fmt::Display;
use std::thread;
use std::time::Duration;

/// How many times a fallible file operation is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Wait before the first retry
    pub delay: Duration,
    /// Multiplier applied to `delay` for every further retry. 1 keeps the delay fixed
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_millis(500),
            factor: 1,
        }
    }
}

/// Outcome of a single attempt that did not succeed.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth trying again after the delay
    Transient(E),
    /// Retrying cannot help, give up now
    Permanent(E),
}

#[derive(Debug)]
pub struct Succeeded<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
    pub permanent: bool,
}

impl RetryPolicy {
    /// Single attempt, never retried.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
            factor: 1,
        }
    }

    /// `retries` additional attempts after the first one, `delay` apart.
    pub fn retries(retries: u32, delay: Duration) -> Self {
        Self {
            attempts: retries.saturating_add(1),
            delay,
            factor: 1,
        }
    }

    pub fn backoff(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Wait before retry number `retry` (1-based): `delay * factor^(retry - 1)`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let scale = self
            .factor
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.delay.saturating_mul(scale)
    }

    /// Run `op` until it succeeds, fails permanently or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Every failure is logged against `what`.
    pub fn run<T, E: Display>(
        &self,
        what: impl Display,
        mut op: impl FnMut(u32) -> Result<T, AttemptError<E>>,
    ) -> Result<Succeeded<T>, Exhausted<E>> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{what}: succeeded after {attempt} attempts");
                    }
                    return Ok(Succeeded {
                        value,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Permanent(error)) => {
                    log::warn!("{what}: {error}");
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                        permanent: true,
                    });
                }
                Err(AttemptError::Transient(error)) => {
                    log::warn!("{what}: attempt {attempt}/{} failed: {error}", self.attempts);
                    if attempt >= self.attempts {
                        return Err(Exhausted {
                            error,
                            attempts: attempt,
                            permanent: false,
                        });
                    }
                    thread::sleep(self.delay_before(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
            factor: 1,
        }
    }

    #[test]
    fn test_default_is_one_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.delay_before(1), Duration::from_millis(500));
        assert_eq!(policy, RetryPolicy::retries(1, Duration::from_millis(500)));
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::retries(4, Duration::from_millis(100)).backoff(2);
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        // overflow saturates instead of wrapping
        assert!(policy.delay_before(64) >= Duration::from_millis(100) * 1024);
    }

    #[test]
    fn test_succeeds_on_retry() {
        let mut calls = 0;
        let result = quick(2).run("op", |attempt| {
            calls += 1;
            if attempt == 1 {
                Err(AttemptError::Transient("locked"))
            } else {
                Ok(attempt)
            }
        });
        let ok = result.unwrap();
        assert_eq!(ok.value, 2);
        assert_eq!(ok.attempts, 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_budget_is_respected() {
        let mut calls = 0;
        let result: Result<Succeeded<()>, _> = quick(2).run("op", |_| {
            calls += 1;
            Err(AttemptError::Transient("locked"))
        });
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(!err.permanent);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_permanent_stops_immediately() {
        let mut calls = 0;
        let result: Result<Succeeded<()>, _> = quick(5).run("op", |_| {
            calls += 1;
            Err(AttemptError::Permanent("gone"))
        });
        let err = result.unwrap_err();
        assert!(err.permanent);
        assert_eq!(err.error, "gone");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_once_never_retries() {
        let mut calls = 0;
        let result: Result<Succeeded<()>, _> = RetryPolicy::once().run("op", |_| {
            calls += 1;
            Err(AttemptError::Transient("locked"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
