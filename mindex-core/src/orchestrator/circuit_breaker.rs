use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-source failure accountant with CLOSED/OPEN/HALF_OPEN states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_requests: 3,
        }
    }
}

#[derive(Debug)]
pub struct CircuitOpenError;

struct Inner {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// Mutations are confined to the owning per-collector task (spec.md §5), so
/// a `Mutex` here only guards against incidental cross-task reads (e.g. a
/// status endpoint), never concurrent writers.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Runs `f` under the breaker: fails fast with [`CircuitOpenError`] while
    /// OPEN (unless `recovery_timeout` has elapsed, in which case it allows
    /// exactly this call through as a HALF_OPEN probe). Every `Err` counts
    /// toward the failure threshold; use [`CircuitBreaker::call_filtered`]
    /// when some error kinds should not.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<Result<T, E>, CircuitOpenError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_filtered(f, |_| true).await
    }

    /// Like [`CircuitBreaker::call`], but `counts_as_failure` decides whether
    /// a given `Err` should move the breaker's failure count; an error for
    /// which it returns `false` is still returned to the caller but leaves
    /// the breaker's state untouched.
    pub async fn call_filtered<F, Fut, T, E>(
        &self,
        f: F,
        counts_as_failure: impl Fn(&E) -> bool,
    ) -> Result<Result<T, E>, CircuitOpenError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == CircuitState::Open {
                let elapsed = inner.last_failure.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                } else {
                    return Err(CircuitOpenError);
                }
            }
        }

        let result = f().await;

        let mut inner = self.inner.lock().unwrap();
        match &result {
            Ok(_) => match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                }
                CircuitState::HalfOpen => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_requests {
                        inner.state = CircuitState::Closed;
                        inner.failure_count = 0;
                        inner.half_open_successes = 0;
                    }
                }
                CircuitState::Open => unreachable!("handled above"),
            },
            Err(err) if !counts_as_failure(err) => {}
            Err(_) => {
                inner.last_failure = Some(Instant::now());
                match inner.state {
                    CircuitState::Closed => {
                        inner.failure_count += 1;
                        if inner.failure_count >= self.config.failure_threshold {
                            inner.state = CircuitState::Open;
                        }
                    }
                    CircuitState::HalfOpen => {
                        inner.state = CircuitState::Open;
                        inner.half_open_successes = 0;
                    }
                    CircuitState::Open => unreachable!("handled above"),
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> Result<(), &'static str> {
        Ok(())
    }
    async fn fail() -> Result<(), &'static str> {
        Err("boom")
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_requests: 3,
        });
        for _ in 0..4 {
            let _ = breaker.call(fail).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        let _ = breaker.call(fail).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_fails_fast_before_recovery_timeout() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(3600),
            half_open_requests: 1,
        });
        let _ = breaker.call(fail).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        let result = breaker.call(ok).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn half_open_closes_after_required_successes() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(0),
            half_open_requests: 3,
        });
        let _ = breaker.call(fail).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        for _ in 0..2 {
            let _ = breaker.call(ok).await;
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
        }
        let _ = breaker.call(ok).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_returns_to_open() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(0),
            half_open_requests: 3,
        });
        let _ = breaker.call(fail).await;
        let _ = breaker.call(ok).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let _ = breaker.call(fail).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn call_filtered_ignores_excluded_errors() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            half_open_requests: 1,
        });
        for _ in 0..5 {
            let _ = breaker.call_filtered(fail, |_| false).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
