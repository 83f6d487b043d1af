
//! Retry, backoff and circuit breaking around single-attempt calls.
//!
//! A [`Policy`] re-invokes an operation while it returns [`UncertainResult::Retryable`] and
//! returns as soon as it yields `Success` or `Failure`. Attempts run one after another, never
//! concurrently. Each attempt gets a child of the caller's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::uncertain::UncertainResult;

pub trait Policy: Send + Sync {
    fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> impl Future<Output = UncertainResult<T>> + Send
    where
        T: Send,
        F: FnMut(CancellationToken) -> Fut + Send,
        Fut: Future<Output = UncertainResult<T>> + Send;
}

/// Runs the operation exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleAttempt;

impl Policy for SingleAttempt {
    fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> impl Future<Output = UncertainResult<T>> + Send
    where
        T: Send,
        F: FnMut(CancellationToken) -> Fut + Send,
        Fut: Future<Output = UncertainResult<T>> + Send,
    {
        operation(cancel.child_token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    None,
    Constant(Duration),
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay after the given number of failed attempts (starting at 1).
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Constant(delay) => delay,
            Self::Exponential { initial, factor, max } => {
                let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    max_elapsed: Option<Duration>,
    attempt_timeout: Option<Duration>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::None,
            max_elapsed: None,
            attempt_timeout: None,
            circuit_breaker: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stops retrying when the next backoff would end past this budget.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn for_query_creation() -> Self {
        Self::new(5)
            .with_backoff(Backoff::Exponential {
                initial: Duration::from_millis(100),
                factor: 2.0,
                max: Duration::from_secs(2),
            })
            .with_max_elapsed(Duration::from_secs(30))
            .with_attempt_timeout(Duration::from_secs(10))
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(5, Duration::from_secs(5))))
    }

    pub fn for_synthesis() -> Self {
        Self::new(3)
            .with_backoff(Backoff::Exponential {
                initial: Duration::from_millis(250),
                factor: 2.0,
                max: Duration::from_secs(4),
            })
            .with_max_elapsed(Duration::from_secs(60))
            .with_attempt_timeout(Duration::from_secs(60))
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(5, Duration::from_secs(10))))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    async fn run_attempt<T, F, Fut>(&self, cancel: &CancellationToken, operation: &mut F) -> UncertainResult<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = UncertainResult<T>>,
    {
        let token = cancel.child_token();
        let Some(limit) = self.attempt_timeout else {
            return operation(token).await;
        };

        match tokio::time::timeout(limit, operation(token.clone())).await {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                UncertainResult::retry(format!("Retryable because the attempt timed out after {:?}.", limit))
            }
        }
    }
}

impl Policy for RetryPolicy {
    fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> impl Future<Output = UncertainResult<T>> + Send
    where
        T: Send,
        F: FnMut(CancellationToken) -> Fut + Send,
        Fut: Future<Output = UncertainResult<T>> + Send,
    {
        async move {
            let started = Instant::now();
            let mut attempt = 0u32;

            loop {
                attempt += 1;

                if let Some(breaker) = &self.circuit_breaker {
                    if !breaker.try_acquire() {
                        return UncertainResult::retry(format!(
                            "Retryable because the circuit breaker is open (attempt {}).",
                            attempt
                        ));
                    }
                }

                let result = self.run_attempt(cancel, &mut operation).await;

                // A caller's own cancellation says nothing about the engine's health.
                if let Some(breaker) = self.circuit_breaker.as_ref().filter(|_| !cancel.is_cancelled()) {
                    breaker.record(&result);
                }

                let reason = match result {
                    UncertainResult::Retryable(reason) => reason,
                    settled => return settled,
                };

                if cancel.is_cancelled() {
                    return UncertainResult::Retryable(reason);
                }

                if attempt >= self.max_attempts {
                    log::warn!("Giving up after {} attempts: {}", attempt, reason);
                    return UncertainResult::retry(format!(
                        "Retryable because all {} attempts were exhausted, last reason -> {}",
                        attempt, reason
                    ));
                }

                let delay = self.backoff.delay(attempt);
                if let Some(max_elapsed) = self.max_elapsed {
                    if started.elapsed() + delay > max_elapsed {
                        log::warn!("Giving up after {} attempts, retry budget {:?} spent: {}", attempt, max_elapsed, reason);
                        return UncertainResult::retry(format!(
                            "Retryable because the retry budget of {:?} was spent after {} attempts, last reason -> {}",
                            max_elapsed, attempt, reason
                        ));
                    }
                }

                log::warn!("Attempt {} failed, retrying in {:?}: {}", attempt, delay, reason);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return UncertainResult::Retryable(reason),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { probe_started: Instant },
}

/// Stops calling a service that keeps failing transiently.
///
/// Opens after `failure_threshold` consecutive retryable outcomes and rejects attempts for
/// `break_duration`. Then one probe is let through: success or a permanent failure closes the
/// breaker, another retryable outcome opens it again. A probe that never reports back is
/// replaced after `break_duration`.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    break_duration: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, break_duration: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            break_duration,
            state: Mutex::new(BreakerState::Closed { consecutive_failures: 0 }),
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.state.lock() {
            BreakerState::Closed { .. } => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether an attempt may be made now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } if now >= until => {
                log::info!("Circuit breaker half-open, letting a probe through");
                *state = BreakerState::HalfOpen { probe_started: now };
                true
            }
            BreakerState::Open { .. } => false,
            BreakerState::HalfOpen { probe_started } if now.duration_since(probe_started) >= self.break_duration => {
                *state = BreakerState::HalfOpen { probe_started: now };
                true
            }
            BreakerState::HalfOpen { .. } => false,
        }
    }

    pub fn record<T>(&self, result: &UncertainResult<T>) {
        let mut state = self.state.lock();
        let now = Instant::now();

        *state = match (*state, result) {
            (BreakerState::Closed { consecutive_failures }, UncertainResult::Retryable(_)) => {
                let consecutive_failures = consecutive_failures + 1;
                if consecutive_failures >= self.failure_threshold {
                    log::warn!(
                        "Circuit breaker opened after {} consecutive failures, breaking for {:?}",
                        consecutive_failures,
                        self.break_duration
                    );
                    BreakerState::Open { until: now + self.break_duration }
                } else {
                    BreakerState::Closed { consecutive_failures }
                }
            }
            (BreakerState::Closed { .. }, UncertainResult::Success(_)) => {
                BreakerState::Closed { consecutive_failures: 0 }
            }
            (closed @ BreakerState::Closed { .. }, UncertainResult::Failure(_)) => closed,
            (BreakerState::HalfOpen { .. }, UncertainResult::Retryable(_)) => {
                log::warn!("Circuit breaker probe failed, breaking for {:?}", self.break_duration);
                BreakerState::Open { until: now + self.break_duration }
            }
            (BreakerState::HalfOpen { .. } | BreakerState::Open { .. }, UncertainResult::Success(_) | UncertainResult::Failure(_)) => {
                log::info!("Circuit breaker closed");
                BreakerState::Closed { consecutive_failures: 0 }
            }
            (open @ BreakerState::Open { .. }, UncertainResult::Retryable(_)) => open,
        };
    }
}
