// src/brain/guard.rs
// Request pacing and failure isolation for networked providers.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Sliding-window limiter: at most `max_calls` acquisitions per `period`.
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    calls: tokio::sync::Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            calls: tokio::sync::Mutex::new(VecDeque::new()),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait_for = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|first| now.duration_since(*first) >= self.period)
                {
                    calls.pop_front();
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                match calls.front() {
                    Some(first) => self.period.saturating_sub(now.duration_since(*first)),
                    None => Duration::ZERO,
                }
            };
            sleep(wait_for).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Closed -> Open after `failure_threshold` consecutive failures; Open -> HalfOpen
/// once `recovery` has elapsed; any failure while HalfOpen re-opens.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery: recovery.max(Duration::from_secs(1)),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *inner.opened_at.get_or_insert_with(Instant::now);
                if opened_at.elapsed() >= self.recovery {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.opened_at = None;
        inner.state = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        if inner.state == CircuitState::HalfOpen || inner.failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn seconds_until_retry(&self) -> f64 {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => self
                .recovery
                .saturating_sub(opened_at.elapsed())
                .as_secs_f64(),
            _ => 0.0,
        }
    }
}
