//! Circuit breaker for command protection.
//!
//! # States
//! - Closed: normal operation, outcomes counted in a rolling window
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: window volume >= threshold and error % >= threshold
//! Open → Half-Open: first call after the sleep window becomes the probe
//! Half-Open → Closed: probe succeeds (or answers with an exempt failure)
//! Half-Open → Open: probe fails or times out
//! any → Closed: force_close()
//! ```
//!
//! # Design Decisions
//! - Per-command circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open (prevents hammering recovering dependency)
//! - Concurrency bound is a non-blocking semaphore; saturation rejects
//!   without touching the window
//! - Timeout cancels by dropping the guarded future
//! - A probe that never reports (cancelled request) hands the probe back

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::rolling::RollingWindow;

/// Structurally invalid breaker configuration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerConfigError {
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("error_percent_threshold {0} is outside 1..=100")]
    ErrorPercent(u32),

    #[error("rolling window of {window_ms}ms cannot hold {buckets} buckets of at least 1ms")]
    BucketTooNarrow { window_ms: u64, buckets: u32 },
}

impl CircuitBreakerConfig {
    /// Every structural problem in this configuration.
    pub fn problems(&self) -> Vec<BreakerConfigError> {
        let mut problems = Vec::new();
        let positive = [
            ("timeout_ms", self.timeout_ms),
            ("sleep_window_ms", self.sleep_window_ms),
            ("max_concurrent_requests", u64::from(self.max_concurrent_requests)),
            ("request_volume_threshold", u64::from(self.request_volume_threshold)),
            ("rolling_window_ms", self.rolling_window_ms),
            ("rolling_buckets", u64::from(self.rolling_buckets)),
        ];
        problems.extend(
            positive
                .into_iter()
                .filter(|(_, value)| *value == 0)
                .map(|(field, _)| BreakerConfigError::NonPositive(field)),
        );

        if !(1..=100).contains(&self.error_percent_threshold) {
            problems.push(BreakerConfigError::ErrorPercent(self.error_percent_threshold));
        }
        if self.rolling_buckets > 0
            && self.rolling_window_ms > 0
            && self.rolling_window_ms < u64::from(self.rolling_buckets)
        {
            problems.push(BreakerConfigError::BucketTooNarrow {
                window_ms: self.rolling_window_ms,
                buckets: self.rolling_buckets,
            });
        }
        problems
    }

    pub fn validate(&self) -> Result<(), BreakerConfigError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }
}

/// Guard-level rejection. The wrapped call either never ran or was
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BreakerError {
    #[error("circuit is open")]
    Open,

    #[error("too many concurrent requests")]
    ConcurrencyLimit,

    #[error("timeout")]
    Timeout,
}

impl BreakerError {
    /// Label used for the `reason` metric dimension.
    pub fn reason(self) -> &'static str {
        match self {
            BreakerError::Open => "open",
            BreakerError::ConcurrencyLimit => "concurrency_limit",
            BreakerError::Timeout => "timeout",
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        })
    }
}

/// How the guarded call wants its result accounted.
#[derive(Debug)]
pub enum Verdict<T> {
    Success(T),
    /// Counts against the rolling error rate.
    Failure(T),
    /// A failure that says nothing about dependency health.
    Exempt(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

impl State {
    fn public(self) -> CircuitState {
        match self {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Success,
    Failure,
    Exempt,
}

#[derive(Debug)]
struct Inner {
    state: State,
    window: RollingWindow,
}

/// Per-command circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    slots: Semaphore,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self, BreakerConfigError> {
        config.validate()?;
        let window = RollingWindow::new(config.rolling_window(), config.rolling_buckets);
        let name = name.into();
        metrics::record_circuit_state(&name, CircuitState::Closed);
        Ok(Self {
            slots: Semaphore::new(config.max_concurrent_requests as usize),
            inner: Mutex::new(Inner {
                state: State::Closed,
                window,
            }),
            name,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state.public()
    }

    /// Run `call` under the breaker.
    ///
    /// The call's own value is returned whatever its verdict; `Err` means
    /// the guard rejected or cancelled it.
    pub async fn execute<T, F>(&self, call: F) -> Result<T, BreakerError>
    where
        F: Future<Output = Verdict<T>>,
    {
        let ticket = self.admit()?;

        // Load shedding says nothing about dependency health: nothing is
        // recorded, and a refused probe is handed back.
        let Ok(_permit) = self.slots.try_acquire() else {
            drop(ticket);
            return Err(BreakerError::ConcurrencyLimit);
        };

        match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(Verdict::Success(value)) => {
                ticket.settle(Settlement::Success);
                Ok(value)
            }
            Ok(Verdict::Failure(value)) => {
                ticket.settle(Settlement::Failure);
                Ok(value)
            }
            Ok(Verdict::Exempt(value)) => {
                ticket.settle(Settlement::Exempt);
                Ok(value)
            }
            Err(_) => {
                ticket.settle(Settlement::Failure);
                Err(BreakerError::Timeout)
            }
        }
    }

    /// Close the circuit regardless of its current state.
    pub fn force_close(&self) {
        let mut inner = self.lock();
        if inner.state != State::Closed {
            self.transition(&mut inner, State::Closed);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    fn admit(&self) -> Result<Ticket<'_>, BreakerError> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            State::Closed => Ok(Ticket::new(self, None)),
            State::Open { since }
                if now.saturating_duration_since(since) >= self.config.sleep_window() =>
            {
                self.transition(&mut inner, State::HalfOpen);
                Ok(Ticket::new(self, Some(since)))
            }
            State::Open { .. } | State::HalfOpen => Err(BreakerError::Open),
        }
    }

    fn settle(&self, probe: bool, settlement: Settlement) {
        let now = Instant::now();
        let mut inner = self.lock();
        let probing = probe && inner.state == State::HalfOpen;

        match settlement {
            Settlement::Success => {
                inner.window.record_success(now);
                if probing {
                    self.transition(&mut inner, State::Closed);
                }
            }
            Settlement::Exempt => {
                if probing {
                    self.transition(&mut inner, State::Closed);
                }
            }
            Settlement::Failure => {
                inner.window.record_failure(now);
                if probing || (inner.state == State::Closed && self.should_trip(&inner, now)) {
                    self.transition(&mut inner, State::Open { since: now });
                }
            }
        }
    }

    /// A probe that went away without a verdict. The circuit goes back to
    /// open with its original start so the next caller probes at once.
    fn abandon_probe(&self, since: Instant) {
        let mut inner = self.lock();
        if inner.state == State::HalfOpen {
            self.transition(&mut inner, State::Open { since });
        }
    }

    fn should_trip(&self, inner: &Inner, now: Instant) -> bool {
        let totals = inner.window.totals(now);
        totals.requests >= u64::from(self.config.request_volume_threshold)
            && totals.error_percent() >= u64::from(self.config.error_percent_threshold)
    }

    fn transition(&self, inner: &mut Inner, next: State) {
        let from = inner.state.public();
        inner.state = next;
        let to = next.public();

        match to {
            CircuitState::Closed => {
                inner.window.reset();
                tracing::info!(command = %self.name, %from, "circuit closed");
            }
            CircuitState::Open => {
                tracing::warn!(command = %self.name, %from, "circuit opened");
            }
            CircuitState::HalfOpen => {
                tracing::info!(command = %self.name, %from, "circuit half-open, probing");
            }
        }
        metrics::record_circuit_state(&self.name, to);
    }
}

/// Admission to a guarded call. Settling consumes it; dropping it unsettled
/// (the caller was cancelled) releases a held probe.
struct Ticket<'a> {
    breaker: &'a CircuitBreaker,
    probe_of: Option<Instant>,
    settled: bool,
}

impl<'a> Ticket<'a> {
    fn new(breaker: &'a CircuitBreaker, probe_of: Option<Instant>) -> Self {
        Self {
            breaker,
            probe_of,
            settled: false,
        }
    }

    fn settle(mut self, settlement: Settlement) {
        self.settled = true;
        self.breaker.settle(self.probe_of.is_some(), settlement);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(since) = self.probe_of {
            self.breaker.abandon_probe(since);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            timeout_ms: 1_000,
            sleep_window_ms: 5_000,
            max_concurrent_requests: 10,
            error_percent_threshold: 50,
            request_volume_threshold: 4,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError> {
        breaker.execute(async { Verdict::Failure(()) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError> {
        breaker.execute(async { Verdict::Success(()) }).await
    }

    /// Open the circuit while the only slot is held elsewhere.
    fn trip(breaker: &CircuitBreaker) {
        let mut inner = breaker.lock();
        breaker.transition(&mut inner, State::Open { since: Instant::now() });
    }

    async fn tripped() -> CircuitBreaker {
        let breaker = CircuitBreaker::new("cmd", config()).unwrap();
        for _ in 0..4 {
            fail(&breaker).await.unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut cfg = config();
        cfg.timeout_ms = 0;
        assert_eq!(
            CircuitBreaker::new("cmd", cfg).unwrap_err(),
            BreakerConfigError::NonPositive("timeout_ms")
        );

        let mut cfg = config();
        cfg.rolling_window_ms = 5;
        assert!(matches!(
            cfg.validate(),
            Err(BreakerConfigError::BucketTooNarrow { window_ms: 5, buckets: 10 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_volume() {
        let breaker = CircuitBreaker::new("cmd", config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await.unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_error_percent() {
        let breaker = CircuitBreaker::new("cmd", config()).unwrap();
        for _ in 0..4 {
            succeed(&breaker).await.unwrap();
        }
        fail(&breaker).await.unwrap();
        fail(&breaker).await.unwrap();
        fail(&breaker).await.unwrap();
        // 3 of 7 failed.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_short_circuits() {
        let breaker = tripped().await;
        let calls = AtomicUsize::new(0);

        let result = breaker
            .execute(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Verdict::Success(())
            })
            .await;

        assert_eq!(result, Err(BreakerError::Open));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_age_out_of_window() {
        let breaker = CircuitBreaker::new("cmd", config()).unwrap();
        for _ in 0..3 {
            fail(&breaker).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let breaker = tripped().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Window was reset on close; one failure does not reopen.
        fail(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let breaker = tripped().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        fail(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(succeed(&breaker).await, Err(BreakerError::Open));

        // A fresh sleep window starts from the failed probe.
        tokio::time::advance(Duration::from_secs(5)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_in_half_open() {
        let breaker = Arc::new(tripped().await);
        tokio::time::advance(Duration::from_secs(5)).await;

        let (release, hold) = oneshot::channel::<()>();
        let probe = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(async {
                        hold.await.ok();
                        Verdict::Success(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert_eq!(succeed(&breaker).await, Err(BreakerError::Open));

        release.send(()).unwrap();
        probe.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_hands_probe_back() {
        let breaker = tripped().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        {
            let pending = breaker.execute(std::future::pending::<Verdict<()>>());
            tokio::pin!(pending);
            assert!(futures_util::poll!(pending.as_mut()).is_pending());
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exempt_not_counted() {
        let breaker = CircuitBreaker::new("cmd", config()).unwrap();
        for _ in 0..10 {
            breaker.execute(async { Verdict::Exempt(()) }).await.unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_close() {
        let breaker = tripped().await;
        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new("cmd", config()).unwrap();
        for _ in 0..4 {
            let result = breaker
                .execute(async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Verdict::Success(())
                })
                .await;
            assert_eq!(result, Err(BreakerError::Timeout));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit() {
        let mut cfg = config();
        cfg.max_concurrent_requests = 1;
        cfg.timeout_ms = 60_000;
        let breaker = Arc::new(CircuitBreaker::new("cmd", cfg).unwrap());

        let (release, hold) = oneshot::channel::<()>();
        let running = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(async {
                        hold.await.ok();
                        Verdict::Success(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let calls = AtomicUsize::new(0);
        let result = breaker
            .execute(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Verdict::Success(())
            })
            .await;
        assert_eq!(result, Err(BreakerError::ConcurrencyLimit));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        running.await.unwrap().unwrap();
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_rejections_do_not_open_circuit() {
        let mut cfg = config();
        cfg.max_concurrent_requests = 1;
        cfg.timeout_ms = 60_000;
        let breaker = Arc::new(CircuitBreaker::new("cmd", cfg).unwrap());

        let (release, hold) = oneshot::channel::<()>();
        let running = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(async {
                        hold.await.ok();
                        Verdict::Success(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        for _ in 0..4 {
            assert_eq!(succeed(&breaker).await, Err(BreakerError::ConcurrencyLimit));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        release.send(()).unwrap();
        running.await.unwrap().unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_half_open_call_is_handed_back() {
        let mut cfg = config();
        cfg.max_concurrent_requests = 1;
        cfg.timeout_ms = 60_000;
        let breaker = Arc::new(CircuitBreaker::new("cmd", cfg).unwrap());

        let (release, hold) = oneshot::channel::<()>();
        let running = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(async {
                        hold.await.ok();
                        Verdict::Failure(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        trip(&breaker);
        tokio::time::advance(Duration::from_secs(5)).await;

        // The probe finds no free slot and gives its turn back.
        assert_eq!(succeed(&breaker).await, Err(BreakerError::ConcurrencyLimit));
        assert_eq!(breaker.state(), CircuitState::Open);

        release.send(()).unwrap();
        running.await.unwrap().unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
