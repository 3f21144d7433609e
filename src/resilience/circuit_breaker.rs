//! Per-route circuit breaker
//!
//! Each route owns an independent breaker. State and the consecutive failure
//! count live in a single `AtomicU64` updated by compare-and-swap, so a
//! success reset and a failure increment racing on the same route are
//! linearizable and never lose an update. A second atomic stores the time of
//! the last Open or HalfOpen transition; claiming the HalfOpen trial is a CAS
//! on that timestamp, so exactly one caller wins it.
//!
//! Transitions:
//! - Closed → Open after `failure_threshold` consecutive failures
//! - Open → HalfOpen once `recovery_timeout` has elapsed (one trial admitted)
//! - HalfOpen → Closed on trial success, HalfOpen → Open on trial failure
//!
//! A trial whose outcome is never recorded (caller dropped) is treated as
//! stale after another `recovery_timeout` and a new trial is admitted.

use crate::config::CircuitBreakerConfig;
use crate::operation::Route;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit state of one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    fn to_bits(self) -> u64 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Result of asking a breaker for permission to call its route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed, call normally
    Allowed,
    /// Caller holds the single HalfOpen trial
    Trial,
    /// Breaker open, do not call
    Rejected,
}

/// Diagnostic view of one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

const STATE_SHIFT: u32 = 32;
const FAILURE_MASK: u64 = 0xFFFF_FFFF;

fn pack(state: CircuitState, failures: u32) -> u64 {
    (state.to_bits() << STATE_SHIFT) | u64::from(failures)
}

fn unpack(word: u64) -> (CircuitState, u32) {
    (
        CircuitState::from_bits(word >> STATE_SHIFT),
        (word & FAILURE_MASK) as u32,
    )
}

/// Breaker for a single route
#[derive(Debug)]
pub struct RouteBreaker {
    route: Route,
    failure_threshold: u32,
    recovery_timeout_ms: u64,
    epoch: Instant,
    word: AtomicU64,
    /// Milliseconds since `epoch` of the last Open/HalfOpen transition
    transitioned_at_ms: AtomicU64,
}

impl RouteBreaker {
    fn new(route: Route, failure_threshold: u32, recovery_timeout: Duration, epoch: Instant) -> Self {
        Self {
            route,
            failure_threshold: failure_threshold.max(1),
            recovery_timeout_ms: recovery_timeout.as_millis() as u64,
            epoch,
            word: AtomicU64::new(pack(CircuitState::Closed, 0)),
            transitioned_at_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn recovery_elapsed(&self, since_ms: u64) -> bool {
        self.now_ms().saturating_sub(since_ms) >= self.recovery_timeout_ms
    }

    pub fn status(&self) -> CircuitStatus {
        let (state, consecutive_failures) = unpack(self.word.load(Ordering::SeqCst));
        CircuitStatus {
            state,
            consecutive_failures,
        }
    }

    /// True while no regular call may be attempted
    ///
    /// An Open breaker whose recovery timeout has elapsed reports false: the
    /// next `try_acquire` will be admitted as the HalfOpen trial.
    pub fn is_open(&self) -> bool {
        let (state, _) = unpack(self.word.load(Ordering::SeqCst));
        match state {
            CircuitState::Closed => false,
            CircuitState::Open | CircuitState::HalfOpen => {
                !self.recovery_elapsed(self.transitioned_at_ms.load(Ordering::SeqCst))
            }
        }
    }

    /// Ask permission to call the route, claiming the trial when due
    pub fn try_acquire(&self) -> Admission {
        loop {
            let current = self.word.load(Ordering::SeqCst);
            let (state, failures) = unpack(current);
            if state == CircuitState::Closed {
                return Admission::Allowed;
            }

            let since = self.transitioned_at_ms.load(Ordering::SeqCst);
            if !self.recovery_elapsed(since) {
                return Admission::Rejected;
            }

            // Claim the trial. Losers observe a fresh timestamp and are rejected.
            let now = self.now_ms();
            if self
                .transitioned_at_ms
                .compare_exchange(since, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }

            if state == CircuitState::HalfOpen {
                tracing::warn!(
                    route = %self.route,
                    "Previous half-open trial never reported, admitting a new trial"
                );
                return Admission::Trial;
            }

            match self.word.compare_exchange(
                current,
                pack(CircuitState::HalfOpen, failures),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    tracing::info!(route = %self.route, "Circuit half-open, admitting one trial");
                    return Admission::Trial;
                }
                // Reset raced with the claim; re-evaluate against the new state
                Err(_) => continue,
            }
        }
    }

    /// Record an execution outcome; returns the new state if it changed
    ///
    /// Outcomes recorded while Open are ignored.
    pub fn record_outcome(&self, success: bool) -> Option<CircuitState> {
        self.apply_outcome(success, false)
    }

    /// Record the outcome of a forced attempt that skipped admission
    ///
    /// Only a Closed breaker counts it. A forced attempt never decides the
    /// HalfOpen trial, which belongs to the call that claimed it.
    pub fn record_forced_outcome(&self, success: bool) -> Option<CircuitState> {
        self.apply_outcome(success, true)
    }

    fn apply_outcome(&self, success: bool, forced: bool) -> Option<CircuitState> {
        loop {
            let current = self.word.load(Ordering::SeqCst);
            let (state, failures) = unpack(current);
            if forced && state != CircuitState::Closed {
                return None;
            }

            let next = match (state, success) {
                (CircuitState::Open, _) => return None,
                (CircuitState::Closed, true) if failures == 0 => return None,
                (CircuitState::Closed, true) | (CircuitState::HalfOpen, true) => {
                    pack(CircuitState::Closed, 0)
                }
                (CircuitState::Closed, false) => {
                    let failures = failures.saturating_add(1);
                    if failures >= self.failure_threshold {
                        // Timestamp first so no reader sees Open with a stale time
                        self.transitioned_at_ms
                            .store(self.now_ms(), Ordering::SeqCst);
                        pack(CircuitState::Open, failures)
                    } else {
                        pack(CircuitState::Closed, failures)
                    }
                }
                (CircuitState::HalfOpen, false) => {
                    self.transitioned_at_ms
                        .store(self.now_ms(), Ordering::SeqCst);
                    pack(CircuitState::Open, failures.saturating_add(1))
                }
            };

            if self
                .word
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let (new_state, new_failures) = unpack(next);
                if new_state == state {
                    tracing::debug!(
                        route = %self.route,
                        consecutive_failures = new_failures,
                        "Circuit outcome recorded"
                    );
                    return None;
                }
                match new_state {
                    CircuitState::Open => tracing::warn!(
                        route = %self.route,
                        consecutive_failures = new_failures,
                        from = state.as_str(),
                        "Circuit opened"
                    ),
                    _ => tracing::info!(
                        route = %self.route,
                        from = state.as_str(),
                        "Circuit closed"
                    ),
                }
                return Some(new_state);
            }
        }
    }

    /// Force the breaker closed with a zero failure count
    pub fn reset(&self) {
        self.transitioned_at_ms
            .store(self.now_ms(), Ordering::SeqCst);
        let previous = self
            .word
            .swap(pack(CircuitState::Closed, 0), Ordering::SeqCst);
        tracing::info!(
            route = %self.route,
            previous_state = unpack(previous).0.as_str(),
            "Circuit manually reset"
        );
    }
}

/// Independent breakers for both routes
#[derive(Debug)]
pub struct CircuitBreakers {
    breakers: [RouteBreaker; 2],
}

impl CircuitBreakers {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        let epoch = Instant::now();
        let build = |route| {
            RouteBreaker::new(
                route,
                config.failure_threshold,
                config.recovery_timeout(),
                epoch,
            )
        };
        Self {
            breakers: [build(Route::Direct), build(Route::Broker)],
        }
    }

    pub fn breaker(&self, route: Route) -> &RouteBreaker {
        &self.breakers[route.index()]
    }

    pub fn is_open(&self, route: Route) -> bool {
        self.breaker(route).is_open()
    }

    pub fn try_acquire(&self, route: Route) -> Admission {
        self.breaker(route).try_acquire()
    }

    pub fn record_outcome(&self, route: Route, success: bool) -> Option<CircuitState> {
        self.breaker(route).record_outcome(success)
    }

    pub fn record_forced_outcome(&self, route: Route, success: bool) -> Option<CircuitState> {
        self.breaker(route).record_forced_outcome(success)
    }

    pub fn reset(&self, route: Route) {
        self.breaker(route).reset();
    }

    /// Current state of every route, for operator diagnosis
    pub fn status(&self) -> BTreeMap<Route, CircuitStatus> {
        Route::ALL
            .iter()
            .map(|&route| (route, self.breaker(route).status()))
            .collect()
    }
}
