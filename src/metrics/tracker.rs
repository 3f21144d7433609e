//! Rolling routing metrics
//!
//! A single actor task owns the sample window and recomputes the snapshot on
//! every recorded operation. The execution path only does a non-blocking
//! `try_send`; a full channel drops the sample with a warning instead of
//! slowing an operation down.

use crate::config::SlaConfig;
use crate::operation::{OperationClass, Outcome, Route};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

/// Channel capacity between the execution path and the actor
const CHANNEL_CAPACITY: usize = 4096;

/// Below this many samples recommendations are not meaningful
pub const MIN_SAMPLES_FOR_RECOMMENDATIONS: usize = 20;

const FALLBACK_RATE_LIMIT: f64 = 0.20;
const SUCCESS_RATE_FLOOR: f64 = 0.95;
const TIMEOUT_RATE_LIMIT: f64 = 0.05;
/// Fraction of the SLA budget at which p95 latency is flagged
const SLA_HEADROOM: f64 = 0.8;

/// One completed operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSample {
    pub class: OperationClass,
    /// Route of the final attempt, if any
    pub route: Option<Route>,
    pub outcome: Outcome,
    pub latency_ms: u64,
    /// A fallback decision was made for this operation
    pub fallback: bool,
    pub cost: f64,
}

/// Aggregates over the most recent `window_size` operations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingMetricsSnapshot {
    pub total_ops: usize,
    pub success_rate: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub fallback_rate: f64,
    pub timeout_rate: f64,
    pub total_cost: f64,
}

enum TrackerMessage {
    Record(OperationSample),
    GetSnapshot(oneshot::Sender<RoutingMetricsSnapshot>),
    GetRecommendations(oneshot::Sender<Vec<String>>),
}

/// Handle to the metrics tracker actor
#[derive(Clone)]
pub struct MetricsTracker {
    sender: mpsc::Sender<TrackerMessage>,
}

impl MetricsTracker {
    /// Spawn the actor; must be called inside a tokio runtime
    pub fn spawn(window_size: usize, sla: SlaConfig) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let actor = TrackerActor {
            receiver: rx,
            window: VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            sla,
            snapshot: RoutingMetricsSnapshot::default(),
        };
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Record a completed operation without blocking
    pub fn record(&self, sample: OperationSample) {
        if let Err(e) = self.sender.try_send(TrackerMessage::Record(sample)) {
            tracing::warn!(error = %e, "Metrics tracker backlog full, dropping sample");
        }
    }

    /// Current rolling snapshot
    ///
    /// Messages are processed in order, so the snapshot reflects every sample
    /// recorded through this handle before the call.
    pub async fn snapshot(&self) -> RoutingMetricsSnapshot {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(TrackerMessage::GetSnapshot(tx)).await.is_err() {
            tracing::error!("Metrics tracker actor stopped, returning empty snapshot");
            return RoutingMetricsSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Human-readable tuning heuristics for the current window
    pub async fn recommendations(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(TrackerMessage::GetRecommendations(tx))
            .await
            .is_err()
        {
            tracing::error!("Metrics tracker actor stopped, no recommendations available");
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

struct TrackerActor {
    receiver: mpsc::Receiver<TrackerMessage>,
    window: VecDeque<OperationSample>,
    window_size: usize,
    sla: SlaConfig,
    snapshot: RoutingMetricsSnapshot,
}

impl TrackerActor {
    async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            match message {
                TrackerMessage::Record(sample) => {
                    if self.window.len() == self.window_size {
                        self.window.pop_front();
                    }
                    self.window.push_back(sample);
                    self.snapshot = compute_snapshot(&self.window);
                }
                TrackerMessage::GetSnapshot(reply) => {
                    let _ = reply.send(self.snapshot.clone());
                }
                TrackerMessage::GetRecommendations(reply) => {
                    let _ = reply.send(recommend(&self.window, &self.snapshot, &self.sla));
                }
            }
        }
        tracing::debug!("Metrics tracker actor shutting down");
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn compute_snapshot(window: &VecDeque<OperationSample>) -> RoutingMetricsSnapshot {
    let total = window.len();
    let mut latencies: Vec<u64> = window.iter().map(|s| s.latency_ms).collect();
    latencies.sort_unstable();

    RoutingMetricsSnapshot {
        total_ops: total,
        success_rate: ratio(
            window
                .iter()
                .filter(|s| s.outcome == Outcome::Succeeded)
                .count(),
            total,
        ),
        p50_latency_ms: percentile(&latencies, 50.0),
        p95_latency_ms: percentile(&latencies, 95.0),
        fallback_rate: ratio(window.iter().filter(|s| s.fallback).count(), total),
        timeout_rate: ratio(
            window
                .iter()
                .filter(|s| s.outcome == Outcome::TimedOut)
                .count(),
            total,
        ),
        total_cost: window.iter().map(|s| s.cost).sum(),
    }
}

fn recommend(
    window: &VecDeque<OperationSample>,
    snapshot: &RoutingMetricsSnapshot,
    sla: &SlaConfig,
) -> Vec<String> {
    if snapshot.total_ops < MIN_SAMPLES_FOR_RECOMMENDATIONS {
        return vec![format!(
            "insufficient data: {} operations in window, recommendations need at least {}",
            snapshot.total_ops, MIN_SAMPLES_FOR_RECOMMENDATIONS
        )];
    }

    let mut recommendations = Vec::new();

    if snapshot.fallback_rate > FALLBACK_RATE_LIMIT {
        recommendations.push(format!(
            "fallback rate {:.1}% is above {:.0}%: the preferred routes are degraded, \
            consider raising circuit_breaker.failure_threshold or revisiting routing rules",
            snapshot.fallback_rate * 100.0,
            FALLBACK_RATE_LIMIT * 100.0
        ));
    }

    if snapshot.success_rate < SUCCESS_RATE_FLOOR {
        recommendations.push(format!(
            "success rate {:.1}% is below {:.0}%: inspect backend errors and compliance denials",
            snapshot.success_rate * 100.0,
            SUCCESS_RATE_FLOOR * 100.0
        ));
    }

    if snapshot.timeout_rate > TIMEOUT_RATE_LIMIT {
        recommendations.push(format!(
            "timeout rate {:.1}% is above {:.0}%: backends are too slow for the configured SLA budgets",
            snapshot.timeout_rate * 100.0,
            TIMEOUT_RATE_LIMIT * 100.0
        ));
    }

    for class in OperationClass::ALL {
        let mut latencies: Vec<u64> = window
            .iter()
            .filter(|s| s.class == class)
            .map(|s| s.latency_ms)
            .collect();
        if latencies.len() < MIN_SAMPLES_FOR_RECOMMENDATIONS {
            continue;
        }
        latencies.sort_unstable();
        let p95 = percentile(&latencies, 95.0);
        let budget_ms = sla.budget_for(class).as_millis() as u64;
        if p95 as f64 >= budget_ms as f64 * SLA_HEADROOM {
            recommendations.push(format!(
                "{} p95 latency {}ms is within {:.0}% of its {}ms SLA budget: \
                prefer the faster route for this class",
                class,
                p95,
                (1.0 - SLA_HEADROOM) * 100.0,
                budget_ms
            ));
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(outcome: Outcome, latency_ms: u64, fallback: bool) -> OperationSample {
        OperationSample {
            class: OperationClass::Standard,
            route: Some(Route::Direct),
            outcome,
            latency_ms,
            fallback,
            cost: 0.01,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&values, 50.0), 50);
        assert_eq!(percentile(&values, 95.0), 95);
        assert_eq!(percentile(&[7], 95.0), 7);
        assert_eq!(percentile(&[], 50.0), 0);
    }

    #[tokio::test]
    async fn test_snapshot_aggregates() {
        let tracker = MetricsTracker::spawn(100, SlaConfig::default());
        tracker.record(sample(Outcome::Succeeded, 100, false));
        tracker.record(sample(Outcome::Succeeded, 200, true));
        tracker.record(sample(Outcome::Failed, 300, false));
        tracker.record(sample(Outcome::TimedOut, 400, true));

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.total_ops, 4);
        assert!((snapshot.success_rate - 0.5).abs() < 1e-9);
        assert!((snapshot.fallback_rate - 0.5).abs() < 1e-9);
        assert!((snapshot.timeout_rate - 0.25).abs() < 1e-9);
        assert_eq!(snapshot.p50_latency_ms, 200);
        assert_eq!(snapshot.p95_latency_ms, 400);
        assert!((snapshot.total_cost - 0.04).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_window_evicts_oldest() {
        let tracker = MetricsTracker::spawn(3, SlaConfig::default());
        tracker.record(sample(Outcome::Failed, 10, false));
        for _ in 0..3 {
            tracker.record(sample(Outcome::Succeeded, 10, false));
        }
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.total_ops, 3);
        assert!((snapshot.success_rate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recommendations_need_samples() {
        let tracker = MetricsTracker::spawn(100, SlaConfig::default());
        tracker.record(sample(Outcome::Failed, 10, true));
        let recs = tracker.recommendations().await;
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("insufficient data"));
    }

    #[tokio::test]
    async fn test_recommendations_flag_fallback_and_success_rate() {
        let tracker = MetricsTracker::spawn(100, SlaConfig::default());
        for i in 0..30 {
            let outcome = if i % 5 == 0 { Outcome::Failed } else { Outcome::Succeeded };
            tracker.record(sample(outcome, 50, i % 3 == 0));
        }
        let recs = tracker.recommendations().await;
        assert!(recs.iter().any(|r| r.starts_with("fallback rate")));
        assert!(recs.iter().any(|r| r.starts_with("success rate")));
        assert!(!recs.iter().any(|r| r.starts_with("timeout rate")));
    }

    #[tokio::test]
    async fn test_recommendations_flag_latency_near_sla() {
        let tracker = MetricsTracker::spawn(100, SlaConfig::default());
        for _ in 0..25 {
            tracker.record(sample(Outcome::Succeeded, 28_000, false));
        }
        let recs = tracker.recommendations().await;
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("standard p95 latency 28000ms"));
    }

    #[tokio::test]
    async fn test_healthy_window_has_no_recommendations() {
        let tracker = MetricsTracker::spawn(100, SlaConfig::default());
        for _ in 0..25 {
            tracker.record(sample(Outcome::Succeeded, 100, false));
        }
        assert!(tracker.recommendations().await.is_empty());
    }
}
