//! Webhook metrics
//!
//! Process-wide counters for the webhook pipeline:
//! - Atomic counters for received, applied, skipped, unhandled and failed events
//! - Labeled breakdowns by event type, response status, resolution source and
//!   failure reason
//! - A bounded ring buffer of processing durations for percentiles
//! - Prometheus text format export
//!
//! # Example
//!
//! ```rust,no_run
//! use billing_sync::metrics::global_metrics;
//! use std::time::Duration;
//!
//! global_metrics().record_event("invoice.paid");
//! global_metrics().record_response(200, Duration::from_millis(40));
//!
//! let output = global_metrics().to_prometheus_format();
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::billing::resolver::ResolutionSource;
use crate::stripe::processor::EventOutcome;

/// Maximum number of duration samples to keep
const MAX_DURATION_SAMPLES: usize = 1000;

const PREFIX: &str = "billing_sync";

/// Webhook pipeline metrics
#[derive(Debug)]
pub struct Metrics {
    // === Counters ===
    /// Verified events received
    pub events_total: AtomicU64,
    /// Events that wrote a subscription record
    pub applied_total: AtomicU64,
    /// Events consumed without a write
    pub skipped_total: AtomicU64,
    /// Events of a type we do not handle
    pub unhandled_total: AtomicU64,
    /// Requests answered with 4xx or 5xx
    pub failed_total: AtomicU64,
    /// Premium flag writes that failed
    pub premium_sync_failures_total: AtomicU64,

    // === Histograms ===
    durations: RwLock<RingBuffer<Duration>>,

    // === Labeled counters ===
    events_by_type: RwLock<HashMap<String, u64>>,
    responses_by_status: RwLock<HashMap<u16, u64>>,
    resolutions_by_source: RwLock<HashMap<&'static str, u64>>,
    failures_by_reason: RwLock<HashMap<&'static str, u64>>,

    start_time: RwLock<Option<Instant>>,
}

/// Point-in-time copy of the counters, for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_total: u64,
    pub applied_total: u64,
    pub skipped_total: u64,
    pub unhandled_total: u64,
    pub failed_total: u64,
    pub premium_sync_failures_total: u64,
    pub failures_by_reason: HashMap<String, u64>,
}

/// Ring buffer for duration samples
#[derive(Debug)]
struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    /// Position of next write (wraps around)
    write_pos: usize,
}

impl<T: Clone + Ord> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Calculate percentile (0.0 to 1.0)
    fn percentile(&self, p: f64) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted = self.data.clone();
        sorted.sort();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).cloned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create an empty metrics instance
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            applied_total: AtomicU64::new(0),
            skipped_total: AtomicU64::new(0),
            unhandled_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            premium_sync_failures_total: AtomicU64::new(0),
            durations: RwLock::new(RingBuffer::new(MAX_DURATION_SAMPLES)),
            events_by_type: RwLock::new(HashMap::new()),
            responses_by_status: RwLock::new(HashMap::new()),
            resolutions_by_source: RwLock::new(HashMap::new()),
            failures_by_reason: RwLock::new(HashMap::new()),
            start_time: RwLock::new(None),
        }
    }

    /// Record a verified event by type tag
    pub fn record_event(&self, event_type: &str) {
        self.events_total.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut breakdown) = self.events_by_type.write() {
            *breakdown.entry(event_type.to_string()).or_insert(0) += 1;
        }
    }

    /// Record how a consumed event ended
    pub fn record_outcome(&self, outcome: &EventOutcome) {
        let counter = match outcome {
            EventOutcome::Applied { .. } => &self.applied_total,
            EventOutcome::Skipped { .. } => &self.skipped_total,
            EventOutcome::Unhandled { .. } => &self.unhandled_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected or failed request by reason
    pub fn record_failure(&self, reason: &'static str) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut breakdown) = self.failures_by_reason.write() {
            *breakdown.entry(reason).or_insert(0) += 1;
        }
    }

    /// Record the response sent back to Stripe
    pub fn record_response(&self, status_code: u16, duration: Duration) {
        if let Ok(mut durations) = self.durations.write() {
            durations.push(duration);
        }

        if let Ok(mut breakdown) = self.responses_by_status.write() {
            *breakdown.entry(status_code).or_insert(0) += 1;
        }
    }

    /// Record which strategy resolved a user
    pub fn record_resolution(&self, source: ResolutionSource) {
        if let Ok(mut breakdown) = self.resolutions_by_source.write() {
            *breakdown.entry(source.as_str()).or_insert(0) += 1;
        }
    }

    /// Record a failed premium flag write
    pub fn record_premium_sync_failure(&self) {
        self.premium_sync_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since [`init`] was called
    pub fn uptime(&self) -> Option<Duration> {
        self.start_time
            .read()
            .ok()
            .and_then(|start| start.map(|s| s.elapsed()))
    }

    /// Copy the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let failures_by_reason = self
            .failures_by_reason
            .read()
            .map(|m| m.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        MetricsSnapshot {
            events_total: self.events_total.load(Ordering::Relaxed),
            applied_total: self.applied_total.load(Ordering::Relaxed),
            skipped_total: self.skipped_total.load(Ordering::Relaxed),
            unhandled_total: self.unhandled_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            premium_sync_failures_total: self.premium_sync_failures_total.load(Ordering::Relaxed),
            failures_by_reason,
        }
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("events_total", &self.events_total),
            ("events_applied_total", &self.applied_total),
            ("events_skipped_total", &self.skipped_total),
            ("events_unhandled_total", &self.unhandled_total),
            ("events_failed_total", &self.failed_total),
            ("premium_sync_failures_total", &self.premium_sync_failures_total),
        ];
        for (name, value) in counters {
            let _ = writeln!(output, "# TYPE {PREFIX}_{name} counter");
            let _ = writeln!(output, "{PREFIX}_{name} {}", value.load(Ordering::Relaxed));
        }

        if let Ok(breakdown) = self.events_by_type.read() {
            write_labeled(&mut output, "events_by_type_total", "type", breakdown.iter());
        }
        if let Ok(breakdown) = self.responses_by_status.read() {
            write_labeled(&mut output, "responses_total", "status", breakdown.iter());
        }
        if let Ok(breakdown) = self.resolutions_by_source.read() {
            write_labeled(&mut output, "resolutions_total", "source", breakdown.iter());
        }
        if let Ok(breakdown) = self.failures_by_reason.read() {
            write_labeled(&mut output, "failures_total", "reason", breakdown.iter());
        }

        if let Ok(durations) = self.durations.read() {
            for (label, p) in [("p50", 0.5), ("p95", 0.95), ("p99", 0.99)] {
                if let Some(d) = durations.percentile(p) {
                    let _ = writeln!(
                        output,
                        "{PREFIX}_webhook_duration_{label}_ms {}",
                        d.as_millis()
                    );
                }
            }
        }

        output
    }
}

fn write_labeled<'a, K, I>(output: &mut String, name: &str, label: &str, entries: I)
where
    K: std::fmt::Display + Ord + 'a,
    I: Iterator<Item = (&'a K, &'a u64)>,
{
    let mut entries: Vec<_> = entries.collect();
    if entries.is_empty() {
        return;
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let _ = writeln!(output, "# TYPE {PREFIX}_{name} counter");
    for (key, value) in entries {
        let _ = writeln!(output, "{PREFIX}_{name}{{{label}=\"{key}\"}} {value}");
    }
}

/// Global metrics instance
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get or initialize the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Initialize global metrics (call once at startup)
pub fn init() {
    if let Ok(mut start_time) = global_metrics().start_time.write() {
        start_time.get_or_insert_with(Instant::now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::store::SubscriptionStatus;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_event("invoice.paid");
        metrics.record_outcome(&EventOutcome::Applied {
            user_id: "u1".into(),
            status: SubscriptionStatus::Active,
        });
        metrics.record_outcome(&EventOutcome::Skipped {
            reason: "no_subscription".into(),
        });
        metrics.record_failure("profile_not_found");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_total, 1);
        assert_eq!(snapshot.applied_total, 1);
        assert_eq!(snapshot.skipped_total, 1);
        assert_eq!(snapshot.failed_total, 1);
        assert_eq!(snapshot.failures_by_reason.get("profile_not_found"), Some(&1));
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_event("invoice.paid");
        metrics.record_event("invoice.paid");
        metrics.record_response(500, Duration::from_millis(12));
        metrics.record_resolution(ResolutionSource::Email);
        metrics.record_premium_sync_failure();

        let output = metrics.to_prometheus_format();
        assert!(output.contains("billing_sync_events_total 2\n"));
        assert!(output.contains("billing_sync_events_by_type_total{type=\"invoice.paid\"} 2\n"));
        assert!(output.contains("billing_sync_responses_total{status=\"500\"} 1\n"));
        assert!(output.contains("billing_sync_resolutions_total{source=\"email\"} 1\n"));
        assert!(output.contains("billing_sync_premium_sync_failures_total 1\n"));
        assert!(output.contains("billing_sync_webhook_duration_p50_ms 12\n"));
    }

    #[test]
    fn test_ring_buffer_wraps() {
        let mut buffer = RingBuffer::new(3);
        for v in [1, 2, 3, 100, 200] {
            buffer.push(v);
        }
        assert_eq!(buffer.data.len(), 3);
        assert_eq!(buffer.percentile(0.0), Some(3));
        assert_eq!(buffer.percentile(1.0), Some(200));
    }

    #[test]
    fn test_global_metrics() {
        init();
        assert!(global_metrics().uptime().is_some());
    }
}
