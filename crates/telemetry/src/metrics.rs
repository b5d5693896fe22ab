//! Internal metrics collection.
//!
//! Counters live in-process and are exposed through `GET /metrics`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the notification dispatcher.
#[derive(Debug, Default)]
pub struct Metrics {
    // Broker consumption
    pub messages_received: Counter,
    pub messages_acked: Counter,
    pub messages_requeued: Counter,
    pub messages_dropped: Counter,
    pub broker_reconnects: Counter,
    pub broker_reconnect_failures: Counter,

    // Notification outcomes
    pub notifications_sent: Counter,
    pub notifications_failed: Counter,
    pub notifications_skipped: Counter,

    // Downstream calls
    pub delivery_attempts: Counter,
    pub delivery_retries: Counter,
    pub breaker_rejections: Counter,
    pub tenant_lookups: Counter,
    pub tenant_lookup_failures: Counter,

    // Audit
    pub audit_writes: Counter,
    pub audit_write_errors: Counter,

    // Latency histograms
    pub handle_latency_ms: Histogram,
    pub delivery_latency_ms: Histogram,

    // Gauges
    pub broker_connected: Gauge,
    pub in_flight: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub messages_received: u64,
    pub messages_acked: u64,
    pub messages_requeued: u64,
    pub messages_dropped: u64,
    pub broker_reconnects: u64,
    pub broker_reconnect_failures: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub notifications_skipped: u64,
    pub delivery_attempts: u64,
    pub delivery_retries: u64,
    pub breaker_rejections: u64,
    pub tenant_lookups: u64,
    pub tenant_lookup_failures: u64,
    pub audit_writes: u64,
    pub audit_write_errors: u64,
    pub handle_latency_mean_ms: f64,
    pub delivery_latency_mean_ms: f64,
    pub broker_connected: bool,
    pub in_flight: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            messages_received: self.messages_received.get(),
            messages_acked: self.messages_acked.get(),
            messages_requeued: self.messages_requeued.get(),
            messages_dropped: self.messages_dropped.get(),
            broker_reconnects: self.broker_reconnects.get(),
            broker_reconnect_failures: self.broker_reconnect_failures.get(),
            notifications_sent: self.notifications_sent.get(),
            notifications_failed: self.notifications_failed.get(),
            notifications_skipped: self.notifications_skipped.get(),
            delivery_attempts: self.delivery_attempts.get(),
            delivery_retries: self.delivery_retries.get(),
            breaker_rejections: self.breaker_rejections.get(),
            tenant_lookups: self.tenant_lookups.get(),
            tenant_lookup_failures: self.tenant_lookup_failures.get(),
            audit_writes: self.audit_writes.get(),
            audit_write_errors: self.audit_write_errors.get(),
            handle_latency_mean_ms: self.handle_latency_ms.mean(),
            delivery_latency_mean_ms: self.delivery_latency_ms.mean(),
            broker_connected: self.broker_connected.get() > 0,
            in_flight: self.in_flight.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
