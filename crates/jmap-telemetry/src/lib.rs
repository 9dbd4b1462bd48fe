// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Request-scoped timers and spans, and their aggregation, for the JMAP
//! dispatch core.
//!
//! [`RequestTimers`] is what `jmap_dispatch::RequestContext` carries for the
//! lifetime of one `dispatch()` call: a `tracing::Span` entered for the
//! whole request, plus a running log of per-method-call durations. Once the
//! request completes, [`RequestTimers::finish`] turns it into a
//! [`RequestMetrics`] record that a caller can hand to a [`MetricsCollector`]
//! for rolling aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, info_span, Span};

// ---------------------------------------------------------------------------
// Per-call timing
// ---------------------------------------------------------------------------

/// Wall-clock duration of one method call within a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallTiming {
    /// The method name, e.g. `"Email/get"`.
    pub method: String,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// RequestTimers
// ---------------------------------------------------------------------------

/// A live, request-scoped timer built on a `tracing::Span`.
///
/// Created once per `dispatch()` call and threaded through
/// `jmap_dispatch::RequestContext`; each processed method call reports its
/// duration via [`RequestTimers::record_call`], and [`RequestTimers::finish`]
/// closes the span and returns the accumulated [`RequestMetrics`].
pub struct RequestTimers {
    request_id: String,
    span: Span,
    started_at: Instant,
    calls: Vec<CallTiming>,
}

impl RequestTimers {
    /// Start timing a new request, entering a `tracing` span tagged with
    /// `request_id` for the lifetime of the returned guard's underlying span.
    #[must_use]
    pub fn start(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let span = info_span!("jmap_request", request_id = %request_id);
        Self {
            request_id,
            span,
            started_at: Instant::now(),
            calls: Vec::new(),
        }
    }

    /// The `tracing::Span` for this request; callers may `.enter()` it
    /// around the dispatch loop so every log line within carries
    /// `request_id`.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Time a single method call's processing, recording its duration
    /// against `method`. Returns the value `f` produced.
    pub fn time_call<T>(&mut self, method: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record_call(method, start.elapsed().as_millis() as u64);
        result
    }

    /// Record an already-measured call duration against `method`, for
    /// callers (like the dispatcher's own call loop) that can't wrap the
    /// timed work in a closure because it needs mutable access to the same
    /// context the timers live on.
    pub fn record_call(&mut self, method: &str, duration_ms: u64) {
        self.calls.push(CallTiming {
            method: method.to_string(),
            duration_ms,
        });
    }

    /// Finish the request, logging a summary line and returning the
    /// accumulated [`RequestMetrics`].
    #[must_use]
    pub fn finish(self) -> RequestMetrics {
        let total_duration_ms = self.started_at.elapsed().as_millis() as u64;
        let _entered = self.span.enter();
        info!(
            total_duration_ms,
            call_count = self.calls.len(),
            "request complete"
        );
        drop(_entered);
        RequestMetrics {
            request_id: self.request_id,
            total_duration_ms,
            calls: self.calls,
        }
    }
}

// ---------------------------------------------------------------------------
// RequestMetrics
// ---------------------------------------------------------------------------

/// Metrics captured for a single completed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestMetrics {
    /// Correlates this record back to the request that produced it.
    pub request_id: String,
    /// Total wall-clock duration of the whole request, in milliseconds.
    pub total_duration_ms: u64,
    /// Per-method-call timings, in call order.
    pub calls: Vec<CallTiming>,
}

// ---------------------------------------------------------------------------
// MetricsSummary
// ---------------------------------------------------------------------------

/// Aggregated latency statistics across multiple requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of requests recorded.
    pub count: usize,
    /// Mean request duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) request duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile request duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Per-method call counts across all recorded requests.
    pub calls_by_method: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            calls_by_method: BTreeMap::new(),
        }
    }
}

/// Compute a percentile value from a **sorted** slice.
fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Thread-safe rolling collector of [`RequestMetrics`].
///
/// Wrap in an `Arc` (or clone, since the inner storage is already behind an
/// `Arc<Mutex<_>>`) to share across the tasks serving concurrent requests.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<RequestMetrics>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new, empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a completed request's metrics.
    pub fn record(&self, metrics: RequestMetrics) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.push(metrics);
    }

    /// Return all recorded request metrics.
    #[must_use]
    pub fn requests(&self) -> Vec<RequestMetrics> {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.clone()
    }

    /// Number of requests recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.len()
    }

    /// Whether the collector has no recorded requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded requests.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.total_duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;
        let p50_duration_ms = percentile(&durations, 50.0);
        let p99_duration_ms = percentile(&durations, 99.0);

        let mut calls_by_method: BTreeMap<String, usize> = BTreeMap::new();
        for request in data.iter() {
            for call in &request.calls {
                *calls_by_method.entry(call.method.clone()).or_insert(0) += 1;
            }
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms,
            p99_duration_ms,
            calls_by_method,
        }
    }
}
