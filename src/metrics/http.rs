//! Request metrics recorded by the interceptor.
//!
//! Three families are registered once per registry:
//! - `http_requests_total{method, status_code}` (counter)
//! - `http_request_duration_seconds` (histogram)
//! - `http_in_flight_requests_total` (gauge)

use crate::metrics::{MetricsError, MetricsRegistry};
use hyper::{Method, StatusCode};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use std::sync::Arc;
use std::time::Instant;

/// Family name of the request counter. The encoder adds the `_total` suffix.
pub const REQUESTS_TOTAL: &str = "http_requests";
pub const REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const IN_FLIGHT_REQUESTS: &str = "http_in_flight_requests_total";

/// Status label recorded when the wrapped service fails without a response.
pub const ERROR_STATUS_LABEL: &str = "error";

/// Histogram buckets in seconds, from 5ms to 10s.
pub const DEFAULT_DURATION_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Labels for the request counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub status_code: String,
}

/// Handles to the request metrics. Cheap to clone.
#[derive(Clone, Debug)]
pub struct HttpMetrics {
    inner: Arc<HttpMetricsInner>,
}

#[derive(Debug)]
struct HttpMetricsInner {
    requests_total: Family<RequestLabels, Counter>,
    request_duration_seconds: Histogram,
    in_flight_requests: Gauge,
}

impl HttpMetrics {
    /// Register the request metrics with the default duration buckets.
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Self::register_with_buckets(registry, &DEFAULT_DURATION_BUCKETS)
    }

    /// Register the request metrics with custom duration buckets.
    ///
    /// Fails if any of the three families already exists in `registry`.
    pub fn register_with_buckets(
        registry: &MetricsRegistry,
        buckets: &[f64],
    ) -> Result<Self, MetricsError> {
        let requests_total = registry.register(
            REQUESTS_TOTAL,
            "Number of requests",
            Family::<RequestLabels, Counter>::default(),
        )?;
        let request_duration_seconds = registry.register(
            REQUEST_DURATION_SECONDS,
            "Duration of a request",
            Histogram::new(buckets.iter().copied()),
        )?;
        let in_flight_requests = registry.register(
            IN_FLIGHT_REQUESTS,
            "Number of in-flight requests",
            Gauge::default(),
        )?;

        Ok(Self {
            inner: Arc::new(HttpMetricsInner {
                requests_total,
                request_duration_seconds,
                in_flight_requests,
            }),
        })
    }

    /// Mark a request as started: bumps the in-flight gauge and starts the
    /// duration timer.
    pub fn start_request(&self, method: &Method) -> InFlightRequest {
        self.inner.in_flight_requests.inc();
        InFlightRequest {
            metrics: self.clone(),
            method: method.as_str().to_string(),
            start: Instant::now(),
            settled: false,
        }
    }

    /// Current number of requests being processed.
    pub fn in_flight(&self) -> i64 {
        self.inner.in_flight_requests.get()
    }
}

/// A request that has entered the pipeline but not yet completed.
///
/// Dropping it without calling [`complete`](Self::complete) or
/// [`fail`](Self::fail) still releases the in-flight gauge.
#[must_use = "dropping the request records nothing but the gauge release"]
#[derive(Debug)]
pub struct InFlightRequest {
    metrics: HttpMetrics,
    method: String,
    start: Instant,
    settled: bool,
}

impl InFlightRequest {
    /// Record a completed request with the response status.
    pub fn complete(self, status: StatusCode) {
        self.settle(status.as_str().to_string());
    }

    /// Record a request whose handler failed before producing a response.
    pub fn fail(self) {
        self.settle(ERROR_STATUS_LABEL.to_string());
    }

    fn settle(mut self, status_code: String) {
        let inner = &self.metrics.inner;
        let labels = RequestLabels {
            method: std::mem::take(&mut self.method),
            status_code,
        };
        inner.requests_total.get_or_create(&labels).inc();
        inner.in_flight_requests.dec();
        inner
            .request_duration_seconds
            .observe(self.start.elapsed().as_secs_f64());
        self.settled = true;
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        if !self.settled {
            self.metrics.inner.in_flight_requests.dec();
        }
    }
}
