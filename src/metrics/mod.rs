//! Metric registry and the request metrics built on top of it.

mod http;
mod registry;

pub use http::{
    DEFAULT_DURATION_BUCKETS, ERROR_STATUS_LABEL, HttpMetrics, IN_FLIGHT_REQUESTS,
    InFlightRequest, REQUEST_DURATION_SECONDS, REQUESTS_TOTAL, RequestLabels,
};
pub use registry::{MetricsError, MetricsRegistry, Snapshot};
