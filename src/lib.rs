//! reqmetrics - Prometheus instrumentation for hyper services
//!
//! This crate provides:
//! - A shared metric registry with duplicate detection and filtered snapshots
//! - An exposition endpoint honouring repeated `name[]` query parameters
//! - A request interceptor recording request counts, durations and in-flight requests
//! - A small application server wiring the two together

pub mod config;
pub mod endpoint;
pub mod interceptor;
pub mod metrics;
pub mod server;
pub mod util;

pub use config::Config;
pub use endpoint::MetricsEndpoint;
pub use interceptor::InstrumentService;
pub use metrics::{HttpMetrics, MetricsRegistry};
