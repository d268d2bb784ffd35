//! Request instrumentation for hyper services.
//!
//! [`InstrumentService`] wraps any `hyper::service::Service` and records the
//! request metrics from [`HttpMetrics`](crate::metrics::HttpMetrics) around
//! each call. Responses pass through untouched.

mod future;
mod service;

pub use future::ResponseFuture;
pub use service::InstrumentService;
