//! Service wrapper that instruments every request.

use crate::interceptor::ResponseFuture;
use crate::metrics::HttpMetrics;
use hyper::service::Service;
use hyper::{Request, Response};

/// Wraps a hyper service and records request metrics around each call.
///
/// For every request the in-flight gauge is raised and the timer started
/// before the inner service is called. Once the inner future resolves the
/// request counter is incremented with `{method, status_code}`, the gauge is
/// lowered and the elapsed time is observed.
///
/// If the inner service returns an error the request is counted with
/// `status_code="error"` and the error is passed through.
#[derive(Clone, Debug)]
pub struct InstrumentService<S> {
    inner: S,
    metrics: HttpMetrics,
}

impl<S> InstrumentService<S> {
    pub fn new(inner: S, metrics: HttpMetrics) -> Self {
        Self { inner, metrics }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for InstrumentService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn call(&self, req: Request<ReqBody>) -> Self::Future {
        let request = self.metrics.start_request(req.method());
        let inner = self.inner.call(req);
        ResponseFuture::new(inner, request)
    }
}
