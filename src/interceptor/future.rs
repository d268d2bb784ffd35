//! Response future that settles request metrics on completion.

use crate::metrics::InFlightRequest;
use futures::ready;
use hyper::Response;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Future returned by [`InstrumentService`](super::InstrumentService).
    ///
    /// Resolves to the inner service's output. The request is recorded the
    /// first time the inner future is ready; if the future is dropped before
    /// that, only the in-flight gauge is released.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        request: Option<InFlightRequest>,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(inner: F, request: InFlightRequest) -> Self {
        Self {
            inner,
            request: Some(request),
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        if let Some(request) = this.request.take() {
            match &result {
                Ok(response) => request.complete(response.status()),
                Err(_) => request.fail(),
            }
        }

        Poll::Ready(result)
    }
}
