//! Request routing for the application server.

use crate::endpoint::MetricsEndpoint;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use tracing::debug;

/// Routes requests to the metrics endpoint and the built-in handlers.
#[derive(Clone, Debug)]
pub struct Router {
    metrics_path: String,
    endpoint: MetricsEndpoint,
}

impl Router {
    pub fn new(metrics_path: impl Into<String>, endpoint: MetricsEndpoint) -> Self {
        Self {
            metrics_path: metrics_path.into(),
            endpoint,
        }
    }

    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    /// Dispatch a request.
    ///
    /// - `GET <metrics path>`: exposition endpoint
    /// - `GET /health`: liveness probe
    /// - `/status/<code>`: replies with `<code>`, any method
    /// - `GET /`: short index
    pub async fn route<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
        let path = req.uri().path();
        debug!(method = %req.method(), path = %path, "routing request");

        if let Some(code) = path.strip_prefix("/status/") {
            return Ok(status_response(code));
        }

        if req.method() != Method::GET {
            return Ok(text_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed\n".to_string(),
            ));
        }

        let response = if path == self.metrics_path {
            self.endpoint.handle(&req)
        } else if path == "/health" {
            text_response(StatusCode::OK, "OK\n".to_string())
        } else if path == "/" {
            text_response(
                StatusCode::OK,
                format!(
                    "reqmetrics\n\nEndpoints:\n  {} - Prometheus metrics\n  /health - Health check\n  /status/<code> - Reply with <code>\n",
                    self.metrics_path
                ),
            )
        } else {
            text_response(StatusCode::NOT_FOUND, "Not found\n".to_string())
        };

        Ok(response)
    }
}

fn status_response(code: &str) -> Response<Full<Bytes>> {
    match code.parse::<u16>().ok().and_then(|c| StatusCode::from_u16(c).ok()) {
        Some(status) => text_response(status, format!("{}\n", status)),
        None => text_response(
            StatusCode::BAD_REQUEST,
            format!("invalid status code '{}'\n", code),
        ),
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
