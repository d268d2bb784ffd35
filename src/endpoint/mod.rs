//! Metrics exposition endpoint.
//!
//! Serves the registry in the text exposition format, optionally restricted to
//! the families named by repeated `name[]` query parameters.

use crate::metrics::{MetricsError, MetricsRegistry};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Content type of the text produced by `prometheus-client`.
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Query parameter selecting metric families.
pub const NAME_PARAM: &str = "name[]";

/// Exposition endpoint over a shared registry.
#[derive(Clone, Debug)]
pub struct MetricsEndpoint {
    registry: Arc<MetricsRegistry>,
}

impl MetricsEndpoint {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Encode the families selected by `query` (the raw query string).
    pub fn render(&self, query: Option<&str>) -> Result<String, MetricsError> {
        let names = requested_names(query);
        let snapshot = self.registry.snapshot(&names);

        debug!(
            requested = names.len(),
            included = snapshot.families().len(),
            "encoding metrics snapshot"
        );

        snapshot.encode()
    }

    /// Answer a scrape request.
    ///
    /// Always 200 unless encoding fails, which is reported as a 500.
    pub fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        match self.render(req.uri().query()) {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| internal_error()),
            Err(e) => {
                error!(error = %e, uri = %req.uri(), "writing metrics failed");
                internal_error()
            }
        }
    }
}

/// Collect the values of every `name[]` parameter in `query`.
///
/// Keys are percent-decoded, so `name%5B%5D=x` counts too. Duplicates collapse;
/// empty values are ignored.
pub fn requested_names(query: Option<&str>) -> HashSet<String> {
    let Some(query) = query else {
        return HashSet::new();
    };

    form_urlencoded::parse(query.as_bytes())
        .filter(|(key, value)| key == NAME_PARAM && !value.is_empty())
        .map(|(_, value)| value.into_owned())
        .collect()
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Failed to encode metrics\n")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::HttpMetrics;
    use http_body_util::BodyExt;
    use hyper::{Method, StatusCode};
    use prometheus_client::metrics::gauge::Gauge;

    fn endpoint() -> (MetricsEndpoint, HttpMetrics) {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = HttpMetrics::register(&registry).unwrap();
        (MetricsEndpoint::new(registry), metrics)
    }

    fn get(uri: &str) -> Request<()> {
        Request::builder().uri(uri).body(()).unwrap()
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_requested_names() {
        assert!(requested_names(None).is_empty());
        assert!(requested_names(Some("")).is_empty());
        assert!(requested_names(Some("other=1")).is_empty());

        let names = requested_names(Some("name[]=a&name[]=b&name[]=a"));
        assert_eq!(names.len(), 2);
        assert!(names.contains("a") && names.contains("b"));

        let names = requested_names(Some("name%5B%5D=http_requests_total&name=ignored"));
        assert_eq!(names, HashSet::from(["http_requests_total".to_string()]));
    }

    #[test]
    fn test_requested_names_skips_empty_values() {
        assert!(requested_names(Some("name[]=")).is_empty());
    }

    #[tokio::test]
    async fn test_unfiltered_returns_every_family() {
        let (endpoint, metrics) = endpoint();
        metrics.start_request(&Method::GET).complete(StatusCode::OK);

        let response = endpoint.handle(&get("/metrics"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], OPENMETRICS_CONTENT_TYPE);

        let body = body_text(response).await;
        assert!(body.contains("# TYPE http_requests counter"));
        assert!(body.contains("# TYPE http_request_duration_seconds histogram"));
        assert!(body.contains("# TYPE http_in_flight_requests_total gauge"));
        assert!(body.contains("# HELP http_requests Number of requests"));
    }

    #[tokio::test]
    async fn test_filtered_by_sample_name() {
        let (endpoint, metrics) = endpoint();
        metrics.start_request(&Method::GET).complete(StatusCode::OK);

        let body = body_text(endpoint.handle(&get("/metrics?name%5B%5D=http_requests_total"))).await;
        assert!(body.contains(r#"http_requests_total{method="GET",status_code="200"} 1"#));
        assert!(!body.contains("http_request_duration_seconds"));
        assert!(!body.contains("http_in_flight_requests_total"));
    }

    #[tokio::test]
    async fn test_filter_with_several_names() {
        let (endpoint, _metrics) = endpoint();
        endpoint
            .registry()
            .register("app_workers", "Worker count", Gauge::<i64>::default())
            .unwrap();

        let body = body_text(endpoint.handle(&get(
            "/metrics?name%5B%5D=app_workers&name%5B%5D=http_in_flight_requests_total",
        )))
        .await;
        assert!(body.contains("# TYPE app_workers gauge"));
        assert!(body.contains("# TYPE http_in_flight_requests_total gauge"));
        assert!(!body.contains("http_requests"));
    }

    #[tokio::test]
    async fn test_unknown_name_is_still_ok() {
        let (endpoint, _metrics) = endpoint();

        let response = endpoint.handle(&get("/metrics?name%5B%5D=does_not_exist"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "# EOF\n");
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let endpoint = MetricsEndpoint::new(Arc::new(MetricsRegistry::new()));
        let response = endpoint.handle(&get("/metrics"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "# EOF\n");
    }
}
