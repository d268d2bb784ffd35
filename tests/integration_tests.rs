//! Integration tests for reqmetrics.
//!
//! These tests run the full server on an ephemeral port and talk raw HTTP/1.1
//! to it.

use reqmetrics::config::{parse_config, ServerConfig};
use reqmetrics::metrics::{HttpMetrics, MetricsRegistry};
use reqmetrics::server::{AppServer, Router};
use reqmetrics::util::ShutdownSignal;
use reqmetrics::MetricsEndpoint;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

struct TestServer {
    address: SocketAddr,
    metrics: HttpMetrics,
    registry: Arc<MetricsRegistry>,
    shutdown: ShutdownSignal,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = HttpMetrics::register(&registry).expect("failed to register metrics");
        let router = Router::new("/metrics", MetricsEndpoint::new(Arc::clone(&registry)));

        let config = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            shutdown_timeout: Duration::from_secs(1),
        };
        let server = AppServer::bind(&config, router, metrics.clone())
            .await
            .expect("failed to bind");
        let address = server.local_addr();

        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(server.run(shutdown.subscribe()));

        Self {
            address,
            metrics,
            registry,
            shutdown,
            handle,
        }
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
    }
}

struct HttpReply {
    status: u16,
    head: String,
    body: String,
}

/// Send a single request with `Connection: close` and read the full reply.
async fn send(address: SocketAddr, method: &str, target: &str) -> HttpReply {
    let mut stream = TcpStream::connect(address).await.expect("failed to connect");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        method, target
    );
    stream.write_all(request.as_bytes()).await.expect("failed to write");

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.expect("failed to read");

    let (head, body) = raw.split_once("\r\n\r\n").expect("malformed response");
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("missing status code");

    HttpReply {
        status,
        head: head.to_string(),
        body: body.to_string(),
    }
}

/// Read one sample value from an exposition body.
fn sample(body: &str, series: &str) -> Option<f64> {
    body.lines()
        .find_map(|line| line.strip_prefix(series)?.strip_prefix(' '))
        .and_then(|value| value.parse().ok())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_scenario_counts_by_status() {
    let server = TestServer::start().await;
    let baseline = server.metrics.in_flight();

    assert_eq!(send(server.address, "GET", "/status/200").await.status, 200);
    assert_eq!(send(server.address, "GET", "/health").await.status, 200);
    assert_eq!(send(server.address, "GET", "/missing").await.status, 404);

    let reply = send(server.address, "GET", "/metrics?name%5B%5D=http_requests_total").await;
    assert_eq!(reply.status, 200);
    assert_eq!(
        sample(&reply.body, r#"http_requests_total{method="GET",status_code="200"}"#),
        Some(2.0)
    );
    assert_eq!(
        sample(&reply.body, r#"http_requests_total{method="GET",status_code="404"}"#),
        Some(1.0)
    );
    assert!(!reply.body.contains("http_request_duration_seconds"));

    // The scrape itself is still in flight while it renders.
    let reply = send(server.address, "GET", "/metrics?name%5B%5D=http_in_flight_requests_total").await;
    assert_eq!(
        sample(&reply.body, "http_in_flight_requests_total"),
        Some((baseline + 1) as f64)
    );

    assert_eq!(server.metrics.in_flight(), baseline);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unfiltered_scrape_lists_every_family() {
    let server = TestServer::start().await;

    let reply = send(server.address, "GET", "/metrics").await;
    assert_eq!(reply.status, 200);
    assert!(reply
        .head
        .to_ascii_lowercase()
        .contains("content-type: application/openmetrics-text"));

    for family in server.registry.family_names() {
        assert!(
            reply.body.lines().any(|l| l.starts_with("# TYPE ") && l.split(' ').nth(2) == Some(family.as_str())),
            "missing # TYPE for {family}"
        );
    }
    assert!(reply.body.ends_with("# EOF\n"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_family_returns_ok() {
    let server = TestServer::start().await;

    let reply = send(server.address, "GET", "/metrics?name%5B%5D=nothing_here").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "# EOF\n");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_settle_gauge() {
    let server = TestServer::start().await;
    let baseline = server.metrics.in_flight();

    let requests = (0..20).map(|i| {
        let address = server.address;
        let method = if i % 2 == 0 { "GET" } else { "POST" };
        async move { send(address, method, "/status/201").await.status }
    });
    let statuses = futures::future::join_all(requests).await;
    assert!(statuses.iter().all(|s| *s == 201));

    let reply = send(server.address, "GET", "/metrics?name%5B%5D=http_requests").await;
    assert_eq!(
        sample(&reply.body, r#"http_requests_total{method="GET",status_code="201"}"#),
        Some(10.0)
    );
    assert_eq!(
        sample(&reply.body, r#"http_requests_total{method="POST",status_code="201"}"#),
        Some(10.0)
    );
    assert_eq!(server.metrics.in_flight(), baseline);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_histogram_counts_every_request() {
    let server = TestServer::start().await;

    for _ in 0..5 {
        send(server.address, "GET", "/health").await;
    }

    let reply = send(
        server.address,
        "GET",
        "/metrics?name%5B%5D=http_request_duration_seconds",
    )
    .await;
    assert_eq!(sample(&reply.body, "http_request_duration_seconds_count"), Some(5.0));
    let sum = sample(&reply.body, "http_request_duration_seconds_sum").unwrap();
    assert!(sum >= 0.0);

    server.stop().await;
}

#[test]
fn test_config_parsing() {
    let config = parse_config(
        r#"
global:
  log_level: warn
server:
  listen: "127.0.0.1:0"
metrics:
  path: /prom
"#,
    )
    .expect("failed to parse config");

    assert_eq!(config.global.log_level, "warn");
    assert_eq!(config.metrics.path, "/prom");
    assert_eq!(config.server.listen.port(), 0);
}
