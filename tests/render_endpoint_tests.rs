use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use common::TimeSeries;
use common::config::Configuration;
use common::index::{InMemoryMetricIndex, MetricIndex};
use common::stats::{StatsRegistry, StatsSink};
use common::storage::{MetricStore, StorageError, StorageResult};
use common::testing::{MockStatsSink, MockThrottler, SeriesFixture, TestConfigBuilder};
use common::throttling::{NoopThrottler, ThrottleDecision, Throttler};
use http_body_util::BodyExt;
use ntest::timeout;
use querier::{EvaluationPool, Evaluator, FunctionRegistry, Governor, RenderService};
use router::{ReaderState, create_router};
use tower::ServiceExt;

struct Stack {
    config: Configuration,
    store: Arc<dyn MetricStore>,
    index: Arc<dyn MetricIndex>,
    throttler: Arc<dyn Throttler>,
    stats: Arc<dyn StatsSink>,
}

impl Stack {
    fn new(config: Configuration, stats: Arc<dyn StatsSink>) -> Self {
        let (store, index) = SeriesFixture::new(60)
            .series("acme", "servers.web1.cpu", 0, &[Some(1.0), Some(2.0), None])
            .series("acme", "servers.web2.cpu", 0, &[Some(3.0), Some(4.0), Some(5.0)])
            .series("acme", "servers.web1.bytes", 0, &[Some(1500.0), Some(2_500_000.0), None])
            .build();
        Self {
            config,
            store,
            index,
            throttler: Arc::new(NoopThrottler),
            stats,
        }
    }

    fn app(self) -> Router {
        let evaluator = Evaluator::new(
            self.store,
            self.index.clone(),
            Arc::new(FunctionRegistry::builtin()),
        );
        let governor = Governor::new(
            evaluator,
            EvaluationPool::new(self.config.reader.max_concurrent_evaluations),
            self.throttler,
            self.stats.clone(),
            self.config.reader.request_timeout,
        );
        let service = RenderService::new(governor, self.config.reader.human_readable_numbers)
            .with_window_limit(60, self.config.reader.max_data_points);
        create_router(ReaderState::new(self.config, service, self.index, self.stats))
    }
}

/// Store whose reads take `latency` and then fail.
struct SlowStore {
    latency: Duration,
}

#[async_trait]
impl MetricStore for SlowStore {
    async fn fetch_series(
        &self,
        _tenant: &str,
        path: &str,
        _from: i64,
        _until: i64,
    ) -> StorageResult<TimeSeries> {
        tokio::time::sleep(self.latency).await;
        Err(StorageError::ReadFailed {
            path: path.to_string(),
            reason: "too slow".to_string(),
        })
    }
}

async fn send(app: Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn default_app() -> (Router, Arc<StatsRegistry>) {
    let stats = Arc::new(StatsRegistry::new());
    let app = Stack::new(TestConfigBuilder::new().build(), stats.clone()).app();
    (app, stats)
}

#[tokio::test]
#[timeout(10000)]
async fn test_sum_of_wildcard_renders_json() {
    let (app, stats) = default_app();
    let (status, body) = send(
        app,
        "/render?target=sumSeries(servers.*.cpu)&tenant=acme&from=0&until=180",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        body,
        serde_json::json!([{
            "target": "sumSeries(servers.*.cpu)",
            "datapoints": [[4.0, 0], [6.0, 60], [5.0, 120]]
        }])
    );
    assert_eq!(stats.tenant("acme").render_requests, 1);
}

#[tokio::test]
#[timeout(10000)]
async fn test_nested_functions_and_multiple_targets() {
    let (app, _) = default_app();
    let (status, body) = send(
        app,
        "/render?target=alias(scale(servers.web1.cpu,10),'web1x10')&target=servers.web2.cpu&tenant=acme&from=0&until=180&format=raw",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "web1x10,0,180,60|10,20,None\nservers.web2.cpu,0,180,60|3,4,5\n"
    );
}

#[tokio::test]
#[timeout(10000)]
async fn test_csv_output() {
    let (app, _) = default_app();
    let (status, body) = send(
        app,
        "/render?target=servers.web1.cpu&tenant=acme&from=0&until=180&format=csv",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "servers.web1.cpu,1970-01-01 00:00:00,1\n\
         servers.web1.cpu,1970-01-01 00:01:00,2\n\
         servers.web1.cpu,1970-01-01 00:02:00,\n"
    );
}

#[tokio::test]
#[timeout(10000)]
async fn test_human_readable_values_when_enabled() {
    let stats = Arc::new(StatsRegistry::new());
    let config = TestConfigBuilder::new().with_human_readable_numbers().build();
    let app = Stack::new(config, stats).app();

    let (status, body) = send(
        app,
        "/render?target=servers.web1.bytes&tenant=acme&from=0&until=180&format=raw&valueFormat=human",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "servers.web1.bytes,0,180,60|1.5k,2.5M,None\n");
}

#[tokio::test]
#[timeout(10000)]
async fn test_log_scale_rejects_non_positive_values() {
    let (app, _) = default_app();
    let (status, body) = send(
        app,
        "/render?target=offset(servers.web1.cpu,-1)&tenant=acme&from=0&until=180&logBase=10",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("non-positive"), "{body}");
}

#[tokio::test]
#[timeout(10000)]
async fn test_parse_error_names_the_target() {
    let (app, stats) = default_app();
    let (status, body) = send(
        app,
        "/render?target=sumSeries(servers.*.cpu&tenant=acme&from=0&until=180",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "Bad request");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Could not parse target: sumSeries(servers.*.cpu")
    );
    assert_eq!(stats.tenant("acme").render_requests, 0);
}

#[tokio::test]
#[timeout(10000)]
async fn test_arity_violation_is_bad_request() {
    let (app, _) = default_app();
    let (status, body) = send(
        app,
        "/render?target=scale(servers.web1.cpu)&tenant=acme&from=0&until=180",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("scale"), "{body}");
}

#[tokio::test]
#[timeout(10000)]
async fn test_timed_out_render_is_413_with_empty_body() {
    let stats = Arc::new(StatsRegistry::new());
    let config = TestConfigBuilder::new().with_request_timeout_ms(100).build();
    let index = InMemoryMetricIndex::new();
    index.register("acme", "metric.slow");

    let mut stack = Stack::new(config, stats.clone());
    stack.store = Arc::new(SlowStore {
        latency: Duration::from_secs(30),
    });
    stack.index = Arc::new(index);

    let (status, body) = send(
        stack.app(),
        "/render?target=metric.slow&tenant=acme&from=0&until=180",
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body.is_empty());
    assert_eq!(stats.tenant("acme").timed_out_requests, 1);
    assert_eq!(stats.tenant("acme").render_requests, 1);
}

#[tokio::test]
#[timeout(10000)]
async fn test_storage_failure_is_internal_error() {
    let stats = Arc::new(StatsRegistry::new());
    let index = InMemoryMetricIndex::new();
    index.register("acme", "metric.slow");

    let mut stack = Stack::new(TestConfigBuilder::new().build(), stats);
    stack.store = Arc::new(SlowStore {
        latency: Duration::ZERO,
    });
    stack.index = Arc::new(index);

    let (status, body) = send(
        stack.app(),
        "/render?target=metric.slow&tenant=acme&from=0&until=180",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("too slow"));
}

#[tokio::test]
#[timeout(10000)]
async fn test_throttled_request_records_delay_before_counting() {
    let mut throttler = MockThrottler::new();
    throttler.expect_throttle().times(1).returning(|_| ThrottleDecision {
        delay: Duration::from_millis(40),
    });

    let mut seq = mockall::Sequence::new();
    let mut stats = MockStatsSink::new();
    stats
        .expect_inc_throttle_time()
        .withf(|tenant, delay| tenant == "acme" && *delay == Duration::from_millis(40))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    stats
        .expect_inc_render_requests()
        .withf(|tenant| tenant == "acme")
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    stats.expect_inc_timed_out_requests().never();

    let mut stack = Stack::new(TestConfigBuilder::new().build(), Arc::new(stats));
    stack.throttler = Arc::new(throttler);

    let (status, _) = send(
        stack.app(),
        "/render?target=servers.web1.cpu&tenant=acme&from=0&until=180",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
#[timeout(10000)]
async fn test_tenants_are_isolated() {
    let (app, stats) = default_app();
    let (status, body) = send(
        app,
        "/render?target=servers.*.cpu&tenant=globex&from=0&until=180",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
    assert_eq!(stats.tenant("globex").render_requests, 1);
    assert_eq!(stats.tenant("acme").render_requests, 0);
}

#[tokio::test]
#[timeout(10000)]
async fn test_oversized_window_is_bad_request() {
    let (app, stats) = default_app();
    let (status, body) = send(
        app,
        "/render?target=servers.*.cpu&tenant=acme&from=0&until=1000000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("data points"), "{body}");
    assert_eq!(stats.tenant("acme").render_requests, 0);
}

#[tokio::test]
#[timeout(10000)]
async fn test_overflowing_relative_time_is_bad_request() {
    let (app, _) = default_app();
    let (status, body) = send(
        app,
        "/render?target=servers.*.cpu&tenant=acme&from=-1h&until=%2B9223372036854775807s",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("invalid relative time"), "{body}");
}
