use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orderflow_api::app::{self, AppState};
use orderflow_api::config::AppConfig;
use orderflow_api::handler::OrderSyncHandler;
use orderflow_webhooks::sign;
use reqwest::StatusCode;

const WEBHOOK_SECRET: &str = "test-webhook-secret";
const DRAIN_SECRET: &str = "test-drain-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    async fn spawn_with(config: AppConfig) -> Self {
        // Same router as prod, bound to an ephemeral port over in-memory
        // stores.
        let state = Arc::new(
            AppState::in_memory(&config, Arc::new(OrderSyncHandler::new()))
                .expect("test config is valid"),
        );
        let router = app::build_app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        drain_secret: Some(DRAIN_SECRET.to_string()),
        addr_limit: 1000,
        identity_limit: 1000,
        rate_window: Duration::from_secs(60),
        ..AppConfig::default()
    }
}

async fn deliver(
    client: &reqwest::Client,
    base_url: &str,
    delivery_id: &str,
    topic: &str,
    body: &str,
) -> reqwest::Response {
    client
        .post(format!("{base_url}/webhooks/commerce"))
        .header("x-webhook-id", delivery_id)
        .header("x-webhook-topic", topic)
        .header("x-shop-domain", "shop.example.com")
        .header("x-webhook-hmac", sign(body.as_bytes(), WEBHOOK_SECRET))
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

async fn drain(client: &reqwest::Client, base_url: &str, max: usize) -> serde_json::Value {
    let res = client
        .post(format!("{base_url}/jobs/drain?max={max}"))
        .header("x-drain-secret", DRAIN_SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn stats(client: &reqwest::Client, base_url: &str) -> serde_json::Value {
    let res = client
        .get(format!("{base_url}/jobs/stats"))
        .header("x-drain-secret", DRAIN_SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_needs_no_auth() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn delivery_is_accepted_then_deduplicated() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = r#"{"id": 450789469, "total_price": "398.00"}"#;

    let res = deliver(&client, &srv.base_url, "wh-1", "order-created", body).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["status"], "accepted");
    assert_eq!(json["delivery_id"], "wh-1");
    assert_eq!(json["order_id"], 450789469);

    // Redelivery of the same id: acknowledged, no second job.
    let res = deliver(&client, &srv.base_url, "wh-1", "order-created", body).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["status"], "duplicate");

    let counts = stats(&client, &srv.base_url).await;
    assert_eq!(counts["pending"], 1);
}

#[tokio::test]
async fn tampered_body_is_unauthorized() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/webhooks/commerce", srv.base_url))
        .header("x-webhook-id", "wh-1")
        .header("x-webhook-topic", "order-created")
        .header("x-webhook-hmac", sign(br#"{"id": 1}"#, WEBHOOK_SECRET))
        .body(r#"{"id": 2}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Nothing reached the queue.
    assert_eq!(stats(&client, &srv.base_url).await["pending"], 0);
}

#[tokio::test]
async fn unsupported_topic_is_acknowledged_but_ignored() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = deliver(
        &client,
        &srv.base_url,
        "wh-1",
        "customer-updated",
        r#"{"id": 1}"#,
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["status"], "ignored");
    assert_eq!(stats(&client, &srv.base_url).await["pending"], 0);
}

#[tokio::test]
async fn missing_delivery_id_is_a_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = r#"{"id": 1}"#;

    let res = client
        .post(format!("{}/webhooks/commerce", srv.base_url))
        .header("x-webhook-topic", "order-created")
        .header("x-webhook-hmac", sign(body.as_bytes(), WEBHOOK_SECRET))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn drain_processes_a_bounded_batch_oldest_first() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for (i, order) in [(1, 101), (2, 102), (3, 103)] {
        let body = format!(r#"{{"id": {order}}}"#);
        let res = deliver(
            &client,
            &srv.base_url,
            &format!("wh-{i}"),
            "order-created",
            &body,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let report = drain(&client, &srv.base_url, 1).await;
    assert_eq!(report["processed"], 1);
    assert_eq!(report["succeeded"], 1);
    assert_eq!(report["failed"], 0);

    let counts = stats(&client, &srv.base_url).await;
    assert_eq!(counts["pending"], 2);
    assert_eq!(counts["done"], 1);

    let report = drain(&client, &srv.base_url, 100).await;
    assert_eq!(report["processed"], 2);
    assert_eq!(stats(&client, &srv.base_url).await["done"], 3);
}

#[tokio::test]
async fn job_without_order_reference_fails_at_execution() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = deliver(
        &client,
        &srv.base_url,
        "wh-1",
        "order-created",
        r#"{"unexpected": "shape"}"#,
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let report = drain(&client, &srv.base_url, 10).await;
    assert_eq!(report["processed"], 1);
    assert_eq!(report["failed"], 1);
    assert_eq!(stats(&client, &srv.base_url).await["failed"], 1);
}

#[tokio::test]
async fn drain_requires_the_access_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs/drain", srv.base_url))
        .header("x-drain-secret", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/jobs/stats", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn operator_endpoints_are_open_without_a_configured_token() {
    let mut config = test_config();
    config.drain_secret = None;
    let srv = TestServer::spawn_with(config).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs/drain", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["processed"], 0);

    let res = client
        .get(format!("{}/jobs/stats", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_webhook_secret_fails_closed() {
    let mut config = test_config();
    config.webhook_secret = None;
    let srv = TestServer::spawn_with(config).await;
    let client = reqwest::Client::new();

    let res = deliver(&client, &srv.base_url, "wh-1", "order-created", r#"{"id": 1}"#).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn flood_from_one_sender_hits_the_limit_with_a_retry_hint() {
    let mut config = test_config();
    config.identity_limit = 2;
    let srv = TestServer::spawn_with(config).await;
    let client = reqwest::Client::new();

    for i in 0..2 {
        let res = deliver(
            &client,
            &srv.base_url,
            &format!("wh-{i}"),
            "order-created",
            r#"{"id": 1}"#,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = deliver(&client, &srv.base_url, "wh-9", "order-created", r#"{"id": 1}"#).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res
        .headers()
        .get("retry-after")
        .expect("retry-after header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);

    // The rejection wrote nothing new.
    assert_eq!(stats(&client, &srv.base_url).await["pending"], 2);
}
