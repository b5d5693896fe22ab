//! Routing through the real HTTP clients against local stub services.

use audit_store::AuditLogger;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use dispatch_core::{AttemptStatus, Disposition};
use dispatcher::{EventRouter, RouterConfig};
use gateway::{
    BreakerConfig, CircuitBreaker, CircuitState, GatewayConfig, HttpDeliveryGateway,
    ProfileConfig, TenantConfigResolver,
};
use integration_tests::fixtures::{self, RECIPIENT, STATUS_KEY, TENANT_ID, URGENT_KEY};
use integration_tests::mocks::InMemoryAuditSink;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Delivery and profile API in one stub.
#[derive(Clone, Default)]
struct Upstream {
    send_status: Arc<Mutex<u16>>,
    sent: Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>,
}

async fn send_handler(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let n = {
        let mut sent = upstream.sent.lock();
        sent.push((key, body));
        sent.len()
    };

    let status = *upstream.send_status.lock();
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, format!(r#"{{"data":{{"message_id":"wamid-{}"}}}}"#, n))
}

async fn profile_handler(Query(params): Query<HashMap<String, String>>) -> (StatusCode, String) {
    match params.get("tenant_id").map(String::as_str) {
        Some(TENANT_ID) => (
            StatusCode::OK,
            r#"{"data":{"escalationRecipient":"628555"}}"#.into(),
        ),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}

struct Harness {
    upstream: Upstream,
    audit: Arc<InMemoryAuditSink>,
    breaker: Arc<CircuitBreaker>,
    router: EventRouter,
}

async fn harness(router_config: RouterConfig) -> Harness {
    let upstream = Upstream::default();
    *upstream.send_status.lock() = 200;

    let app = Router::new()
        .route("/send", post(send_handler))
        .route("/profile", get(profile_handler))
        .with_state(upstream.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base_url = format!("http://{}", addr);

    let breaker = Arc::new(CircuitBreaker::new(
        "delivery",
        BreakerConfig {
            failure_threshold: 1,
            reset_timeout_ms: 60_000,
            ..BreakerConfig::default()
        },
    ));
    let delivery = HttpDeliveryGateway::new(
        GatewayConfig {
            base_url: base_url.clone(),
            api_key: "gateway-key".into(),
            retries: 1,
            retry_backoff_ms: 5,
            request_timeout_ms: 2_000,
            ..GatewayConfig::default()
        },
        breaker.clone(),
    )
    .unwrap();
    let directory = TenantConfigResolver::new(&ProfileConfig {
        base_url,
        timeout_ms: 1_000,
        ..ProfileConfig::default()
    })
    .unwrap();

    let audit = Arc::new(InMemoryAuditSink::new());
    let router = EventRouter::new(
        router_config,
        Arc::new(delivery),
        Arc::new(directory),
        AuditLogger::new(audit.clone()),
    );

    Harness {
        upstream,
        audit,
        breaker,
        router,
    }
}

#[tokio::test]
async fn test_status_update_is_posted_to_delivery_api() {
    let h = harness(RouterConfig::default()).await;

    let disposition = h
        .router
        .route(
            STATUS_KEY,
            &fixtures::body(&fixtures::status_updated(1042, "DONE")),
        )
        .await;
    assert_eq!(disposition, Disposition::Ack);

    let sent = h.upstream.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.as_deref(), Some("gateway-key"));
    assert_eq!(sent[0].1["recipient"], RECIPIENT);
    assert_eq!(sent[0].1["tenant_id"], TENANT_ID);
    assert!(sent[0].1["message"]
        .as_str()
        .unwrap_or_default()
        .contains("has been resolved"));
    assert!(sent[0].1.get("notification_type").is_none());

    let attempts = h.audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Sent);
    assert_eq!(attempts[0].provider_message_id.as_deref(), Some("wamid-1"));
}

#[tokio::test]
async fn test_urgent_alert_uses_profile_override() {
    let h = harness(RouterConfig {
        urgent_auto_send: true,
        ..RouterConfig::default()
    })
    .await;

    h.router
        .route(URGENT_KEY, &fixtures::body(&fixtures::urgent_alert(TENANT_ID)))
        .await;

    let sent = h.upstream.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1["recipient"], "628555");
    assert_eq!(h.audit.attempts()[0].recipient_id.as_deref(), Some("628555"));
}

#[tokio::test]
async fn test_failing_api_opens_circuit_and_fails_fast() {
    let h = harness(RouterConfig::default()).await;
    *h.upstream.send_status.lock() = 503;

    let body = fixtures::body(&fixtures::status_updated(1, "DONE"));

    assert_eq!(h.router.route(STATUS_KEY, &body).await, Disposition::Ack);
    assert_eq!(h.upstream.sent.lock().len(), 2);
    assert_eq!(h.breaker.state(), CircuitState::Open);

    assert_eq!(h.router.route(STATUS_KEY, &body).await, Disposition::Ack);
    assert_eq!(h.upstream.sent.lock().len(), 2);

    let attempts = h.audit.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.status == AttemptStatus::Failed));
    let detail = attempts[1].detail.clone().unwrap_or_default();
    assert!(detail.contains("circuit open"), "detail = {}", detail);

    h.breaker.reset();
    *h.upstream.send_status.lock() = 200;
    h.router.route(STATUS_KEY, &body).await;
    assert_eq!(h.audit.attempts()[2].status, AttemptStatus::Sent);
}

#[tokio::test]
async fn test_rejection_is_not_retried() {
    let h = harness(RouterConfig::default()).await;
    *h.upstream.send_status.lock() = 422;

    h.router
        .route(
            STATUS_KEY,
            &fixtures::body(&fixtures::status_updated(1, "DONE")),
        )
        .await;

    assert_eq!(h.upstream.sent.lock().len(), 1);
    assert_eq!(h.breaker.state(), CircuitState::Closed);
    assert_eq!(h.audit.attempts()[0].status, AttemptStatus::Failed);
}
