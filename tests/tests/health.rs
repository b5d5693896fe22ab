//! Tests for the operational HTTP endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use gateway::CircuitState;
use integration_tests::mocks::InMemoryConnector;
use integration_tests::setup::{api_router, broker_manager};
use std::sync::Arc;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let manager = broker_manager(Arc::new(InMemoryConnector::new()));
    let (router, _) = api_router(manager);
    let server = TestServer::new(router).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for field in [
        "status",
        "broker_connected",
        "broker_state",
        "audit_connected",
        "in_flight",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }
    assert_eq!(body["broker_connected"], false);
    assert_eq!(body["broker_state"], "disconnected");
}

/// Readiness follows the broker session
#[tokio::test]
async fn test_ready_tracks_broker_connection() {
    let manager = broker_manager(Arc::new(InMemoryConnector::new()));
    let (router, _) = api_router(manager.clone());
    let server = TestServer::new(router).expect("Failed to create test server");

    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    manager.connect().await.unwrap();
    server.get("/health/ready").await.assert_status_ok();

    manager.shutdown().await;
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

/// Liveness does not depend on the broker
#[tokio::test]
async fn test_live_endpoint_without_broker() {
    let manager = broker_manager(Arc::new(InMemoryConnector::new()));
    let (router, _) = api_router(manager);
    let server = TestServer::new(router).expect("Failed to create test server");

    let response = server.get("/health/live").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["alive"], true);
    assert_eq!(body["broker_connected"], false);
}

/// /metrics lists dispatcher counters and every breaker
#[tokio::test]
async fn test_metrics_endpoint() {
    let manager = broker_manager(Arc::new(InMemoryConnector::new()));
    let (router, _) = api_router(manager);
    let server = TestServer::new(router).expect("Failed to create test server");

    let response = server.get("/metrics").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert!(body["dispatcher"].get("messages_received").is_some());
    assert!(body["dispatcher"].get("notifications_sent").is_some());

    let names: Vec<&str> = body["circuit_breakers"]
        .as_array()
        .map(|b| b.iter().filter_map(|m| m["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["delivery", "profile"]);
    assert_eq!(body["circuit_breakers"][0]["state"], "closed");
}

/// Operators can force a breaker closed
#[tokio::test]
async fn test_breaker_reset() {
    let manager = broker_manager(Arc::new(InMemoryConnector::new()));
    let (router, breakers) = api_router(manager);
    let server = TestServer::new(router).expect("Failed to create test server");

    let delivery = breakers[0].clone();
    for _ in 0..delivery.config().failure_threshold {
        let _ = delivery
            .execute(|| async { Err::<(), _>("upstream down") })
            .await;
    }
    assert_eq!(delivery.state(), CircuitState::Open);

    let response = server.post("/circuit-breakers/delivery/reset").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "closed");
    assert_eq!(delivery.state(), CircuitState::Closed);

    server
        .post("/circuit-breakers/sms/reset")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
