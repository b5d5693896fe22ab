//! Consumption through the connection manager, across broker outages.

use broker::LifecycleState;
use dispatch_core::{AttemptStatus, Disposition};
use dispatcher::RouterConfig;
use integration_tests::fixtures::{self, STATUS_KEY};
use integration_tests::mocks::{inbound, InMemoryConnector, RecordingAcker};
use integration_tests::setup::{broker_manager, wait_for, wait_until_running, TestContext};
use std::sync::Arc;

#[tokio::test]
async fn test_messages_are_routed_and_settled() {
    let ctx = TestContext::new(RouterConfig::default());
    let connector = Arc::new(InMemoryConnector::new());
    let manager = broker_manager(connector.clone());

    manager.connect().await.unwrap();
    manager.start_consuming(ctx.router.clone()).await.unwrap();
    assert_eq!(manager.state(), LifecycleState::Running);

    let acker = Arc::new(RecordingAcker::default());
    let feed = connector.latest_feed().unwrap();
    feed.send(inbound(
        &acker,
        STATUS_KEY,
        fixtures::body(&fixtures::status_updated(1, "DONE")),
        1,
    ))
    .await
    .unwrap();
    feed.send(inbound(&acker, STATUS_KEY, b"garbage".to_vec(), 2))
        .await
        .unwrap();

    wait_for(|| acker.settled_count() == 2).await;
    assert_eq!(
        acker.settled(),
        vec![(1, Disposition::Ack), (2, Disposition::NackDrop)]
    );
    assert_eq!(ctx.audit.attempt_count(), 1);
    assert_eq!(ctx.audit.attempts()[0].status, AttemptStatus::Sent);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_handler_resumes_after_connection_loss() {
    let ctx = TestContext::new(RouterConfig::default());
    let connector = Arc::new(InMemoryConnector::new());
    let manager = broker_manager(connector.clone());

    manager.connect().await.unwrap();
    manager.start_consuming(ctx.router.clone()).await.unwrap();

    connector.refuse_next(2);
    connector.drop_sessions();

    wait_for(|| connector.open_feeds() == 1).await;
    wait_until_running(&manager).await;
    assert_eq!(connector.connect_count(), 4);

    let acker = Arc::new(RecordingAcker::default());
    connector
        .latest_feed()
        .unwrap()
        .send(inbound(
            &acker,
            STATUS_KEY,
            fixtures::body(&fixtures::status_updated(2, "PROCESS")),
            7,
        ))
        .await
        .unwrap();

    wait_for(|| acker.settled_count() == 1).await;
    assert_eq!(acker.settled(), vec![(7, Disposition::Ack)]);
    assert_eq!(ctx.gateway.request_count(), 1);

    manager.shutdown().await;
    assert_eq!(manager.state(), LifecycleState::ShuttingDown);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_broker_down_at_startup_recovers_in_background() {
    let ctx = TestContext::new(RouterConfig::default());
    let connector = Arc::new(InMemoryConnector::new());
    connector.refuse_next(3);
    let manager = broker_manager(connector.clone());

    assert!(manager.connect().await.is_err());
    assert!(manager.start_consuming(ctx.router.clone()).await.is_err());
    manager.trigger_reconnect();
    assert_eq!(manager.state(), LifecycleState::Reconnecting);

    wait_until_running(&manager).await;
    assert_eq!(connector.connect_count(), 4);

    let acker = Arc::new(RecordingAcker::default());
    connector
        .latest_feed()
        .unwrap()
        .send(inbound(
            &acker,
            STATUS_KEY,
            fixtures::body(&fixtures::status_updated(3, "DONE")),
            1,
        ))
        .await
        .unwrap();

    wait_for(|| acker.settled_count() == 1).await;
    assert_eq!(ctx.audit.attempt_count(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_no_reconnect_after_shutdown() {
    let ctx = TestContext::new(RouterConfig::default());
    let connector = Arc::new(InMemoryConnector::new());
    let manager = broker_manager(connector.clone());

    manager.connect().await.unwrap();
    manager.start_consuming(ctx.router.clone()).await.unwrap();
    manager.shutdown().await;

    connector.drop_sessions();
    manager.trigger_reconnect();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(manager.state(), LifecycleState::ShuttingDown);
}
