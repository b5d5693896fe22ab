//! Events that reach the decision point but are not delivered, and
//! messages that never get that far.

use dispatch_core::{skip_reason, AttemptStatus, ChannelKind, Disposition};
use dispatcher::RouterConfig;
use integration_tests::fixtures::{self, CREATED_KEY, RECIPIENT, STATUS_KEY, TENANT_ID, URGENT_KEY};
use integration_tests::mocks::StaticDirectory;
use integration_tests::setup::TestContext;

async fn assert_skipped(ctx: &TestContext, reason: &str) {
    let attempt = ctx.single_attempt();
    assert_eq!(attempt.status, AttemptStatus::Skipped);
    assert_eq!(attempt.detail.as_deref(), Some(reason));
    assert_eq!(ctx.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_pending_status_is_not_notify_worthy() {
    let ctx = TestContext::new(RouterConfig::default());

    let disposition = ctx
        .route(STATUS_KEY, &fixtures::status_updated(1, "PENDING"))
        .await;

    assert_eq!(disposition, Disposition::Ack);
    assert_skipped(&ctx, skip_reason::STATUS_NOT_NOTIFIABLE).await;
    assert_eq!(ctx.single_attempt().recipient_id.as_deref(), Some(RECIPIENT));
}

#[tokio::test]
async fn test_configured_statuses_replace_defaults() {
    let ctx = TestContext::new(RouterConfig {
        notify_statuses: vec!["pending".into()],
        ..RouterConfig::default()
    });

    ctx.route(STATUS_KEY, &fixtures::status_updated(1, "DONE"))
        .await;
    assert_skipped(&ctx, skip_reason::STATUS_NOT_NOTIFIABLE).await;
}

#[tokio::test]
async fn test_web_recipients_are_not_pushed() {
    for (key, event) in [
        (CREATED_KEY, fixtures::resource_created(3)),
        (STATUS_KEY, fixtures::status_updated(3, "DONE")),
    ] {
        let ctx = TestContext::new(RouterConfig::default());

        let disposition = ctx.route(key, &fixtures::on_channel(event, "web")).await;

        assert_eq!(disposition, Disposition::Ack);
        assert_skipped(&ctx, skip_reason::NON_PUSH_CHANNEL).await;
        assert_eq!(ctx.single_attempt().channel_kind, Some(ChannelKind::Web));
    }
}

#[tokio::test]
async fn test_legacy_phone_on_web_channel_is_not_pushed() {
    let ctx = TestContext::new(RouterConfig::default());

    let event = fixtures::with_channel_kind(fixtures::status_updated(5, "DONE"), "web");
    let disposition = ctx.route(STATUS_KEY, &event).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_skipped(&ctx, skip_reason::NON_PUSH_CHANNEL).await;
    let attempt = ctx.single_attempt();
    assert_eq!(attempt.channel_kind, Some(ChannelKind::Web));
    assert_eq!(attempt.recipient_id.as_deref(), Some(RECIPIENT));
}

#[tokio::test]
async fn test_unknown_channel_is_not_pushed() {
    let ctx = TestContext::new(RouterConfig::default());

    ctx.route(
        CREATED_KEY,
        &fixtures::on_channel(fixtures::resource_created(4), "carrier-pigeon"),
    )
    .await;

    assert_skipped(&ctx, skip_reason::NON_PUSH_CHANNEL).await;
    assert_eq!(ctx.single_attempt().channel_kind, Some(ChannelKind::Unknown));
}

#[tokio::test]
async fn test_missing_recipient_is_checked_first() {
    let ctx = TestContext::new(RouterConfig::default());

    // Not notify-worthy either, but the recipient check runs first.
    ctx.route(
        STATUS_KEY,
        &fixtures::without_recipient(fixtures::status_updated(6, "PENDING")),
    )
    .await;

    assert_skipped(&ctx, skip_reason::NO_RECIPIENT).await;
    let attempt = ctx.single_attempt();
    assert!(attempt.recipient_id.is_none());
    assert_eq!(attempt.tenant_id.as_deref(), Some(TENANT_ID));
}

#[tokio::test]
async fn test_urgent_alert_held_when_auto_send_disabled() {
    let ctx = TestContext::with_directory(
        RouterConfig::default(),
        StaticDirectory::new().with(TENANT_ID, "628777"),
    );

    let disposition = ctx.route(URGENT_KEY, &fixtures::urgent_alert(TENANT_ID)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_skipped(&ctx, skip_reason::AUTO_SEND_DISABLED).await;

    let attempt = ctx.single_attempt();
    assert_eq!(attempt.recipient_id.as_deref(), Some("628777"));
    assert!(attempt.message.starts_with("URGENT: Flood\n"));
}

#[tokio::test]
async fn test_urgent_alert_without_contact_is_skipped() {
    let ctx = TestContext::new(RouterConfig {
        urgent_auto_send: true,
        ..RouterConfig::default()
    });

    ctx.route(URGENT_KEY, &fixtures::urgent_alert(TENANT_ID))
        .await;

    assert_skipped(&ctx, skip_reason::NO_ESCALATION_RECIPIENT).await;
    assert!(ctx.single_attempt().message.is_empty());
}

#[tokio::test]
async fn test_urgent_alert_on_web_channel_is_not_pushed() {
    let ctx = TestContext::with_directory(
        RouterConfig {
            urgent_auto_send: true,
            ..RouterConfig::default()
        },
        StaticDirectory::new().with(TENANT_ID, "628777"),
    );

    let event = fixtures::on_channel(fixtures::urgent_alert(TENANT_ID), "web");
    let disposition = ctx.route(URGENT_KEY, &event).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_skipped(&ctx, skip_reason::NON_PUSH_CHANNEL).await;
    let attempt = ctx.single_attempt();
    assert_eq!(attempt.channel_kind, Some(ChannelKind::Web));
    assert_eq!(attempt.recipient_id.as_deref(), Some("628777"));
}

#[tokio::test]
async fn test_urgent_alert_without_contact_and_auto_send_disabled() {
    let ctx = TestContext::new(RouterConfig::default());
    assert!(!ctx.router.config().urgent_auto_send);

    let disposition = ctx.route(URGENT_KEY, &fixtures::urgent_alert(TENANT_ID)).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_skipped(&ctx, skip_reason::NO_ESCALATION_RECIPIENT).await;
    assert!(ctx.single_attempt().message.is_empty());
}

#[tokio::test]
async fn test_undecodable_messages_are_dropped_without_audit() {
    let ctx = TestContext::new(RouterConfig::default());

    let mut missing_status = fixtures::status_updated(1, "DONE");
    if let Some(fields) = missing_status.as_object_mut() {
        fields.remove("status");
    }

    let cases: Vec<(&str, Vec<u8>)> = vec![
        (STATUS_KEY, b"{not json".to_vec()),
        (STATUS_KEY, vec![0xc3, 0x28]),
        (STATUS_KEY, fixtures::body(&missing_status)),
        ("complaint.deleted", fixtures::body(&fixtures::resource_created(1))),
    ];

    for (key, body) in cases {
        assert_eq!(ctx.router.route(key, &body).await, Disposition::NackDrop);
    }

    assert_eq!(ctx.audit.attempt_count(), 0);
    assert_eq!(ctx.gateway.request_count(), 0);
}
