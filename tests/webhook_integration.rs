//! Integration tests for webhook notification delivery using wiremock

mod common;

use std::sync::Arc;
use tutorcall::call::TimingBucket;
use tutorcall::catalog::DeliveryMethod;
use tutorcall::error::SchedulerError;
use tutorcall::notify::{
    DEFAULT_TIMEOUT_MS, Mailer, Message, NotificationSink, Notifier, Recipient, TemplateKind,
    WebhookDispatcher,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message() -> Message {
    Message {
        subject: "Lesson starts in 1 hour".to_string(),
        body: "Lesson l1 starts Mon 01 Jan 2024 at 10:00 (UTC) and lasts 40min.".to_string(),
        link: Some(common::MEETING_LINK.to_string()),
    }
}

fn dispatcher(server: &MockServer) -> WebhookDispatcher {
    WebhookDispatcher::new(
        Some(format!("{}/notify", server.uri())),
        Some(format!("{}/mail", server.uri())),
        DEFAULT_TIMEOUT_MS,
    )
    .unwrap()
}

#[tokio::test]
async fn test_in_app_notification_is_posted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notify"))
        .and(body_partial_json(serde_json::json!({
            "user_id": "s-1",
            "subject": "Lesson starts in 1 hour",
            "link": common::MEETING_LINK
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    dispatcher(&mock_server).notify("s-1", &message()).await.unwrap();
}

#[tokio::test]
async fn test_mail_carries_template_and_channel() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mail"))
        .and(body_partial_json(serde_json::json!({
            "recipient": { "user_id": "s-1", "address": "+15550100" },
            "channel": "sms",
            "template": { "kind": "reminder", "bucket": "1hour" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let recipient = Recipient {
        user_id: "s-1".to_string(),
        address: "+15550100".to_string(),
        method: DeliveryMethod::Sms,
    };
    dispatcher(&mock_server)
        .send(&recipient, TemplateKind::Reminder(TimingBucket::OneHour), &message())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let result = dispatcher(&mock_server).notify("s-1", &message()).await;

    assert!(matches!(
        result,
        Err(SchedulerError::ExternalService { ref service, .. }) if service == "webhook"
    ));
}

#[tokio::test]
async fn test_fan_out_counts_only_successful_deliveries() {
    let mock_server = MockServer::start().await;

    // In-app works, mail is down
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mail"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let webhook = Arc::new(dispatcher(&mock_server));
    let sink: Arc<WebhookDispatcher> = Arc::clone(&webhook);
    let notifier = Notifier::new(sink, webhook);

    let catalog = common::catalog();
    let users: Vec<_> = ["t-1", "s-1", "s-2"]
        .iter()
        .map(|id| catalog.user(id).unwrap())
        .collect();

    let delivered = notifier
        .fan_out(&users, TemplateKind::CallCancelled, &message())
        .await;
    assert_eq!(delivered, 3);
}

#[tokio::test]
async fn test_unset_urls_are_silently_skipped() {
    let webhook = WebhookDispatcher::new(None, None, DEFAULT_TIMEOUT_MS).unwrap();
    assert!(webhook.notify("s-1", &message()).await.is_ok());
}
