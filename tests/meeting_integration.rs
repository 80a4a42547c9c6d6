//! Integration tests for the Zoom meeting client using wiremock

mod common;

use chrono::NaiveDate;
use common::time;
use tutorcall::call::MeetingType;
use tutorcall::error::SchedulerError;
use tutorcall::meeting::{MeetingProvider, MeetingRequest, ZoomClient};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_TOKEN: &str = "zoom_test_token_123";

fn request() -> MeetingRequest {
    MeetingRequest {
        topic: "Algebra - Evening".to_string(),
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_time(time(10, 0)),
        duration_minutes: 40,
        host_email: "asha@example.com".to_string(),
        timezone: "Asia/Kolkata".to_string(),
    }
}

#[tokio::test]
async fn test_create_meeting_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users/asha@example.com/meetings"))
        .and(header("Authorization", format!("Bearer {}", TEST_TOKEN)))
        .and(body_partial_json(serde_json::json!({
            "topic": "Algebra - Evening",
            "type": 2,
            "start_time": "2024-01-01T10:00:00",
            "duration": 40,
            "timezone": "Asia/Kolkata"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 85746065432u64,
            "join_url": "https://zoom.us/j/85746065432",
            "password": "abc123"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ZoomClient::with_base_url(mock_server.uri(), Some(TEST_TOKEN.to_string())).unwrap();
    let meeting = client.create_meeting(&request()).await.unwrap();

    assert_eq!(meeting.meeting_type, MeetingType::Zoom);
    assert_eq!(meeting.link, "https://zoom.us/j/85746065432");
    assert_eq!(meeting.meeting_id.as_deref(), Some("85746065432"));
    assert_eq!(meeting.passcode.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn test_create_meeting_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users/asha@example.com/meetings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": 124,
            "message": "Invalid access token."
        })))
        .mount(&mock_server)
        .await;

    let client = ZoomClient::with_base_url(mock_server.uri(), Some("expired".to_string())).unwrap();
    let result = client.create_meeting(&request()).await;

    match result {
        Err(SchedulerError::ExternalService { service, message }) => {
            assert_eq!(service, "zoom");
            assert_eq!(message, "Invalid access token.");
        }
        other => panic!("expected ExternalService, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_meeting_server_error_without_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = ZoomClient::with_base_url(mock_server.uri(), Some(TEST_TOKEN.to_string())).unwrap();
    let result = client.create_meeting(&request()).await;

    assert!(matches!(
        result,
        Err(SchedulerError::ExternalService { ref message, .. }) if message.contains("500")
    ));
}

#[tokio::test]
async fn test_create_meeting_without_token_makes_no_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = ZoomClient::with_base_url(mock_server.uri(), None).unwrap();
    let result = client.create_meeting(&request()).await;

    assert!(matches!(result, Err(SchedulerError::ExternalService { .. })));
}
