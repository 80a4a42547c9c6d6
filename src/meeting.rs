//! Meeting links: supplied by the caller or created through Zoom's REST API.

use crate::call::{MeetingDetails, MeetingType};
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "zoom";

/// Zoom "scheduled meeting" type.
const SCHEDULED_MEETING: u8 = 2;

/// Where a schedule's meeting link comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingInput {
    /// Create one through the configured provider.
    Zoom,
    /// Use a link the caller already has.
    External { link: String },
}

#[derive(Debug, Clone)]
pub struct MeetingRequest {
    pub topic: String,
    /// Wall-clock start in `timezone`.
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub host_email: String,
    pub timezone: String,
}

#[async_trait]
pub trait MeetingProvider: Send + Sync {
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingDetails>;
}

/// Turn a meeting input into concrete details, calling the provider for Zoom.
pub async fn resolve_meeting(
    provider: &dyn MeetingProvider,
    input: &MeetingInput,
    request: &MeetingRequest,
) -> Result<MeetingDetails> {
    match input {
        MeetingInput::External { link } => {
            let link = link.trim();
            if link.is_empty() {
                return Err(SchedulerError::validation(
                    "link",
                    "an external meeting needs a link",
                ));
            }
            Ok(MeetingDetails::external(link))
        }
        MeetingInput::Zoom => provider.create_meeting(request).await,
    }
}

#[derive(Serialize)]
struct CreateMeetingBody<'a> {
    topic: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    start_time: String,
    duration: u32,
    timezone: &'a str,
}

#[derive(Deserialize)]
struct CreateMeetingResponse {
    join_url: String,
    id: serde_json::Value,
    #[serde(default)]
    password: Option<String>,
}

pub struct ZoomClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl ZoomClient {
    pub fn new(api_url: &str, access_token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(crate::ua::user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Client against an explicit base URL with the default timeout (for testing)
    pub fn with_base_url(base_url: String, access_token: Option<String>) -> Result<Self> {
        Self::new(&base_url, access_token, 30)
    }

    fn require_token(&self) -> Result<&str> {
        self.access_token.as_deref().ok_or_else(|| {
            SchedulerError::external(SERVICE, "no access token configured (meeting.access_token)")
        })
    }

    async fn handle_error(response: Response) -> SchedulerError {
        let status = response.status();

        #[derive(Deserialize)]
        struct ErrorResponse {
            message: Option<String>,
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => None,
        };

        match status {
            StatusCode::UNAUTHORIZED => SchedulerError::external(
                SERVICE,
                message.unwrap_or_else(|| "access token rejected".to_string()),
            ),
            StatusCode::NOT_FOUND => SchedulerError::external(
                SERVICE,
                message.unwrap_or_else(|| "host user not found".to_string()),
            ),
            _ => SchedulerError::external(
                SERVICE,
                message.unwrap_or_else(|| format!("request failed with status {}", status)),
            ),
        }
    }
}

#[async_trait]
impl MeetingProvider for ZoomClient {
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingDetails> {
        let token = self.require_token()?;
        let url = format!("{}/users/{}/meetings", self.base_url, request.host_email);
        let body = CreateMeetingBody {
            topic: &request.topic,
            kind: SCHEDULED_MEETING,
            start_time: request.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            duration: request.duration_minutes,
            timezone: &request.timezone,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&body)
            .send()
            .await
            .map_err(|e| SchedulerError::external(SERVICE, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let created: CreateMeetingResponse = response
            .json()
            .await
            .map_err(|e| SchedulerError::external(SERVICE, format!("unexpected response: {}", e)))?;

        let meeting_id = match created.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };

        tracing::info!(meeting_id = %meeting_id, host = %request.host_email, "Created Zoom meeting");
        Ok(MeetingDetails {
            meeting_type: MeetingType::Zoom,
            link: created.join_url,
            meeting_id: Some(meeting_id),
            passcode: created.password,
        })
    }
}
