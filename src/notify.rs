//! Outbound notifications.
//!
//! Two seams: a [`NotificationSink`] for in-app/real-time delivery and a
//! [`Mailer`] for email and SMS. Both are fire-and-forget from the
//! scheduler's point of view. [`Notifier`] fans a message out to a list of
//! users according to their preferences, logs failures and reports how
//! many deliveries succeeded.

use crate::calendar;
use crate::call::{CallInstance, TimingBucket};
use crate::catalog::{DeliveryMethod, User};
use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for webhook requests in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "bucket", rename_all = "snake_case")]
pub enum TemplateKind {
    ScheduleCreated,
    CallRescheduled,
    CallCancelled,
    CallShifted,
    Reminder(TimingBucket),
    CallCompleted,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScheduleCreated => write!(f, "schedule_created"),
            Self::CallRescheduled => write!(f, "call_rescheduled"),
            Self::CallCancelled => write!(f, "call_cancelled"),
            Self::CallShifted => write!(f, "call_shifted"),
            Self::Reminder(bucket) => write!(f, "reminder_{}", bucket),
            Self::CallCompleted => write!(f, "call_completed"),
        }
    }
}

/// Rendered notification content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn when(call: &CallInstance) -> String {
    format!(
        "{} at {} ({})",
        call.date.format("%a %d %b %Y"),
        call.start_time.format("%H:%M"),
        call.timezone
    )
}

fn previous_when(call: &CallInstance) -> Option<String> {
    let date = call.previous_date?;
    let time = call.previous_start_time.unwrap_or(call.start_time);
    Some(format!("{} at {}", date.format("%a %d %b %Y"), time.format("%H:%M")))
}

impl Message {
    /// One call of a freshly created schedule of `lesson_count` lessons spanning `span`.
    pub fn schedule_created(call: &CallInstance, lesson_count: usize, span: &str) -> Self {
        Self {
            subject: "New lesson scheduled".to_string(),
            body: format!(
                "Lesson {} is on {} and lasts {}. The course runs {} lessons over {}.",
                call.lesson_id,
                when(call),
                calendar::format_minutes(call.call_duration),
                lesson_count,
                span
            ),
            link: Some(call.meeting.link.clone()),
        }
    }

    pub fn rescheduled(call: &CallInstance) -> Self {
        let body = match previous_when(call) {
            Some(previous) => format!(
                "Lesson {} moved from {} to {}.",
                call.lesson_id,
                previous,
                when(call)
            ),
            None => format!("Lesson {} is now on {}.", call.lesson_id, when(call)),
        };
        Self {
            subject: "Call rescheduled".to_string(),
            body,
            link: Some(call.meeting.link.clone()),
        }
    }

    pub fn cancelled(call: &CallInstance) -> Self {
        Self {
            subject: "Call cancelled".to_string(),
            body: format!("Lesson {} on {} was cancelled.", call.lesson_id, when(call)),
            link: None,
        }
    }

    pub fn shifted(call: &CallInstance) -> Self {
        Self {
            subject: "Schedule updated".to_string(),
            ..Self::rescheduled(call)
        }
    }

    pub fn reminder(call: &CallInstance, bucket: TimingBucket) -> Self {
        Self {
            subject: format!("Lesson starts in {}", bucket.phrase()),
            body: format!(
                "Lesson {} starts {} and lasts {}.",
                call.lesson_id,
                when(call),
                calendar::format_minutes(call.call_duration)
            ),
            link: Some(call.meeting.link.clone()),
        }
    }

    pub fn completed(call: &CallInstance) -> Self {
        Self {
            subject: "Call completed".to_string(),
            body: format!("Lesson {} on {} is complete.", call.lesson_id, when(call)),
            link: None,
        }
    }
}

/// An email address or phone number for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub user_id: String,
    pub address: String,
    #[serde(skip)]
    pub method: DeliveryMethod,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, user_id: &str, message: &Message) -> Result<()>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &Recipient, template: TemplateKind, payload: &Message) -> Result<()>;
}

/// Logs instead of delivering. Used when no webhooks are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationSink for LogDispatcher {
    async fn notify(&self, user_id: &str, message: &Message) -> Result<()> {
        tracing::info!(user_id, subject = %message.subject, "{}", message.body);
        Ok(())
    }
}

#[async_trait]
impl Mailer for LogDispatcher {
    async fn send(&self, recipient: &Recipient, template: TemplateKind, payload: &Message) -> Result<()> {
        tracing::info!(
            user_id = %recipient.user_id,
            address = %recipient.address,
            template = %template,
            "{}",
            payload.subject
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct NotifyEvent<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    message: &'a Message,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct MailEvent<'a> {
    recipient: &'a Recipient,
    channel: &'static str,
    template: TemplateKind,
    payload: &'a Message,
    timestamp: DateTime<Utc>,
}

/// POSTs JSON events to configured URLs.
pub struct WebhookDispatcher {
    client: Client,
    webhook_url: Option<String>,
    mail_webhook_url: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(
        webhook_url: Option<String>,
        mail_webhook_url: Option<String>,
        timeout_ms: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(crate::ua::user_agent())
            .build()?;
        Ok(Self {
            client,
            webhook_url,
            mail_webhook_url,
        })
    }

    async fn post<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SchedulerError::external("webhook", e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SchedulerError::external(
                "webhook",
                format!("webhook returned status {}", response.status()),
            ))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookDispatcher {
    async fn notify(&self, user_id: &str, message: &Message) -> Result<()> {
        let Some(url) = self.webhook_url.as_deref() else {
            tracing::debug!(user_id, "No notification webhook configured, dropping");
            return Ok(());
        };
        let event = NotifyEvent {
            user_id,
            message,
            timestamp: Utc::now(),
        };
        self.post(url, &event).await
    }
}

#[async_trait]
impl Mailer for WebhookDispatcher {
    async fn send(&self, recipient: &Recipient, template: TemplateKind, payload: &Message) -> Result<()> {
        let Some(url) = self.mail_webhook_url.as_deref() else {
            tracing::debug!(user_id = %recipient.user_id, "No mail webhook configured, dropping");
            return Ok(());
        };
        let event = MailEvent {
            recipient,
            channel: match recipient.method {
                DeliveryMethod::Sms => "sms",
                _ => "email",
            },
            template,
            payload,
            timestamp: Utc::now(),
        };
        self.post(url, &event).await
    }
}

/// Preference-aware fan-out over a sink and a mailer.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, mailer: Arc<dyn Mailer>) -> Self {
        Self { sink, mailer }
    }

    /// Both seams logging only.
    pub fn logging() -> Self {
        Self::new(Arc::new(LogDispatcher), Arc::new(LogDispatcher))
    }

    /// Deliver `message` to every user on every method they enabled.
    ///
    /// Reminders also honour the user's bucket switches. Failures are
    /// logged and skipped. Returns the number of successful deliveries.
    pub async fn fan_out(&self, users: &[&User], template: TemplateKind, message: &Message) -> usize {
        let mut deliveries: Vec<BoxFuture<'_, (String, DeliveryMethod, Result<()>)>> = Vec::new();

        for user in users {
            let prefs = &user.preferences;
            if let TemplateKind::Reminder(bucket) = template {
                if !prefs.wants_bucket(bucket) {
                    tracing::debug!(user_id = %user.id, bucket = %bucket, "Reminder bucket disabled");
                    continue;
                }
            }

            if prefs.wants_method(DeliveryMethod::InApp) {
                let sink = Arc::clone(&self.sink);
                let user_id = user.id.clone();
                deliveries.push(
                    async move {
                        let result = sink.notify(&user_id, message).await;
                        (user_id, DeliveryMethod::InApp, result)
                    }
                    .boxed(),
                );
            }

            let mut addresses = Vec::new();
            if prefs.wants_method(DeliveryMethod::Email) && !user.email.is_empty() {
                addresses.push((DeliveryMethod::Email, user.email.clone()));
            }
            if prefs.wants_method(DeliveryMethod::Sms) {
                if let Some(phone) = user.phone.as_ref().filter(|p| !p.is_empty()) {
                    addresses.push((DeliveryMethod::Sms, phone.clone()));
                }
            }

            for (method, address) in addresses {
                let mailer = Arc::clone(&self.mailer);
                let recipient = Recipient {
                    user_id: user.id.clone(),
                    address,
                    method,
                };
                deliveries.push(
                    async move {
                        let result = mailer.send(&recipient, template, message).await;
                        (recipient.user_id, method, result)
                    }
                    .boxed(),
                );
            }
        }

        let mut delivered = 0;
        for (user_id, method, result) in join_all(deliveries).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, method = ?method, template = %template, "Notification failed: {}", e);
                }
            }
        }
        delivered
    }
}
