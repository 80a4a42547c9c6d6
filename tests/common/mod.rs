//! Shared test utilities for tutorcall integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tutorcall::calendar::WeekdaySet;
use tutorcall::call::{MeetingDetails, MeetingType};
use tutorcall::catalog::Catalog;
use tutorcall::error::Result;
use tutorcall::meeting::{MeetingInput, MeetingProvider, MeetingRequest};
use tutorcall::notify::{Mailer, Message, NotificationSink, Notifier, Recipient, TemplateKind};
use tutorcall::service::{CreateScheduleRequest, SchedulerService};
use tutorcall::store::CallStore;

pub const MEETING_LINK: &str = "https://meet.example.com/algebra";

/// One teacher, two students, one admin and a three-lesson course.
pub const CATALOG_YAML: &str = r#"
users:
  - id: t-1
    name: Asha
    email: asha@example.com
    role: teacher
  - id: s-1
    name: Ben
    email: ben@example.com
    role: student
  - id: s-2
    name: Chen
    email: chen@example.com
    role: student
  - id: a-1
    name: Ops
    email: ops@example.com
    role: admin
courses:
  - id: course-1
    title: Algebra
    chapters:
      - id: c1
        title: Basics
        lessons:
          - { id: l1, title: Numbers }
          - { id: l2, title: Variables }
      - id: c2
        title: Equations
        lessons:
          - { id: l3, title: Linear equations }
batches:
  - id: batch-1
    name: Evening
    course_id: course-1
    teacher_id: t-1
    students:
      - id: s-1
      - id: s-2
"#;

pub fn catalog() -> Catalog {
    let catalog: Catalog = serde_yaml::from_str(CATALOG_YAML).expect("fixture catalog parses");
    catalog.validate().expect("fixture catalog is valid");
    catalog
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Every delivery as `channel:user_id:template`, in arrival order.
#[derive(Default)]
pub struct RecordingNotifier {
    pub deliveries: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn entries(&self) -> Vec<String> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.entries().iter().filter(|e| e.contains(needle)).count()
    }

    pub fn clear(&self) {
        self.deliveries.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, user_id: &str, message: &Message) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push(format!("in_app:{}:{}", user_id, message.subject));
        Ok(())
    }
}

#[async_trait]
impl Mailer for RecordingNotifier {
    async fn send(&self, recipient: &Recipient, template: TemplateKind, _payload: &Message) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push(format!("mail:{}:{}", recipient.user_id, template));
        Ok(())
    }
}

/// Hands out the same Zoom meeting and remembers who asked.
#[derive(Default)]
pub struct FixedMeetings {
    pub requests: Mutex<Vec<MeetingRequest>>,
}

#[async_trait]
impl MeetingProvider for FixedMeetings {
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<MeetingDetails> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(MeetingDetails {
            meeting_type: MeetingType::Zoom,
            link: "https://zoom.example.com/j/123".to_string(),
            meeting_id: Some("123".to_string()),
            passcode: Some("secret".to_string()),
        })
    }
}

pub struct Harness {
    pub service: SchedulerService,
    pub notifications: Arc<RecordingNotifier>,
    pub meetings: Arc<FixedMeetings>,
}

pub fn harness(store: Arc<dyn CallStore>) -> Harness {
    let notifications = Arc::new(RecordingNotifier::default());
    let meetings = Arc::new(FixedMeetings::default());
    let sink: Arc<RecordingNotifier> = Arc::clone(&notifications);
    let mailer: Arc<RecordingNotifier> = Arc::clone(&notifications);
    let provider: Arc<FixedMeetings> = Arc::clone(&meetings);
    let service = SchedulerService::new(store, catalog(), provider, Notifier::new(sink, mailer));
    Harness {
        service,
        notifications,
        meetings,
    }
}

/// Mondays and Wednesdays from Monday 2024-01-01 at 10:00 UTC, 40 minutes, all lessons.
pub fn weekly_request() -> CreateScheduleRequest {
    CreateScheduleRequest {
        batch_id: "batch-1".to_string(),
        course_id: "course-1".to_string(),
        meeting: MeetingInput::External {
            link: MEETING_LINK.to_string(),
        },
        start_date: date(2024, 1, 1),
        start_time: time(10, 0),
        days: WeekdaySet::from_str("mon,wed").unwrap(),
        repeat: true,
        call_duration: 40,
        timezone: None,
        lesson_ids: None,
    }
}
