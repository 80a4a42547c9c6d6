//! Scheduled call instances and their lifecycle.
//!
//! ```text
//! Scheduled ──► Rescheduled ──► Completed
//!     │              │  ▲
//!     │              └──┘ (further edits)
//!     └──────┬───────┘
//!            ▼
//!        Cancelled (terminal)
//! ```

use crate::calendar::{self, WeekdaySet};
use crate::error::{Result, SchedulerError};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Scheduled,
    Rescheduled,
    Completed,
    Cancelled,
}

impl CallStatus {
    /// Statuses the sweeps and user edits may still act on.
    pub const ACTIVE: [CallStatus; 2] = [CallStatus::Scheduled, CallStatus::Rescheduled];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Rescheduled => "rescheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named reminder windows, measured in minutes until the call starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimingBucket {
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "10min")]
    TenMinutes,
}

impl TimingBucket {
    pub const ALL: [TimingBucket; 4] = [
        TimingBucket::OneDay,
        TimingBucket::OneHour,
        TimingBucket::ThirtyMinutes,
        TimingBucket::TenMinutes,
    ];

    /// Inclusive firing window. Wider than the exact mark so a late or
    /// skipped tick still lands inside it.
    pub fn window(self) -> RangeInclusive<i64> {
        match self {
            Self::OneDay => 1438..=1442,
            Self::OneHour => 58..=62,
            Self::ThirtyMinutes => 28..=32,
            Self::TenMinutes => 7..=13,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1day",
            Self::OneHour => "1hour",
            Self::ThirtyMinutes => "30min",
            Self::TenMinutes => "10min",
        }
    }

    /// Phrase used in reminder text ("starts in 1 hour").
    pub fn phrase(self) -> &'static str {
        match self {
            Self::OneDay => "1 day",
            Self::OneHour => "1 hour",
            Self::ThirtyMinutes => "30 minutes",
            Self::TenMinutes => "10 minutes",
        }
    }

    /// Buckets whose window contains `minutes_until_start`.
    pub fn due(minutes_until_start: i64) -> impl Iterator<Item = TimingBucket> {
        Self::ALL
            .into_iter()
            .filter(move |bucket| bucket.window().contains(&minutes_until_start))
    }
}

impl fmt::Display for TimingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingType {
    Zoom,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingDetails {
    pub meeting_type: MeetingType,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passcode: Option<String>,
}

impl MeetingDetails {
    pub fn external(link: impl Into<String>) -> Self {
        Self {
            meeting_type: MeetingType::External,
            link: link.into(),
            meeting_id: None,
            passcode: None,
        }
    }
}

/// `HH:mm` (de)serialization for wall-clock times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::FORMAT;
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_some(&t.format(FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// One scheduled occurrence of one lesson for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInstance {
    pub id: Uuid,
    pub teacher_id: String,
    pub course_id: String,
    pub batch_id: String,
    pub lesson_id: String,

    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub timezone: String,
    pub call_duration: u32,

    #[serde(default)]
    pub days: WeekdaySet,
    #[serde(default)]
    pub repeat: bool,

    pub meeting: MeetingDetails,
    pub status: CallStatus,

    #[serde(default)]
    pub previous_date: Option<NaiveDate>,
    #[serde(default, with = "hhmm::option")]
    pub previous_start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm::option")]
    pub previous_end_time: Option<NaiveTime>,

    #[serde(default)]
    pub notification_sent: BTreeSet<TimingBucket>,
    #[serde(default)]
    pub student_ids: Vec<String>,

    /// Optimistic concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a call needs except which lesson and which date.
#[derive(Debug, Clone)]
pub struct CallTemplate {
    pub teacher_id: String,
    pub course_id: String,
    pub batch_id: String,
    pub start_time: NaiveTime,
    pub timezone: String,
    pub call_duration: u32,
    pub days: WeekdaySet,
    pub repeat: bool,
    pub meeting: MeetingDetails,
    pub student_ids: Vec<String>,
}

impl CallTemplate {
    /// Build a fresh `Scheduled` instance for one lesson on one date.
    pub fn instantiate(&self, lesson_id: &str, date: NaiveDate, now: DateTime<Utc>) -> CallInstance {
        let (end_time, _) = calendar::end_time(self.start_time, self.call_duration);
        CallInstance {
            id: Uuid::new_v4(),
            teacher_id: self.teacher_id.clone(),
            course_id: self.course_id.clone(),
            batch_id: self.batch_id.clone(),
            lesson_id: lesson_id.to_string(),
            date,
            start_time: self.start_time,
            end_time,
            timezone: self.timezone.clone(),
            call_duration: self.call_duration,
            days: if self.repeat {
                self.days.clone()
            } else {
                WeekdaySet::default()
            },
            repeat: self.repeat,
            meeting: self.meeting.clone(),
            status: CallStatus::Scheduled,
            previous_date: None,
            previous_start_time: None,
            previous_end_time: None,
            notification_sent: BTreeSet::new(),
            student_ids: self.student_ids.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl CallInstance {
    /// The template this instance was created from, for cloning a replacement.
    pub fn template(&self) -> CallTemplate {
        CallTemplate {
            teacher_id: self.teacher_id.clone(),
            course_id: self.course_id.clone(),
            batch_id: self.batch_id.clone(),
            start_time: self.start_time,
            timezone: self.timezone.clone(),
            call_duration: self.call_duration,
            days: self.days.clone(),
            repeat: self.repeat,
            meeting: self.meeting.clone(),
            student_ids: self.student_ids.clone(),
        }
    }

    pub fn tz(&self) -> Result<Tz> {
        calendar::parse_timezone(&self.timezone)
    }

    /// Start instant, reading date and start time in the call's own zone.
    pub fn start_at(&self) -> Result<DateTime<Tz>> {
        Ok(calendar::zoned(self.date, self.start_time, self.tz()?))
    }

    /// End instant. An end time at or before the start time is on the next day.
    pub fn end_at(&self) -> Result<DateTime<Tz>> {
        let end_date = if self.end_time <= self.start_time {
            self.date + Duration::days(1)
        } else {
            self.date
        };
        Ok(calendar::zoned(end_date, self.end_time, self.tz()?))
    }

    /// Teacher first, then students.
    pub fn participants(&self) -> Vec<String> {
        std::iter::once(self.teacher_id.clone())
            .chain(self.student_ids.iter().cloned())
            .collect()
    }

    pub fn ensure_active(&self, action: &'static str) -> Result<()> {
        if self.status.is_active() {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition {
                instance_id: self.id,
                from: self.status.to_string(),
                action,
            })
        }
    }

    fn snapshot_previous(&mut self) {
        self.previous_date = Some(self.date);
        self.previous_start_time = Some(self.start_time);
        self.previous_end_time = Some(self.end_time);
    }

    /// Move a single call to a new slot. The call must re-earn its reminders.
    #[allow(clippy::too_many_arguments)]
    pub fn reschedule(
        &mut self,
        date: NaiveDate,
        start_time: NaiveTime,
        timezone: &str,
        meeting: Option<MeetingDetails>,
        days: WeekdaySet,
        repeat: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_active("reschedule")?;
        calendar::parse_timezone(timezone)?;
        self.snapshot_previous();
        self.date = date;
        self.start_time = start_time;
        self.end_time = calendar::end_time(start_time, self.call_duration).0;
        self.timezone = timezone.to_string();
        if let Some(meeting) = meeting {
            self.meeting = meeting;
        }
        self.days = if repeat { days } else { WeekdaySet::default() };
        self.repeat = repeat;
        self.status = CallStatus::Rescheduled;
        self.notification_sent.clear();
        self.updated_at = now;
        Ok(())
    }

    /// Slide this call to `date` as part of a cascade, keeping its time of day.
    pub fn shift_to(&mut self, date: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active("shift")?;
        self.snapshot_previous();
        self.date = date;
        self.status = CallStatus::Rescheduled;
        self.notification_sent.clear();
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active("cancel")?;
        self.snapshot_previous();
        self.status = CallStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active("complete")?;
        self.status = CallStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// Record a reminder bucket. Returns false if it was already recorded.
    pub fn mark_notified(&mut self, bucket: TimingBucket, now: DateTime<Utc>) -> bool {
        let inserted = self.notification_sent.insert(bucket);
        if inserted {
            self.updated_at = now;
        }
        inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DayOfWeek;
    use chrono::TimeZone;

    fn template() -> CallTemplate {
        CallTemplate {
            teacher_id: "t-1".to_string(),
            course_id: "course-1".to_string(),
            batch_id: "batch-1".to_string(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            timezone: "Asia/Kolkata".to_string(),
            call_duration: 40,
            days: WeekdaySet::new([DayOfWeek::Monday, DayOfWeek::Wednesday]),
            repeat: true,
            meeting: MeetingDetails::external("https://meet.example.com/abc"),
            student_ids: vec!["s-1".to_string(), "s-2".to_string()],
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 12, 20, 0, 0, 0).unwrap()
    }

    fn call() -> CallInstance {
        template().instantiate("l1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), now())
    }

    #[test]
    fn test_instantiate_derives_end_time() {
        let call = call();
        assert_eq!(call.status, CallStatus::Scheduled);
        assert_eq!(call.end_time, NaiveTime::from_hms_opt(10, 40, 0).unwrap());
        assert!(call.notification_sent.is_empty());
        assert_eq!(call.participants(), vec!["t-1", "s-1", "s-2"]);
    }

    #[test]
    fn test_instantiate_without_repeat_drops_days() {
        let mut template = template();
        template.repeat = false;
        let call = template.instantiate("l1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), now());
        assert!(call.days.is_empty());
        assert!(!call.repeat);
    }

    #[test]
    fn test_end_at_rolls_over() {
        let mut template = template();
        template.start_time = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        template.timezone = "UTC".to_string();
        let call = template.instantiate("l1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), now());
        assert_eq!(call.end_at().unwrap().to_rfc3339(), "2024-01-02T00:10:00+00:00");
    }

    #[test]
    fn test_reschedule_snapshots_and_clears_ledger() {
        let mut call = call();
        call.mark_notified(TimingBucket::OneDay, now());
        call.reschedule(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            NaiveTime::from_hms_opt(18, 15, 0).unwrap(),
            "Europe/London",
            None,
            WeekdaySet::new([DayOfWeek::Friday]),
            true,
            now(),
        )
        .unwrap();

        assert_eq!(call.status, CallStatus::Rescheduled);
        assert_eq!(call.previous_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(call.previous_start_time, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(call.previous_end_time, NaiveTime::from_hms_opt(10, 40, 0));
        assert_eq!(call.end_time, NaiveTime::from_hms_opt(18, 55, 0).unwrap());
        assert_eq!(call.timezone, "Europe/London");
        assert!(call.notification_sent.is_empty());
    }

    #[test]
    fn test_reschedule_rejects_bad_timezone() {
        let mut call = call();
        let result = call.reschedule(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            "Mars/Olympus",
            None,
            WeekdaySet::default(),
            false,
            now(),
        );
        assert!(result.is_err());
        assert_eq!(call.status, CallStatus::Scheduled);
        assert!(call.previous_date.is_none());
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut call = call();
        call.cancel(now()).unwrap();
        assert_eq!(call.status, CallStatus::Cancelled);

        assert!(matches!(
            call.complete(now()),
            Err(SchedulerError::InvalidTransition { action: "complete", .. })
        ));
        assert!(call.cancel(now()).is_err());
        assert!(call.shift_to(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), now()).is_err());
        assert_eq!(call.status, CallStatus::Cancelled);
    }

    #[test]
    fn test_completed_cannot_be_rescheduled() {
        let mut call = call();
        call.complete(now()).unwrap();
        let result = call.reschedule(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            "UTC",
            None,
            WeekdaySet::default(),
            false,
            now(),
        );
        assert!(matches!(result, Err(SchedulerError::InvalidTransition { .. })));
    }

    #[test]
    fn test_mark_notified_once() {
        let mut call = call();
        assert!(call.mark_notified(TimingBucket::OneHour, now()));
        assert!(!call.mark_notified(TimingBucket::OneHour, now()));
        assert_eq!(call.notification_sent.len(), 1);
    }

    #[test]
    fn test_bucket_windows() {
        assert_eq!(TimingBucket::due(1440).collect::<Vec<_>>(), vec![TimingBucket::OneDay]);
        assert_eq!(TimingBucket::due(62).collect::<Vec<_>>(), vec![TimingBucket::OneHour]);
        assert_eq!(TimingBucket::due(28).collect::<Vec<_>>(), vec![TimingBucket::ThirtyMinutes]);
        assert_eq!(TimingBucket::due(7).collect::<Vec<_>>(), vec![TimingBucket::TenMinutes]);
        assert_eq!(TimingBucket::due(45).count(), 0);
        assert_eq!(TimingBucket::due(-5).count(), 0);
    }

    #[test]
    fn test_serialized_shape() {
        let mut call = call();
        call.mark_notified(TimingBucket::ThirtyMinutes, now());
        let json = serde_json::to_value(&call).unwrap();

        assert_eq!(json["start_time"], "10:00");
        assert_eq!(json["end_time"], "10:40");
        assert_eq!(json["status"], "scheduled");
        assert_eq!(json["notification_sent"], serde_json::json!(["30min"]));
        assert_eq!(json["days"], serde_json::json!(["monday", "wednesday"]));
        assert_eq!(json["meeting"]["meeting_type"], "external");
    }
}
