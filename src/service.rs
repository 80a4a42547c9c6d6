//! The scheduler's public operations, composed over the store, the catalog,
//! the meeting provider and the notifier.

use crate::calendar::{self, MAX_SLOT_ATTEMPTS, WeekdaySet};
use crate::call::CallInstance;
use crate::cascade;
use crate::catalog::{Catalog, Role, User};
use crate::error::{Result, SchedulerError};
use crate::generator::{self, ScheduleParams};
use crate::lessons;
use crate::meeting::{self, MeetingInput, MeetingProvider, MeetingRequest};
use crate::notify::{Message, Notifier, TemplateKind};
use crate::reminders;
use crate::status_sweep;
use crate::store::CallStore;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateScheduleRequest {
    pub batch_id: String,
    pub course_id: String,
    pub meeting: MeetingInput,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub days: WeekdaySet,
    pub repeat: bool,
    pub call_duration: u32,
    /// Falls back to the service default.
    pub timezone: Option<String>,
    pub lesson_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RescheduleRequest {
    pub instance_id: Uuid,
    pub lesson_id: String,
    /// New meeting, ignored when `use_existing_link` is set.
    pub meeting: Option<MeetingInput>,
    pub use_existing_link: bool,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Falls back to the call's current timezone.
    pub timezone: Option<String>,
    /// Falls back to the call's current weekdays.
    pub days: Option<WeekdaySet>,
    /// Falls back to whether the call currently repeats.
    pub repeat: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub cancelled: CallInstance,
    pub rescheduled: CallInstance,
    pub shifted: Vec<CallInstance>,
    pub skipped: Vec<Uuid>,
}

pub struct SchedulerService {
    store: Arc<dyn CallStore>,
    catalog: Catalog,
    meetings: Arc<dyn MeetingProvider>,
    notifier: Notifier,
    default_timezone: String,
    max_slot_attempts: u32,
}

impl SchedulerService {
    pub fn new(
        store: Arc<dyn CallStore>,
        catalog: Catalog,
        meetings: Arc<dyn MeetingProvider>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            catalog,
            meetings,
            notifier,
            default_timezone: "UTC".to_string(),
            max_slot_attempts: MAX_SLOT_ATTEMPTS,
        }
    }

    pub fn with_default_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.default_timezone = timezone.into();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &dyn CallStore {
        self.store.as_ref()
    }

    pub fn get(&self, instance_id: Uuid) -> Result<CallInstance> {
        self.store.get(instance_id)
    }

    pub fn list_batch(&self, batch_id: &str) -> Result<Vec<CallInstance>> {
        self.catalog.batch(batch_id)?;
        self.store.find_by_batch(batch_id)
    }

    fn teacher_of(&self, teacher_id: &str) -> Result<&User> {
        self.catalog.user_with_role(teacher_id, Role::Teacher)
    }

    /// The lesson must be the call's own and still part of the batch's effective list.
    fn ensure_lesson(&self, call: &CallInstance, lesson_id: &str) -> Result<()> {
        if call.lesson_id != lesson_id {
            return Err(SchedulerError::validation(
                "lesson_id",
                format!("call {} covers lesson '{}', not '{}'", call.id, call.lesson_id, lesson_id),
            ));
        }
        let batch = self.catalog.batch(&call.batch_id)?;
        let course = self.catalog.course(&call.course_id)?;
        let effective = lessons::resolve_lessons(batch, course, None)?;
        if !effective.contains(lesson_id) {
            return Err(SchedulerError::validation(
                "lesson_id",
                format!("lesson '{}' is no longer taught in batch '{}'", lesson_id, batch.id),
            ));
        }
        Ok(())
    }

    async fn announce(&self, call: &CallInstance, template: TemplateKind, message: Message, admins: bool) -> usize {
        let mut users = self.catalog.participants(call);
        if admins {
            users.extend(self.catalog.admins());
        }
        self.notifier.fan_out(&users, template, &message).await
    }

    /// Lay out, create the meeting for, persist and announce a batch schedule.
    ///
    /// Nothing is stored unless every instance can be placed and the meeting
    /// link was obtained.
    pub async fn create_schedule(&self, request: &CreateScheduleRequest) -> Result<Vec<CallInstance>> {
        let batch = self.catalog.batch(&request.batch_id)?;
        let course = self.catalog.course(&request.course_id)?;
        let teacher = self.teacher_of(&batch.teacher_id)?;
        let timezone = request
            .timezone
            .clone()
            .unwrap_or_else(|| self.default_timezone.clone());

        let params = ScheduleParams {
            start_date: request.start_date,
            start_time: request.start_time,
            days: request.days.clone(),
            repeat: request.repeat,
            call_duration: request.call_duration,
            timezone: timezone.clone(),
            lesson_ids: request.lesson_ids.clone(),
        };
        let plan = generator::plan_schedule(batch, course, &params)?;
        let span = plan.duration_label();
        let lesson_count = plan.dates.len();

        let meeting_request = MeetingRequest {
            topic: format!("{} - {}", course.title, batch.name),
            start: plan
                .first_date()
                .unwrap_or(request.start_date)
                .and_time(request.start_time),
            duration_minutes: request.call_duration,
            host_email: teacher.email.clone(),
            timezone,
        };
        let meeting = meeting::resolve_meeting(self.meetings.as_ref(), &request.meeting, &meeting_request).await?;

        let calls = plan.into_calls(meeting, Utc::now());
        self.store.insert_many(&calls)?;
        tracing::info!(
            batch_id = %batch.id,
            lessons = calls.len(),
            span = %span,
            "Created schedule"
        );

        for call in &calls {
            let message = Message::schedule_created(call, lesson_count, &span);
            self.announce(call, TemplateKind::ScheduleCreated, message, false).await;
        }
        Ok(calls)
    }

    /// Move one call to a new date and time.
    pub async fn reschedule_instance(&self, request: &RescheduleRequest) -> Result<CallInstance> {
        let mut call = self.store.get(request.instance_id)?;
        call.ensure_active("reschedule")?;
        self.ensure_lesson(&call, &request.lesson_id)?;

        let repeat = request.repeat.unwrap_or(call.repeat);
        let days = request.days.clone().unwrap_or_else(|| call.days.clone());
        if repeat && days.is_empty() {
            return Err(SchedulerError::validation(
                "days",
                "a repeating call needs at least one weekday",
            ));
        }
        let timezone = request
            .timezone
            .clone()
            .unwrap_or_else(|| call.timezone.clone());
        calendar::parse_timezone(&timezone)?;

        let meeting = match (&request.meeting, request.use_existing_link) {
            (Some(input), false) => {
                let teacher = self.teacher_of(&call.teacher_id)?;
                let meeting_request = MeetingRequest {
                    topic: format!("Lesson {}", call.lesson_id),
                    start: request.start_date.and_time(request.start_time),
                    duration_minutes: call.call_duration,
                    host_email: teacher.email.clone(),
                    timezone: timezone.clone(),
                };
                Some(meeting::resolve_meeting(self.meetings.as_ref(), input, &meeting_request).await?)
            }
            _ => None,
        };

        call.reschedule(
            request.start_date,
            request.start_time,
            &timezone,
            meeting,
            days,
            repeat,
            Utc::now(),
        )?;
        let stored = self.store.update(&call)?;
        tracing::info!(
            instance_id = %stored.id,
            batch_id = %stored.batch_id,
            date = %stored.date,
            "Rescheduled call"
        );

        self.announce(&stored, TemplateKind::CallRescheduled, Message::rescheduled(&stored), false)
            .await;
        Ok(stored)
    }

    /// Cancel one call and slide the rest of its chain forward.
    ///
    /// Every precondition is checked before the target is touched, and the
    /// target's cancellation lands in the same write as its replacement.
    /// Moving later calls is best-effort and failures end up in `skipped`.
    pub async fn cancel_instance(&self, instance_id: Uuid, lesson_id: &str) -> Result<CancelOutcome> {
        let target = self.store.get(instance_id)?;
        target.ensure_active("cancel")?;
        self.ensure_lesson(&target, lesson_id)?;

        let batch_calls = self.store.find_by_batch(&target.batch_id)?;
        let plan = cascade::plan_cascade(&target, &batch_calls, self.max_slot_attempts, Utc::now())?;

        let cancelled = self
            .store
            .cancel_with_replacement(&plan.cancelled, &plan.replacement)?;

        let mut shifted = Vec::with_capacity(plan.shifted.len());
        let mut skipped = plan.skipped;
        for call in &plan.shifted {
            match self.store.update(call) {
                Ok(stored) => shifted.push(stored),
                Err(e) => {
                    tracing::warn!(instance_id = %call.id, batch_id = %call.batch_id, "Could not shift call: {}", e);
                    skipped.push(call.id);
                }
            }
        }

        tracing::info!(
            instance_id = %cancelled.id,
            batch_id = %cancelled.batch_id,
            replacement = %plan.replacement.id,
            shifted = shifted.len(),
            skipped = skipped.len(),
            "Cancelled call and cascaded"
        );

        self.announce(&cancelled, TemplateKind::CallCancelled, Message::cancelled(&cancelled), true)
            .await;
        self.announce(
            &plan.replacement,
            TemplateKind::CallRescheduled,
            Message::rescheduled(&plan.replacement),
            true,
        )
        .await;
        for call in &shifted {
            self.announce(call, TemplateKind::CallShifted, Message::shifted(call), true)
                .await;
        }

        Ok(CancelOutcome {
            cancelled,
            rescheduled: plan.replacement,
            shifted,
            skipped,
        })
    }

    pub async fn run_reminder_sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        reminders::run_reminder_sweep(self.store.as_ref(), &self.catalog, &self.notifier, now).await
    }

    pub async fn run_status_sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        status_sweep::run_status_sweep(self.store.as_ref(), &self.catalog, &self.notifier, now).await
    }
}
