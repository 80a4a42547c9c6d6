//! Turn a weekly pattern and a lesson list into call drafts.
//!
//! Generation is split in two so the meeting link is only created once every
//! precondition has passed: [`plan_schedule`] validates and lays out dates,
//! then [`SchedulePlan::into_calls`] stamps out the instances.

use crate::calendar::{self, SCHEDULE_WINDOW_DAYS, WeekdaySet};
use crate::call::{CallInstance, CallTemplate, MeetingDetails};
use crate::error::{Result, SchedulerError};
use crate::lessons::{self, Batch, Course, EffectiveLessons};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Inputs that shape a schedule, independent of the meeting link.
#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub days: WeekdaySet,
    pub repeat: bool,
    pub call_duration: u32,
    pub timezone: String,
    pub lesson_ids: Option<Vec<String>>,
}

/// A validated schedule waiting for its meeting details.
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub lessons: EffectiveLessons,
    pub dates: Vec<NaiveDate>,
    template: CallTemplate,
}

/// Dates for `count` lessons.
///
/// Without `repeat` every lesson lands on `start`. With it the dates follow
/// `days` inside the schedule window and may come up short.
pub fn plan_dates(start: NaiveDate, days: &WeekdaySet, repeat: bool, count: usize) -> Vec<NaiveDate> {
    if repeat {
        calendar::generate_dates(start, days, SCHEDULE_WINDOW_DAYS, count).collect()
    } else {
        vec![start; count]
    }
}

pub fn plan_schedule(batch: &Batch, course: &Course, params: &ScheduleParams) -> Result<SchedulePlan> {
    if batch.course_id != course.id {
        return Err(SchedulerError::validation(
            "course_id",
            format!("batch '{}' belongs to course '{}', not '{}'", batch.id, batch.course_id, course.id),
        ));
    }
    calendar::validate_call_duration(params.call_duration)?;
    calendar::parse_timezone(&params.timezone)?;

    let lessons = lessons::resolve_lessons(batch, course, params.lesson_ids.as_deref())?;
    let needed = lessons.lessons.len();

    if !params.repeat && needed > 1 {
        tracing::warn!(
            batch_id = %batch.id,
            lessons = needed,
            date = %params.start_date,
            "Non-repeating schedule places every lesson on the start date"
        );
    }

    let dates = plan_dates(params.start_date, &params.days, params.repeat, needed);
    if dates.len() < needed {
        return Err(SchedulerError::InsufficientScheduleWindow {
            batch_id: batch.id.clone(),
            needed,
            found: dates.len(),
        });
    }

    let template = CallTemplate {
        teacher_id: batch.teacher_id.clone(),
        course_id: course.id.clone(),
        batch_id: batch.id.clone(),
        start_time: params.start_time,
        timezone: params.timezone.clone(),
        call_duration: params.call_duration,
        days: params.days.clone(),
        repeat: params.repeat,
        // Replaced in `into_calls`.
        meeting: MeetingDetails::external(String::new()),
        student_ids: batch.active_student_ids(),
    };

    Ok(SchedulePlan {
        lessons,
        dates,
        template,
    })
}

impl SchedulePlan {
    /// Coarse span of the schedule, e.g. "2 weeks".
    pub fn duration_label(&self) -> String {
        calendar::human_duration(&self.dates)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// One instance per lesson, all sharing `meeting`.
    pub fn into_calls(self, meeting: MeetingDetails, now: DateTime<Utc>) -> Vec<CallInstance> {
        let template = CallTemplate {
            meeting,
            ..self.template
        };
        self.lessons
            .lessons
            .iter()
            .zip(self.dates.iter())
            .map(|(lesson, date)| template.instantiate(&lesson.lesson_id, *date, now))
            .collect()
    }
}
