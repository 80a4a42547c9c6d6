use crate::calendar::{self, WeekdaySet};
use crate::cli::{CreateScheduleArgs, MeetingArgs, OutputFormat, RescheduleArgs};
use crate::commands::{build_service, create_spinner, is_interactive};
use crate::config::Context;
use crate::error::SchedulerError;
use crate::meeting::MeetingInput;
use crate::output::{print_calls, print_info, print_single, print_success, print_warning};
use crate::service::{CreateScheduleRequest, RescheduleRequest};
use anyhow::{Context as _, Result};
use dialoguer::Confirm;
use std::str::FromStr;
use uuid::Uuid;

fn meeting_input(args: &MeetingArgs) -> Option<MeetingInput> {
    match (&args.link, args.zoom) {
        (Some(link), _) => Some(MeetingInput::External { link: link.clone() }),
        (None, true) => Some(MeetingInput::Zoom),
        (None, false) => None,
    }
}

pub async fn create(ctx: &Context, args: CreateScheduleArgs) -> Result<()> {
    let meeting = meeting_input(&args.meeting).ok_or_else(|| {
        SchedulerError::validation("meeting", "pass --zoom or --link <URL>")
    })?;
    let request = CreateScheduleRequest {
        batch_id: args.batch,
        course_id: args.course,
        meeting,
        start_date: calendar::parse_date(&args.start_date)?,
        start_time: calendar::parse_time(&args.start_time)?,
        days: WeekdaySet::from_str(&args.days)?,
        repeat: args.repeat,
        call_duration: args.duration,
        timezone: args.tz,
        lesson_ids: args.lessons,
    };

    let service = build_service(ctx)?;
    let spinner = create_spinner("Creating schedule...");
    let result = service.create_schedule(&request).await;
    spinner.finish_and_clear();
    let calls = result.context("Failed to create schedule")?;

    if ctx.output_format() != OutputFormat::Table {
        return print_calls(ctx, &calls);
    }
    print_success(&format!(
        "Scheduled {} call(s) for batch '{}'",
        calls.len(),
        request.batch_id
    ));
    let dates: Vec<_> = calls.iter().map(|c| c.date).collect();
    print_info(&format!("Spans {}", calendar::human_duration(&dates)));
    print_calls(ctx, &calls)
}

pub async fn reschedule(ctx: &Context, args: RescheduleArgs) -> Result<()> {
    let request = RescheduleRequest {
        instance_id: args.id,
        lesson_id: args.lesson,
        meeting: meeting_input(&args.meeting),
        use_existing_link: args.keep_link,
        start_date: calendar::parse_date(&args.date)?,
        start_time: calendar::parse_time(&args.time)?,
        timezone: args.tz,
        days: args.days.as_deref().map(WeekdaySet::from_str).transpose()?,
        repeat: args.repeat,
    };

    let service = build_service(ctx)?;
    let call = service.reschedule_instance(&request).await?;

    if ctx.output_format() != OutputFormat::Table {
        return print_single(ctx, &call);
    }
    print_success(&format!(
        "Call {} moved to {} {} ({})",
        call.id,
        call.date,
        call.start_time.format("%H:%M"),
        call.timezone
    ));
    Ok(())
}

pub async fn cancel(ctx: &Context, id: Uuid, lesson: &str, yes: bool) -> Result<()> {
    let service = build_service(ctx)?;

    if !yes {
        if !is_interactive() {
            return Err(SchedulerError::validation(
                "yes",
                "refusing to cancel without confirmation; pass --yes",
            )
            .into());
        }
        let call = service.get(id)?;
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Cancel lesson '{}' on {} and shift the rest of batch '{}'?",
                call.lesson_id, call.date, call.batch_id
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            print_info("Cancelled by user");
            return Ok(());
        }
    }

    let outcome = service.cancel_instance(id, lesson).await?;

    if ctx.output_format() != OutputFormat::Table {
        return print_single(ctx, &outcome);
    }

    print_success(&format!(
        "Cancelled {} and rescheduled lesson '{}' to {}",
        outcome.cancelled.id, outcome.rescheduled.lesson_id, outcome.rescheduled.date
    ));
    if !outcome.shifted.is_empty() {
        print_info(&format!("Shifted {} later call(s)", outcome.shifted.len()));
        print_calls(ctx, &outcome.shifted)?;
    }
    if !outcome.skipped.is_empty() {
        print_warning(&format!(
            "{} call(s) could not be shifted and kept their dates",
            outcome.skipped.len()
        ));
    }
    Ok(())
}

pub fn list(ctx: &Context, batch: &str) -> Result<()> {
    let service = build_service(ctx)?;
    let mut calls = service.list_batch(batch)?;
    calls.sort_by_key(|c| (c.date, c.start_time));
    print_calls(ctx, &calls)
}

pub fn show(ctx: &Context, id: Uuid) -> Result<()> {
    let service = build_service(ctx)?;
    let call = service.get(id)?;
    print_single(ctx, &call)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_input() {
        let args = MeetingArgs {
            zoom: false,
            link: Some("https://meet.example.com/x".to_string()),
        };
        assert_eq!(
            meeting_input(&args),
            Some(MeetingInput::External {
                link: "https://meet.example.com/x".to_string()
            })
        );

        let args = MeetingArgs {
            zoom: true,
            link: None,
        };
        assert_eq!(meeting_input(&args), Some(MeetingInput::Zoom));
        assert_eq!(meeting_input(&MeetingArgs::default()), None);
    }
}
