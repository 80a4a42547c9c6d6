use crate::commands::build_service;
use crate::config::Context;
use crate::daemon::{SweepScheduler, shutdown_signal};
use crate::error::SchedulerError;
use crate::output::print_success;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// `--now` as an RFC 3339 instant, or the current time.
fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>, SchedulerError> {
    match now {
        None => Ok(Utc::now()),
        Some(value) => DateTime::parse_from_rfc3339(value.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                SchedulerError::validation("now", format!("'{}' is not an RFC 3339 instant: {}", value, e))
            }),
    }
}

pub async fn reminders(ctx: &Context, now: Option<&str>) -> Result<()> {
    let now = parse_now(now)?;
    let service = build_service(ctx)?;
    let sent = service.run_reminder_sweep(now).await?;
    print_success(&format!("Sent {} reminder(s)", sent));
    Ok(())
}

pub async fn status(ctx: &Context, now: Option<&str>) -> Result<()> {
    let now = parse_now(now)?;
    let service = build_service(ctx)?;
    let completed = service.run_status_sweep(now).await?;
    print_success(&format!("Completed {} call(s)", completed));
    Ok(())
}

/// Run both sweeps on their cron schedules until Ctrl-C or SIGTERM.
///
/// The catalog is read once at startup; restart after `catalog import`.
pub async fn daemon(ctx: &Context) -> Result<()> {
    let service = Arc::new(build_service(ctx)?);
    let scheduler = SweepScheduler::new(
        service,
        &ctx.config.reminder_schedule,
        &ctx.config.status_schedule,
    )?;
    tracing::info!(
        reminders = %ctx.config.reminder_schedule,
        status = %ctx.config.status_schedule,
        "Starting daemon"
    );
    scheduler.run(shutdown_signal()).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_now() {
        let now = parse_now(Some("2024-01-01T10:30:00+05:30")).unwrap();
        assert_eq!(now, Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap());
        assert!(parse_now(None).is_ok());
        assert!(matches!(
            parse_now(Some("tomorrow")),
            Err(SchedulerError::Validation { .. })
        ));
    }
}
