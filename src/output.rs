use crate::call::{CallInstance, CallStatus};
use crate::cli::OutputFormat;
use crate::config::Context;
use console::{Style, style};
use serde::Serialize;
use tabled::{Table, Tabled};

/// One row of `schedule list`.
#[derive(Tabled, Serialize)]
pub struct CallRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Lesson")]
    pub lesson: String,
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Timezone")]
    pub timezone: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Reminders")]
    pub reminders: String,
}

impl From<&CallInstance> for CallRow {
    fn from(call: &CallInstance) -> Self {
        let reminders: Vec<&str> = call.notification_sent.iter().map(|b| b.as_str()).collect();
        Self {
            id: call.id.to_string(),
            lesson: call.lesson_id.clone(),
            date: call.date.format("%a %Y-%m-%d").to_string(),
            time: format!(
                "{}-{}",
                call.start_time.format("%H:%M"),
                call.end_time.format("%H:%M")
            ),
            timezone: call.timezone.clone(),
            status: format_status(call.status),
            reminders: if reminders.is_empty() {
                "-".to_string()
            } else {
                reminders.join(", ")
            },
        }
    }
}

/// Print data as a table
pub fn print_table<T: Tabled>(data: Vec<T>) {
    if data.is_empty() {
        println!("{}", style("No items found").dim());
        return;
    }
    let table = Table::new(data).to_string();
    println!("{}", table);
}

/// Print data as JSON
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(data)?;
    print!("{}", yaml);
    Ok(())
}

/// Print calls as a table, or the full instances as JSON/YAML.
pub fn print_calls(ctx: &Context, calls: &[CallInstance]) -> anyhow::Result<()> {
    match ctx.output_format() {
        OutputFormat::Table => print_table(calls.iter().map(CallRow::from).collect()),
        OutputFormat::Json => print_json(calls)?,
        OutputFormat::Yaml => print_yaml(calls)?,
    }
    Ok(())
}

/// Print a single item based on format preference
pub fn print_single<T: Serialize>(ctx: &Context, data: &T) -> anyhow::Result<()> {
    match ctx.output_format() {
        // No sensible table for a nested document
        OutputFormat::Table | OutputFormat::Yaml => print_yaml(data)?,
        OutputFormat::Json => print_json(data)?,
    }
    Ok(())
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", style("!").yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

pub fn status_style(status: CallStatus) -> Style {
    match status {
        CallStatus::Scheduled => Style::new().green(),
        CallStatus::Rescheduled => Style::new().cyan(),
        CallStatus::Completed => Style::new().dim(),
        CallStatus::Cancelled => Style::new().red(),
    }
}

/// Format a status with appropriate color
pub fn format_status(status: CallStatus) -> String {
    status_style(status).apply_to(status.as_str()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WeekdaySet;
    use crate::call::{CallTemplate, MeetingDetails, TimingBucket};
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    #[test]
    fn test_call_row() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut call = CallTemplate {
            teacher_id: "t-1".to_string(),
            course_id: "course-1".to_string(),
            batch_id: "batch-1".to_string(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            timezone: "UTC".to_string(),
            call_duration: 40,
            days: WeekdaySet::default(),
            repeat: false,
            meeting: MeetingDetails::external("https://meet.example.com/x"),
            student_ids: vec![],
        }
        .instantiate("l1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), now);
        call.mark_notified(TimingBucket::OneDay, now);
        call.mark_notified(TimingBucket::OneHour, now);

        let row = CallRow::from(&call);
        assert_eq!(row.lesson, "l1");
        assert_eq!(row.date, "Mon 2024-01-01");
        assert_eq!(row.time, "10:00-10:40");
        assert_eq!(row.reminders, "1day, 1hour");
        assert!(row.status.contains("scheduled"));
    }
}
