//! Calendar arithmetic for lesson schedules.
//!
//! Everything here is pure: weekday-pattern scanning, coarse duration labels,
//! `HH:mm` handling and resolving a local date/time in an IANA zone.

use crate::error::{Result, SchedulerError};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Upper bound on day-by-day scanning when looking for the next free slot.
pub const MAX_SLOT_ATTEMPTS: u32 = 365 * 2;

/// Days scanned forward from the start date when generating a schedule.
pub const SCHEDULE_WINDOW_DAYS: u32 = 365;

/// A weekday name as it appears in requests and stored documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    #[serde(alias = "mon", alias = "Monday")]
    Monday,
    #[serde(alias = "tue", alias = "Tuesday")]
    Tuesday,
    #[serde(alias = "wed", alias = "Wednesday")]
    Wednesday,
    #[serde(alias = "thu", alias = "Thursday")]
    Thursday,
    #[serde(alias = "fri", alias = "Friday")]
    Friday,
    #[serde(alias = "sat", alias = "Saturday")]
    Saturday,
    #[serde(alias = "sun", alias = "Sunday")]
    Sunday,
}

impl From<chrono::Weekday> for DayOfWeek {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mon" | "monday" => Ok(Self::Monday),
            "tue" | "tues" | "tuesday" => Ok(Self::Tuesday),
            "wed" | "wednesday" => Ok(Self::Wednesday),
            "thu" | "thurs" | "thursday" => Ok(Self::Thursday),
            "fri" | "friday" => Ok(Self::Friday),
            "sat" | "saturday" => Ok(Self::Saturday),
            "sun" | "sunday" => Ok(Self::Sunday),
            other => Err(SchedulerError::validation(
                "days",
                format!("'{}' is not a weekday name", other),
            )),
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        };
        f.write_str(name)
    }
}

/// The set of weekdays a recurring chain follows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(BTreeSet<DayOfWeek>);

impl WeekdaySet {
    pub fn new(days: impl IntoIterator<Item = DayOfWeek>) -> Self {
        Self(days.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, day: chrono::Weekday) -> bool {
        self.0.contains(&DayOfWeek::from(day))
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.contains(date.weekday())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DayOfWeek> {
        self.0.iter()
    }
}

impl FromStr for WeekdaySet {
    type Err = SchedulerError;

    /// Parse a comma-separated list such as `mon,wed` or `Monday, Friday`.
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(DayOfWeek::from_str)
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&names.join(", "))
    }
}

/// First date strictly after `from_exclusive` whose weekday is in `days`.
///
/// Scans one day at a time for at most `max_attempts` days. Returns `None`
/// when the set is empty or nothing matches inside the budget.
pub fn next_matching_weekday(
    from_exclusive: NaiveDate,
    days: &WeekdaySet,
    max_attempts: u32,
) -> Option<NaiveDate> {
    if days.is_empty() {
        return None;
    }
    let mut candidate = from_exclusive;
    for _ in 0..max_attempts {
        candidate = candidate.succ_opt()?;
        if days.matches(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Lazily yield up to `count` dates from `start` (inclusive) whose weekday is
/// in `days`, looking no further than `window_days` calendar days ahead.
///
/// A short result means the window could not supply `count` dates; callers
/// treat that as an error rather than scheduling a partial chain.
pub fn generate_dates(
    start: NaiveDate,
    days: &WeekdaySet,
    window_days: u32,
    count: usize,
) -> impl Iterator<Item = NaiveDate> + '_ {
    start
        .iter_days()
        .take(window_days as usize)
        .filter(move |date| days.matches(*date))
        .take(count)
}

/// Coarse label for how long a run of dates spans.
pub fn human_duration(dates: &[NaiveDate]) -> String {
    let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
        return "1 day".to_string();
    };
    let span = (*last - *first).num_days();
    if dates.len() <= 1 || span == 0 {
        "1 day".to_string()
    } else if span <= 7 {
        "1 week".to_string()
    } else if span <= 14 {
        "2 weeks".to_string()
    } else if span <= 21 {
        "3 weeks".to_string()
    } else if span <= 30 {
        "1 month".to_string()
    } else {
        let months = (span + 29) / 30;
        format!("{} months", months)
    }
}

/// Format a minute count as `1hr 30min`, `2hr`, `45min` or `0 min`.
pub fn format_minutes(total_minutes: u32) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    match (hours, minutes) {
        (0, 0) => "0 min".to_string(),
        (h, 0) => format!("{}hr", h),
        (0, m) => format!("{}min", m),
        (h, m) => format!("{}hr {}min", h, m),
    }
}

fn time_regex() -> &'static Regex {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    TIME_RE.get_or_init(|| {
        Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("static time regex is valid")
    })
}

/// Parse a strict 24-hour `HH:mm` string.
pub fn parse_time(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    let caps = time_regex().captures(value).ok_or_else(|| {
        SchedulerError::validation("start_time", format!("'{}' is not in HH:mm format", value))
    })?;
    let hour: u32 = caps[1]
        .parse()
        .map_err(|_| SchedulerError::validation("start_time", value))?;
    let minute: u32 = caps[2]
        .parse()
        .map_err(|_| SchedulerError::validation("start_time", value))?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| SchedulerError::validation("start_time", value))
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        SchedulerError::validation("start_date", format!("'{}' is not in YYYY-MM-DD format", value))
    })
}

/// Validate an IANA timezone string.
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse::<Tz>().map_err(|_| {
        SchedulerError::validation(
            "timezone",
            format!(
                "'{}' is not an IANA timezone such as 'America/New_York' or 'Asia/Kolkata'",
                tz
            ),
        )
    })
}

/// Validate a call length: positive and shorter than a day, so the end is
/// always after the start (possibly on the following day).
pub fn validate_call_duration(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes >= 24 * 60 {
        return Err(SchedulerError::validation(
            "call_duration",
            format!("{} minutes must be between 1 and 1439", minutes),
        ));
    }
    Ok(())
}

/// End time of a call, and whether it lands on the following calendar day.
pub fn end_time(start: NaiveTime, call_duration_minutes: u32) -> (NaiveTime, bool) {
    let (end, overflow_secs) =
        start.overflowing_add_signed(Duration::minutes(i64::from(call_duration_minutes)));
    (end, overflow_secs != 0)
}

/// Resolve a wall-clock date and time in `tz` to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times that do
/// not exist (DST spring-forward gap) are pushed one hour later.
pub fn zoned(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Tz> {
    let naive = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        }
    }
}
