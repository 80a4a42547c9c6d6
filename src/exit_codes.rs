//! Process exit codes, so scripts can tell failures apart.

use crate::error::SchedulerError;

/// Command completed successfully.
pub const SUCCESS: i32 = 0;

/// Invalid input: bad date, time, timezone, role or reference.
pub const USAGE: i32 = 2;

/// A call, batch, course or user does not exist.
pub const NOT_FOUND: i32 = 3;

/// Meeting provider or webhook unreachable or failing.
pub const NETWORK: i32 = 4;

/// The call changed underneath us or the data directory is locked.
pub const CONFLICT: i32 = 5;

/// The schedule cannot be laid out or the cascade cannot run.
pub const SCHEDULING: i32 = 6;

/// Anything else.
pub const INTERNAL: i32 = 7;

fn from_scheduler_error(err: &SchedulerError) -> i32 {
    match err {
        SchedulerError::Validation { .. } => USAGE,
        SchedulerError::NotFound { .. } => NOT_FOUND,
        SchedulerError::ExternalService { .. } | SchedulerError::Network(_) => NETWORK,
        SchedulerError::Conflict { .. } | SchedulerError::LockFailed => CONFLICT,
        SchedulerError::NoLessonsAvailable { .. }
        | SchedulerError::InsufficientScheduleWindow { .. }
        | SchedulerError::NoRecurrencePattern { .. }
        | SchedulerError::ChainNotFound { .. }
        | SchedulerError::NoAvailableSlot { .. }
        | SchedulerError::InvalidTransition { .. } => SCHEDULING,
        _ => INTERNAL,
    }
}

/// Convert an anyhow::Error to an exit code.
pub fn from_error(err: &anyhow::Error) -> i32 {
    if let Some(scheduler_err) = err.downcast_ref::<SchedulerError>() {
        return from_scheduler_error(scheduler_err);
    }

    let msg = err.to_string().to_lowercase();
    if msg.contains("not found") {
        NOT_FOUND
    } else if msg.contains("timeout") || msg.contains("connection") || msg.contains("network") {
        NETWORK
    } else if msg.contains("usage") || msg.contains("argument") || msg.contains("invalid") {
        USAGE
    } else {
        INTERNAL
    }
}
