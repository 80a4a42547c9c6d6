//! Cancel one call of a recurring chain and slide the tail forward.
//!
//! Planning is pure and happens before anything is written: if the target
//! cannot be cascaded it is not cancelled either. Placing the tail is
//! best-effort, and calls that cannot be placed are reported in
//! [`CascadePlan::skipped`].

use crate::calendar;
use crate::call::{CallInstance, CallStatus};
use crate::error::{Result, SchedulerError};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Statuses that keep a call in its chain for positioning purposes.
const CHAIN_STATUSES: [CallStatus; 3] = [
    CallStatus::Scheduled,
    CallStatus::Rescheduled,
    CallStatus::Cancelled,
];

#[derive(Debug, Clone)]
pub struct CascadePlan {
    /// The target in its cancelled form.
    pub cancelled: CallInstance,
    /// New call carrying the cancelled lesson to the next free slot.
    pub replacement: CallInstance,
    /// Later calls moved one pattern step forward, in chain order.
    pub shifted: Vec<CallInstance>,
    /// Later calls for which no slot was found.
    pub skipped: Vec<Uuid>,
}

/// The target's chain: same batch, still relevant, in date order.
pub fn chain_of<'a>(target: &CallInstance, batch_calls: &'a [CallInstance]) -> Vec<&'a CallInstance> {
    let mut chain: Vec<&CallInstance> = batch_calls
        .iter()
        .filter(|c| c.batch_id == target.batch_id && CHAIN_STATUSES.contains(&c.status))
        .collect();
    chain.sort_by(|a, b| {
        (a.date, a.start_time, a.created_at).cmp(&(b.date, b.start_time, b.created_at))
    });
    chain
}

pub fn plan_cascade(
    target: &CallInstance,
    batch_calls: &[CallInstance],
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<CascadePlan> {
    target.ensure_active("cancel")?;

    let days = &target.days;
    if days.is_empty() {
        return Err(SchedulerError::NoRecurrencePattern {
            instance_id: target.id,
        });
    }

    let chain = chain_of(target, batch_calls);
    let position = chain
        .iter()
        .position(|c| c.id == target.id)
        .ok_or_else(|| SchedulerError::ChainNotFound {
            instance_id: target.id,
            batch_id: target.batch_id.clone(),
        })?;

    let next_available = calendar::next_matching_weekday(target.date, days, max_attempts)
        .ok_or(SchedulerError::NoAvailableSlot {
            instance_id: target.id,
        })?;

    let mut cancelled = target.clone();
    cancelled.cancel(now)?;

    let mut replacement = target.template().instantiate(&target.lesson_id, next_available, now);
    replacement.status = CallStatus::Rescheduled;
    replacement.previous_date = Some(target.date);
    replacement.previous_start_time = Some(target.start_time);
    replacement.previous_end_time = Some(target.end_time);

    let mut shifted = Vec::new();
    let mut skipped = Vec::new();
    let mut cursor: NaiveDate = next_available;

    for call in &chain[position + 1..] {
        if !call.status.is_active() {
            tracing::debug!(instance_id = %call.id, "Leaving cancelled call out of the shift");
            continue;
        }
        match calendar::next_matching_weekday(cursor, days, max_attempts) {
            Some(date) => {
                let mut moved = (*call).clone();
                moved.shift_to(date, now)?;
                cursor = date;
                shifted.push(moved);
            }
            None => {
                tracing::warn!(
                    instance_id = %call.id,
                    batch_id = %call.batch_id,
                    after = %cursor,
                    "No slot found for subsequent call, leaving it in place"
                );
                skipped.push(call.id);
            }
        }
    }

    tracing::debug!(
        instance_id = %target.id,
        replacement_date = %next_available,
        shifted = shifted.len(),
        skipped = skipped.len(),
        "Planned cascade"
    );

    Ok(CascadePlan {
        cancelled,
        replacement,
        shifted,
        skipped,
    })
}
