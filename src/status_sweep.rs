//! Flip calls whose end has passed to `Completed`.

use crate::call::{CallInstance, CallStatus};
use crate::catalog::Catalog;
use crate::error::{Result, SchedulerError};
use crate::notify::{Message, Notifier, TemplateKind};
use crate::store::CallStore;
use chrono::{DateTime, Duration, Utc};

/// True once the call's end instant, in its own timezone, is strictly before `now`.
pub fn has_ended(call: &CallInstance, now: DateTime<Utc>) -> Result<bool> {
    Ok(call.end_at()?.with_timezone(&Utc) < now)
}

/// Complete one call against its stored state. `None` if someone else got there first.
fn complete(store: &dyn CallStore, call: &CallInstance, now: DateTime<Utc>) -> Result<Option<CallInstance>> {
    let mut fresh = store.get(call.id)?;
    if !fresh.status.is_active() || !has_ended(&fresh, now)? {
        return Ok(None);
    }
    fresh.complete(now)?;
    match store.update(&fresh) {
        Ok(stored) => Ok(Some(stored)),
        Err(SchedulerError::Conflict { .. }) => {
            tracing::debug!(instance_id = %call.id, "Call changed under the status sweep, leaving it for the next tick");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// One status tick. Returns the number of calls completed.
pub async fn run_status_sweep(
    store: &dyn CallStore,
    catalog: &Catalog,
    notifier: &Notifier,
    now: DateTime<Utc>,
) -> Result<usize> {
    // Local dates east of UTC run up to a day ahead of the UTC date
    let cutoff = now.date_naive() + Duration::days(1);
    let candidates = store.find_by_status_and_date_range(&CallStatus::ACTIVE, None, Some(cutoff))?;

    let mut completed = 0;
    for call in &candidates {
        match has_ended(call, now) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(instance_id = %call.id, "Skipping call with unusable time: {}", e);
                continue;
            }
        }

        match complete(store, call, now) {
            Ok(Some(done)) => {
                completed += 1;
                tracing::info!(instance_id = %done.id, batch_id = %done.batch_id, "Call completed");
                let users = catalog.participants(&done);
                notifier
                    .fan_out(&users, TemplateKind::CallCompleted, &Message::completed(&done))
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(instance_id = %call.id, "Failed to complete call: {}", e);
            }
        }
    }
    Ok(completed)
}
