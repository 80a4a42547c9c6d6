//! Reminder window engine.
//!
//! Each tick looks at every active call near today and works out how many
//! minutes remain until it starts, in the call's own timezone. A bucket
//! whose window contains that number and that is not yet in the call's
//! ledger is dispatched and then recorded.
//!
//! Recording happens after dispatch, against a fresh read with a version
//! check. Two sweeps running at the same moment in different processes can
//! therefore both dispatch the same bucket before either records it. One
//! sweep per data directory never double-sends. A call that moved to a new
//! slot while its reminder was going out keeps an empty ledger for that slot.

use crate::call::{CallInstance, CallStatus, TimingBucket};
use crate::catalog::Catalog;
use crate::error::{Result, SchedulerError};
use crate::notify::{Message, Notifier, TemplateKind};
use crate::store::CallStore;
use chrono::{DateTime, Duration, Utc};

/// How many times a lost version race is retried when recording a bucket.
const RECORD_ATTEMPTS: usize = 3;

/// Minutes from `now` until the call starts. Negative once it has started.
pub fn minutes_until_start(call: &CallInstance, now: DateTime<Utc>) -> Result<i64> {
    let start = call.start_at()?.with_timezone(&Utc);
    Ok((start - now).num_minutes())
}

/// Buckets due for `call` at `now` and not yet sent.
pub fn pending_buckets(call: &CallInstance, now: DateTime<Utc>) -> Result<Vec<TimingBucket>> {
    let diff = minutes_until_start(call, now)?;
    Ok(TimingBucket::due(diff)
        .filter(|bucket| !call.notification_sent.contains(bucket))
        .collect())
}

fn same_slot(a: &CallInstance, b: &CallInstance) -> bool {
    a.date == b.date && a.start_time == b.start_time && a.timezone == b.timezone
}

/// Add `bucket` to the stored ledger of the call the reminder was sent for.
///
/// Returns false when the call is no longer active, has moved to another
/// slot since `sent_for` was read, already has the bucket, or every attempt
/// lost a version race.
pub fn record_bucket(
    store: &dyn CallStore,
    sent_for: &CallInstance,
    bucket: TimingBucket,
    now: DateTime<Utc>,
) -> Result<bool> {
    let id = sent_for.id;
    for _ in 0..RECORD_ATTEMPTS {
        let mut fresh = store.get(id)?;
        if !same_slot(&fresh, sent_for) {
            tracing::debug!(instance_id = %id, bucket = %bucket, "Call moved while reminding, not recording");
            return Ok(false);
        }
        if !fresh.status.is_active() || !fresh.mark_notified(bucket, now) {
            return Ok(false);
        }
        match store.update(&fresh) {
            Ok(_) => return Ok(true),
            Err(SchedulerError::Conflict { .. }) => {
                tracing::debug!(instance_id = %id, bucket = %bucket, "Lost version race, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    tracing::warn!(instance_id = %id, bucket = %bucket, "Could not record reminder after retries");
    Ok(false)
}

async fn remind(
    store: &dyn CallStore,
    catalog: &Catalog,
    notifier: &Notifier,
    call: &CallInstance,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut delivered = 0;
    for bucket in pending_buckets(call, now)? {
        let users = catalog.participants(call);
        let message = Message::reminder(call, bucket);
        let sent = notifier
            .fan_out(&users, TemplateKind::Reminder(bucket), &message)
            .await;
        delivered += sent;

        if record_bucket(store, call, bucket, now)? {
            tracing::info!(
                instance_id = %call.id,
                batch_id = %call.batch_id,
                bucket = %bucket,
                delivered = sent,
                "Reminder sent"
            );
        }
    }
    Ok(delivered)
}

/// One reminder tick. Returns the number of notifications delivered.
///
/// A failing call is logged and does not stop the others.
pub async fn run_reminder_sweep(
    store: &dyn CallStore,
    catalog: &Catalog,
    notifier: &Notifier,
    now: DateTime<Utc>,
) -> Result<usize> {
    // The widest window is a day; timezones shift local dates by up to a day either way
    let today = now.date_naive();
    let candidates = store.find_by_status_and_date_range(
        &CallStatus::ACTIVE,
        Some(today - Duration::days(1)),
        Some(today + Duration::days(2)),
    )?;
    tracing::debug!(candidates = candidates.len(), "Reminder sweep");

    let mut delivered = 0;
    for call in &candidates {
        match remind(store, catalog, notifier, call, now).await {
            Ok(count) => delivered += count,
            Err(e) => {
                tracing::warn!(instance_id = %call.id, "Reminder failed: {}", e);
            }
        }
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WeekdaySet;
    use crate::call::{CallTemplate, MeetingDetails};
    use crate::catalog::{NotificationPreferences, Role, User};
    use crate::notify::{LogDispatcher, NotificationSink};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn call(timezone: &str) -> CallInstance {
        CallTemplate {
            teacher_id: "t-1".to_string(),
            course_id: "course-1".to_string(),
            batch_id: "batch-1".to_string(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            timezone: timezone.to_string(),
            call_duration: 40,
            days: WeekdaySet::default(),
            repeat: false,
            meeting: MeetingDetails::external("https://meet.example.com/x"),
            student_ids: vec!["s-1".to_string()],
        }
        .instantiate(
            "l1",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap(),
        )
    }

    fn catalog() -> Catalog {
        let user = |id: &str, role| User {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{}@example.com", id),
            phone: None,
            role,
            preferences: NotificationPreferences::default(),
        };
        Catalog {
            users: vec![user("t-1", Role::Teacher), user("s-1", Role::Student)],
            ..Default::default()
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_minutes_until_start_uses_call_timezone() {
        // 10:00 in Kolkata is 04:30 UTC
        let call = call("Asia/Kolkata");
        assert_eq!(minutes_until_start(&call, at(3, 30)).unwrap(), 60);
        assert_eq!(minutes_until_start(&call, at(5, 0)).unwrap(), -30);
    }

    #[test]
    fn test_pending_buckets_skip_sent() {
        let mut call = call("UTC");
        assert_eq!(pending_buckets(&call, at(9, 0)).unwrap(), vec![TimingBucket::OneHour]);
        call.mark_notified(TimingBucket::OneHour, at(9, 0));
        assert!(pending_buckets(&call, at(9, 1)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_fires_once_per_bucket() {
        let store = MemoryStore::new();
        let call = call("UTC");
        store.insert_many(std::slice::from_ref(&call)).unwrap();
        let notifier = Notifier::logging();
        let catalog = catalog();

        // teacher + student, in-app + email each
        let first = run_reminder_sweep(&store, &catalog, &notifier, at(9, 0)).await.unwrap();
        assert_eq!(first, 4);
        let again = run_reminder_sweep(&store, &catalog, &notifier, at(9, 0)).await.unwrap();
        assert_eq!(again, 0);
        let later_tick = run_reminder_sweep(&store, &catalog, &notifier, at(9, 2)).await.unwrap();
        assert_eq!(later_tick, 0);

        let stored = store.get(call.id).unwrap();
        assert_eq!(stored.notification_sent.len(), 1);
        assert!(stored.notification_sent.contains(&TimingBucket::OneHour));
    }

    #[tokio::test]
    async fn test_sweep_ignores_completed_calls() {
        let store = MemoryStore::new();
        let mut call = call("UTC");
        call.complete(at(0, 0)).unwrap();
        store.insert_many(std::slice::from_ref(&call)).unwrap();

        let fired = run_reminder_sweep(&store, &catalog(), &Notifier::logging(), at(9, 50))
            .await
            .unwrap();
        assert_eq!(fired, 0);
        assert!(store.get(call.id).unwrap().notification_sent.is_empty());
    }

    #[test]
    fn test_record_bucket_refuses_cancelled() {
        let store = MemoryStore::new();
        let call = call("UTC");
        store.insert_many(std::slice::from_ref(&call)).unwrap();

        let mut cancelled = store.get(call.id).unwrap();
        cancelled.cancel(at(0, 0)).unwrap();
        store.update(&cancelled).unwrap();

        assert!(!record_bucket(&store, &call, TimingBucket::OneDay, at(0, 0)).unwrap());
    }

    fn notifier_with(sink: Arc<dyn NotificationSink>) -> Notifier {
        Notifier::new(sink, Arc::new(LogDispatcher))
    }

    /// Moves the call a week later the first time anyone is notified.
    struct MovesCallOnNotify {
        store: Arc<MemoryStore>,
        call: CallInstance,
        moved: AtomicBool,
    }

    #[async_trait]
    impl NotificationSink for MovesCallOnNotify {
        async fn notify(&self, _user_id: &str, _message: &Message) -> Result<()> {
            if self.moved.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            let mut fresh = self.store.get(self.call.id)?;
            fresh.reschedule(
                NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                "UTC",
                None,
                WeekdaySet::default(),
                false,
                at(9, 0),
            )?;
            self.store.update(&fresh)?;
            Ok(())
        }
    }

    /// Fails in-app delivery for one user.
    struct FailsFor(&'static str);

    #[async_trait]
    impl NotificationSink for FailsFor {
        async fn notify(&self, user_id: &str, _message: &Message) -> Result<()> {
            if user_id == self.0 {
                return Err(SchedulerError::external("test", "unreachable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_call_moved_during_reminder_keeps_empty_ledger() {
        let store = Arc::new(MemoryStore::new());
        let call = call("UTC");
        store.insert_many(std::slice::from_ref(&call)).unwrap();
        let catalog = catalog();
        let notifier = notifier_with(Arc::new(MovesCallOnNotify {
            store: Arc::clone(&store),
            call: call.clone(),
            moved: AtomicBool::new(false),
        }));

        run_reminder_sweep(store.as_ref(), &catalog, &notifier, at(9, 0))
            .await
            .unwrap();
        let moved = store.get(call.id).unwrap();
        assert_eq!(moved.date, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert!(moved.notification_sent.is_empty());

        // The new slot earns its own 1hour reminder
        let a_week_later = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        let delivered = run_reminder_sweep(store.as_ref(), &catalog, &notifier, a_week_later)
            .await
            .unwrap();
        assert_eq!(delivered, 4);
        let stored = store.get(call.id).unwrap();
        assert!(stored.notification_sent.contains(&TimingBucket::OneHour));
    }

    #[tokio::test]
    async fn test_failed_delivery_still_records_bucket() {
        let store = MemoryStore::new();
        let call = call("UTC");
        store.insert_many(std::slice::from_ref(&call)).unwrap();
        let notifier = notifier_with(Arc::new(FailsFor("s-1")));

        let delivered = run_reminder_sweep(&store, &catalog(), &notifier, at(9, 0))
            .await
            .unwrap();

        assert_eq!(delivered, 3);
        let stored = store.get(call.id).unwrap();
        assert!(stored.notification_sent.contains(&TimingBucket::OneHour));
    }

    #[tokio::test]
    async fn test_broken_call_does_not_stop_the_tick() {
        let store = MemoryStore::new();
        let broken = call("Mars/Olympus_Mons");
        let healthy = call("UTC");
        store.insert_many(&[broken.clone(), healthy.clone()]).unwrap();

        let delivered = run_reminder_sweep(&store, &catalog(), &Notifier::logging(), at(9, 0))
            .await
            .unwrap();

        assert_eq!(delivered, 4);
        assert!(store.get(healthy.id).unwrap().notification_sent.contains(&TimingBucket::OneHour));
        assert!(store.get(broken.id).unwrap().notification_sent.is_empty());
    }
}
