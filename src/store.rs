//! Call persistence.
//!
//! Updates are optimistic: the caller passes the instance it read, and the
//! write only lands if the stored `version` still matches. A sweep that lost
//! a race to a user edit gets `Conflict` and re-reads instead of overwriting.

use crate::call::{CallInstance, CallStatus};
use crate::error::{Result, SchedulerError};
use crate::lock::{self, DataLock};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const CALLS_FILE: &str = "calls.json";

pub trait CallStore: Send + Sync {
    /// Persist new instances. Ids must be unused.
    fn insert_many(&self, calls: &[CallInstance]) -> Result<()>;

    fn get(&self, id: Uuid) -> Result<CallInstance>;

    /// Every instance of a batch ordered by date, start time, then creation.
    fn find_by_batch(&self, batch_id: &str) -> Result<Vec<CallInstance>>;

    /// Instances in one of `statuses` whose date lies within the given bounds.
    fn find_by_status_and_date_range(
        &self,
        statuses: &[CallStatus],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<CallInstance>>;

    /// Replace the stored instance if its version equals `call.version`.
    /// Returns the stored copy with the bumped version.
    fn update(&self, call: &CallInstance) -> Result<CallInstance>;

    /// Version-checked update of `cancelled` and insert of `replacement` as
    /// one write. Either both land or neither does.
    fn cancel_with_replacement(
        &self,
        cancelled: &CallInstance,
        replacement: &CallInstance,
    ) -> Result<CallInstance>;

    fn all(&self) -> Result<Vec<CallInstance>>;
}

fn sort_for_display(calls: &mut [CallInstance]) {
    calls.sort_by(|a, b| {
        (a.date, a.start_time, a.created_at).cmp(&(b.date, b.start_time, b.created_at))
    });
}

fn insert_into(calls: &mut Vec<CallInstance>, new: &[CallInstance]) -> Result<()> {
    for call in new {
        if calls.iter().any(|c| c.id == call.id) {
            return Err(SchedulerError::validation(
                "id",
                format!("call {} already exists", call.id),
            ));
        }
    }
    calls.extend(new.iter().cloned());
    Ok(())
}

fn find_in(calls: &[CallInstance], id: Uuid) -> Result<CallInstance> {
    calls
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .ok_or_else(|| SchedulerError::not_found("Call", id.to_string()))
}

fn batch_in(calls: &[CallInstance], batch_id: &str) -> Vec<CallInstance> {
    let mut found: Vec<CallInstance> = calls
        .iter()
        .filter(|c| c.batch_id == batch_id)
        .cloned()
        .collect();
    sort_for_display(&mut found);
    found
}

fn status_range_in(
    calls: &[CallInstance],
    statuses: &[CallStatus],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Vec<CallInstance> {
    let mut found: Vec<CallInstance> = calls
        .iter()
        .filter(|c| statuses.contains(&c.status))
        .filter(|c| from.is_none_or(|from| c.date >= from))
        .filter(|c| to.is_none_or(|to| c.date <= to))
        .cloned()
        .collect();
    sort_for_display(&mut found);
    found
}

fn apply_update(calls: &mut [CallInstance], call: &CallInstance) -> Result<CallInstance> {
    let stored = calls
        .iter_mut()
        .find(|c| c.id == call.id)
        .ok_or_else(|| SchedulerError::not_found("Call", call.id.to_string()))?;

    if stored.version != call.version {
        return Err(SchedulerError::Conflict {
            instance_id: call.id,
            expected: call.version,
            found: stored.version,
        });
    }

    let mut next = call.clone();
    next.version = stored.version + 1;
    *stored = next.clone();
    Ok(next)
}

fn apply_cancel(
    calls: &mut Vec<CallInstance>,
    cancelled: &CallInstance,
    replacement: &CallInstance,
) -> Result<CallInstance> {
    if calls.iter().any(|c| c.id == replacement.id) {
        return Err(SchedulerError::validation(
            "id",
            format!("call {} already exists", replacement.id),
        ));
    }
    let stored = apply_update(calls, cancelled)?;
    calls.push(replacement.clone());
    Ok(stored)
}

/// Calls kept in `calls.json` under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CALLS_FILE)
    }

    fn load(&self) -> Result<Vec<CallInstance>> {
        match lock::read_optional(&self.path())? {
            Some(content) if !content.trim().is_empty() => Ok(serde_json::from_str(&content)?),
            _ => Ok(Vec::new()),
        }
    }

    fn save(&self, calls: &[CallInstance]) -> Result<()> {
        let content = serde_json::to_string_pretty(calls)?;
        lock::atomic_write(&self.path(), &content)
    }

    fn read<T>(&self, f: impl FnOnce(&[CallInstance]) -> Result<T>) -> Result<T> {
        let _lock = DataLock::acquire(&self.dir)?;
        let calls = self.load()?;
        f(&calls)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Vec<CallInstance>) -> Result<T>) -> Result<T> {
        let _lock = DataLock::acquire(&self.dir)?;
        let mut calls = self.load()?;
        let out = f(&mut calls)?;
        self.save(&calls)?;
        Ok(out)
    }
}

impl CallStore for FileStore {
    fn insert_many(&self, new: &[CallInstance]) -> Result<()> {
        self.write(|calls| insert_into(calls, new))
    }

    fn get(&self, id: Uuid) -> Result<CallInstance> {
        self.read(|calls| find_in(calls, id))
    }

    fn find_by_batch(&self, batch_id: &str) -> Result<Vec<CallInstance>> {
        self.read(|calls| Ok(batch_in(calls, batch_id)))
    }

    fn find_by_status_and_date_range(
        &self,
        statuses: &[CallStatus],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<CallInstance>> {
        self.read(|calls| Ok(status_range_in(calls, statuses, from, to)))
    }

    fn update(&self, call: &CallInstance) -> Result<CallInstance> {
        self.write(|calls| apply_update(calls, call))
    }

    fn cancel_with_replacement(
        &self,
        cancelled: &CallInstance,
        replacement: &CallInstance,
    ) -> Result<CallInstance> {
        self.write(|calls| apply_cancel(calls, cancelled, replacement))
    }

    fn all(&self) -> Result<Vec<CallInstance>> {
        self.read(|calls| {
            let mut all = calls.to_vec();
            sort_for_display(&mut all);
            Ok(all)
        })
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    calls: Mutex<Vec<CallInstance>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> MutexGuard<'_, Vec<CallInstance>> {
        // A panic mid-update cannot leave a half-written instance behind
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CallStore for MemoryStore {
    fn insert_many(&self, new: &[CallInstance]) -> Result<()> {
        insert_into(&mut self.calls(), new)
    }

    fn get(&self, id: Uuid) -> Result<CallInstance> {
        find_in(&self.calls(), id)
    }

    fn find_by_batch(&self, batch_id: &str) -> Result<Vec<CallInstance>> {
        Ok(batch_in(&self.calls(), batch_id))
    }

    fn find_by_status_and_date_range(
        &self,
        statuses: &[CallStatus],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<CallInstance>> {
        Ok(status_range_in(&self.calls(), statuses, from, to))
    }

    fn update(&self, call: &CallInstance) -> Result<CallInstance> {
        apply_update(&mut self.calls(), call)
    }

    fn cancel_with_replacement(
        &self,
        cancelled: &CallInstance,
        replacement: &CallInstance,
    ) -> Result<CallInstance> {
        apply_cancel(&mut self.calls(), cancelled, replacement)
    }

    fn all(&self) -> Result<Vec<CallInstance>> {
        let mut all = self.calls().clone();
        sort_for_display(&mut all);
        Ok(all)
    }
}
