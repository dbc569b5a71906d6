//! One-shot job scheduling keyed by string.
//!
//! At most one job is pending per key: scheduling an existing key replaces
//! its due time, and a cancelled key never fires. Jobs fire at or after
//! their due time, never before.

use crate::error::Result;
use crate::io;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub key: String,
    /// Milliseconds since the epoch.
    pub run_at: i64,
}

pub trait JobOnceScheduler: Send + Sync {
    /// Schedule `key` to fire at `run_at`, replacing any pending job for it.
    fn schedule_once(&self, key: &str, run_at: i64) -> Result<()>;

    /// Drop the pending job for `key`, if any.
    fn cancel(&self, key: &str);

    /// Pending jobs ordered by due time.
    fn list_scheduled(&self) -> Vec<ScheduledJob>;
}

/// In-process scheduler. Nothing fires on its own; the owner polls
/// [`MemoryScheduler::take_due`] with the current time.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    jobs: Mutex<BTreeMap<String, i64>>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().map(|j| (j.key, j.run_at)).collect()),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, BTreeMap<String, i64>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove and return every job due at `now`, oldest first. Jobs due
    /// later stay pending.
    pub fn take_due(&self, now: i64) -> Vec<ScheduledJob> {
        let mut jobs = self.jobs();
        let due: Vec<String> = jobs
            .iter()
            .filter(|(_, run_at)| **run_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        let mut fired: Vec<ScheduledJob> = due
            .into_iter()
            .filter_map(|key| jobs.remove(&key).map(|run_at| ScheduledJob { key, run_at }))
            .collect();
        fired.sort_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.key.cmp(&b.key)));
        fired
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.jobs().contains_key(key)
    }

    pub fn due_at(&self, key: &str) -> Option<i64> {
        self.jobs().get(key).copied()
    }

    /// Load pending jobs from a YAML file; a missing file means no jobs.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let jobs: Vec<ScheduledJob> = io::read_yaml(path)?;
        Ok(Self::from_jobs(jobs))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_yaml(path, &self.list_scheduled())
    }
}

impl JobOnceScheduler for MemoryScheduler {
    fn schedule_once(&self, key: &str, run_at: i64) -> Result<()> {
        self.jobs().insert(key.to_string(), run_at);
        Ok(())
    }

    fn cancel(&self, key: &str) {
        self.jobs().remove(key);
    }

    fn list_scheduled(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self
            .jobs()
            .iter()
            .map(|(key, run_at)| ScheduledJob {
                key: key.clone(),
                run_at: *run_at,
            })
            .collect();
        jobs.sort_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.key.cmp(&b.key)));
        jobs
    }
}
