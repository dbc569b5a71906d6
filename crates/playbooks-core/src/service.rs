//! The run service: locate a run, mutate it, stamp it, persist it.
//!
//! Every mutating call takes the run's lock for the whole
//! read-check-write cycle, so two callers racing on the same run are
//! applied one after the other. A call that changes nothing writes
//! nothing and leaves `update_at` alone.

use crate::checklist::{Checklist, ChecklistItem};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{PlaybooksError, Result};
use crate::filter::{PlaybookFilterOptions, PlaybookRunFilterOptions};
use crate::mutation::{self, ItemEdit, Mutation, Stamp};
use crate::playbook::{GetPlaybooksResults, Playbook, PlaybookChecklist};
use crate::run::{GetPlaybookRunsResults, NewRun, PlaybookRun, RunKind, StatusPost, TimelineEvent};
use crate::scheduler::JobOnceScheduler;
use crate::store::{PlaybookRunStore, PlaybookStore};
use crate::task_action::TaskAction;
use crate::types::{ChecklistItemState, RunStatus, TimelineEventType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Reminder keys with this prefix are retrospective reminders; any other key
/// is a run id awaiting a status update.
pub const RETROSPECTIVE_PREFIX: &str = "retro_";

pub fn retrospective_key(run_id: &str) -> String {
    format!("{RETROSPECTIVE_PREFIX}{run_id}")
}

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Snapshot pair reported for every applied mutation when incremental
/// updates are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunChange {
    pub before: PlaybookRun,
    pub after: PlaybookRun,
}

pub trait RunObserver: Send + Sync {
    fn run_changed(&self, change: &RunChange);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusUpdateOptions {
    pub status: String,
    pub message: String,
    /// Seconds until the next status reminder. Zero schedules none.
    pub reminder: i64,
}

/// What the chat layer should do about a reminder that fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReminderOutcome {
    /// Ask the owner for a status update.
    StatusUpdateDue {
        run_id: String,
        owner_user_id: String,
        reminder_post_id: String,
    },
    /// Nudge the channel to fill out the retrospective.
    RetrospectiveDue {
        run_id: String,
        next_reminder_at: Option<i64>,
    },
    Skipped { key: String, reason: String },
}

fn state_action(state: ChecklistItemState) -> &'static str {
    match state {
        ChecklistItemState::Closed => "check",
        ChecklistItemState::Open => "uncheck",
        ChecklistItemState::InProgress => "in_progress",
    }
}

fn item_title(run: &PlaybookRun, checklist: usize, item: usize) -> String {
    run.checklists
        .get(checklist)
        .and_then(|c| c.items.get(item))
        .map(|i| i.title.clone())
        .unwrap_or_default()
}

/// Epoch milliseconds `seconds` after `now`. Negative delays and delays
/// that overflow are rejected.
pub fn reminder_at(now: i64, seconds: i64) -> Result<i64> {
    if seconds < 0 {
        return Err(PlaybooksError::InvalidReminder(seconds));
    }
    seconds
        .checked_mul(1000)
        .and_then(|ms| now.checked_add(ms))
        .ok_or(PlaybooksError::InvalidReminder(seconds))
}

/// Queue the replacement of a run's status reminder. Zero cancels it.
fn replace_reminder(run: &mut PlaybookRun, seconds: i64, now: i64, jobs: &mut Vec<JobChange>) -> Result<()> {
    let due = if seconds == 0 {
        None
    } else {
        Some(reminder_at(now, seconds)?)
    };
    run.previous_reminder = seconds;
    match due {
        Some(at) => jobs.push(JobChange::Schedule {
            key: run.id.clone(),
            at,
        }),
        None => jobs.push(JobChange::Cancel(run.id.clone())),
    }
    Ok(())
}

/// A scheduler change that only takes effect once the run it belongs to has
/// been saved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum JobChange {
    Schedule { key: String, at: i64 },
    Cancel(String),
}

// ---------------------------------------------------------------------------
// PlaybookRunService
// ---------------------------------------------------------------------------

pub struct PlaybookRunService {
    runs: Arc<dyn PlaybookRunStore>,
    playbooks: Arc<dyn PlaybookStore>,
    scheduler: Arc<dyn JobOnceScheduler>,
    clock: Arc<dyn Clock>,
    config: Config,
    observer: Option<Arc<dyn RunObserver>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PlaybookRunService {
    pub fn new(
        runs: Arc<dyn PlaybookRunStore>,
        playbooks: Arc<dyn PlaybookStore>,
        scheduler: Arc<dyn JobOnceScheduler>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            runs,
            playbooks,
            scheduler,
            clock,
            config,
            observer: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn stamp(&self) -> Stamp<'_> {
        Stamp::now(self.clock.as_ref())
    }

    fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(run_id.to_string()).or_default().clone()
    }

    /// Drop the lock entry of a run that no longer exists.
    fn forget_lock(&self, run_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(run_id);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn apply_jobs(&self, jobs: Vec<JobChange>) -> Result<()> {
        for job in jobs {
            match job {
                JobChange::Schedule { key, at } => {
                    self.scheduler.schedule_once(&key, at)?;
                    debug!(key = %key, at, "reminder scheduled");
                }
                JobChange::Cancel(key) => self.scheduler.cancel(&key),
            }
        }
        Ok(())
    }

    /// Load the run under its lock, apply `f`, and persist when it reports a
    /// change. The run is stamped with the mutation's timestamp.
    fn modify_run<T>(
        &self,
        run_id: &str,
        op: &'static str,
        f: impl FnOnce(&mut PlaybookRun) -> Result<(T, Mutation)>,
    ) -> Result<(T, Mutation)> {
        self.modify_run_with_jobs(run_id, op, |run, _| f(run))
    }

    /// Like [`modify_run`](Self::modify_run), but `f` may also queue
    /// scheduler changes. They are applied only after the run is saved.
    fn modify_run_with_jobs<T>(
        &self,
        run_id: &str,
        op: &'static str,
        f: impl FnOnce(&mut PlaybookRun, &mut Vec<JobChange>) -> Result<(T, Mutation)>,
    ) -> Result<(T, Mutation)> {
        let lock = self.run_lock(run_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut run = match self.runs.get_playbook_run(run_id) {
            Ok(run) => run,
            Err(e) => {
                if e.is_not_found() {
                    self.forget_lock(run_id);
                }
                return Err(e);
            }
        };
        let before = (self.config.incremental_updates && self.observer.is_some()).then(|| run.clone());

        let mut jobs = Vec::new();
        let (value, outcome) = f(&mut run, &mut jobs)?;
        match outcome {
            Mutation::Applied { timestamp } => {
                run.stamp(timestamp);
                self.runs.update_playbook_run(&run)?;
                self.apply_jobs(jobs)?;
                debug!(run_id, op, timestamp, "run updated");
                if let (Some(before), Some(observer)) = (before, &self.observer) {
                    observer.run_changed(&RunChange { before, after: run });
                }
            }
            Mutation::Unchanged => debug!(run_id, op, "no change"),
        }
        Ok((value, outcome))
    }

    fn mutate(
        &self,
        run_id: &str,
        op: &'static str,
        f: impl FnOnce(&mut PlaybookRun) -> Result<Mutation>,
    ) -> Result<Mutation> {
        self.modify_run(run_id, op, |run| Ok(((), f(run)?)))
            .map(|(_, m)| m)
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a run, from a playbook when `playbook_id` is given.
    pub fn create_run(&self, new: NewRun, playbook_id: Option<&str>) -> Result<PlaybookRun> {
        let now = self.now();
        let playbook = playbook_id.map(|id| self.playbooks.get_playbook(id)).transpose()?;
        let mut run = match &playbook {
            Some(playbook) => PlaybookRun::new(new, RunKind::FromPlaybook(playbook), now),
            None => PlaybookRun::new(new, RunKind::Standalone, now),
        };

        if run.retrospective_reminder_interval_seconds == 0 {
            run.retrospective_reminder_interval_seconds =
                self.config.retrospective_reminder_interval_seconds.max(0);
        }
        let creator = run.reporter_user_id.clone();
        run.add_timeline_event(
            TimelineEvent::new(&run.id, TimelineEventType::RunCreated, now)
                .summary("Run started")
                .subject(creator.clone())
                .creator(creator),
        );

        let reminder = if run.reminder_timer_default_seconds > 0 {
            run.reminder_timer_default_seconds
        } else {
            self.config.reminder_default_seconds
        };
        let due = if reminder > 0 {
            run.previous_reminder = reminder;
            Some(reminder_at(now, reminder)?)
        } else {
            None
        };

        self.runs.create_playbook_run(&run)?;
        if let Some(mut playbook) = playbook {
            playbook.num_runs += 1;
            playbook.last_run_at = now;
            self.playbooks.update_playbook(&playbook)?;
        }
        if let Some(at) = due {
            self.scheduler.schedule_once(&run.id, at)?;
        }
        info!(run_id = %run.id, playbook_id = %run.playbook_id, "run created");
        Ok(run)
    }

    /// Delete a run together with its pending reminders.
    pub fn delete_run(&self, run_id: &str) -> Result<()> {
        let lock = self.run_lock(run_id);
        let deleted = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.runs.delete_playbook_run(run_id)
        };
        match deleted {
            Ok(()) => {
                self.scheduler.cancel(run_id);
                self.scheduler.cancel(&retrospective_key(run_id));
                self.forget_lock(run_id);
                info!(run_id, "run deleted");
                Ok(())
            }
            Err(e) => {
                if e.is_not_found() {
                    self.forget_lock(run_id);
                }
                Err(e)
            }
        }
    }

    pub fn get_run(&self, run_id: &str) -> Result<PlaybookRun> {
        self.runs.get_playbook_run(run_id)
    }

    pub fn get_runs(&self, options: &PlaybookRunFilterOptions) -> Result<GetPlaybookRunsResults> {
        self.runs.get_playbook_runs(options)
    }

    pub fn resolved_at(&self, run_id: &str) -> Result<i64> {
        Ok(self.get_run(run_id)?.resolved_at())
    }

    pub fn change_owner(&self, run_id: &str, user_id: &str, owner_id: &str) -> Result<Mutation> {
        self.mutate(run_id, "change_owner", |run| {
            if run.owner_user_id == owner_id {
                return Ok(Mutation::Unchanged);
            }
            let now = self.now();
            let previous = std::mem::replace(&mut run.owner_user_id, owner_id.to_string());
            let details = serde_json::json!({ "from": previous, "to": owner_id }).to_string();
            run.add_timeline_event(
                TimelineEvent::new(&run.id, TimelineEventType::OwnerChanged, now)
                    .summary(format!("Owner changed to {owner_id}"))
                    .details(details)
                    .subject(owner_id)
                    .creator(user_id),
            );
            Ok(Mutation::Applied { timestamp: now })
        })
    }

    // -----------------------------------------------------------------------
    // Status and lifecycle
    // -----------------------------------------------------------------------

    /// Post a status update and replace the pending status reminder.
    pub fn update_status(&self, run_id: &str, user_id: &str, options: StatusUpdateOptions) -> Result<StatusPost> {
        let status: RunStatus = options.status.parse()?;
        let (post, _) = self.modify_run_with_jobs(run_id, "update_status", |run, jobs| {
            let now = self.now();
            let post = StatusPost::new(status, now);
            run.add_status_post(post.clone());
            run.current_status = status;
            run.last_status_update_at = now;
            run.add_timeline_event(
                TimelineEvent::new(&run.id, TimelineEventType::StatusUpdated, now)
                    .summary(options.message.clone())
                    .details(serde_json::json!({ "status": status.as_str() }).to_string())
                    .post(post.id.clone())
                    .subject(user_id)
                    .creator(user_id),
            );
            replace_reminder(run, options.reminder, now, jobs)?;
            Ok((post, Mutation::Applied { timestamp: now }))
        })?;
        info!(run_id, status = %status, "status updated");
        Ok(post)
    }

    /// Soft-delete one status post. The run's resolution is derived from
    /// the remaining posts.
    pub fn remove_status_post(&self, run_id: &str, post_id: &str) -> Result<Mutation> {
        self.mutate(run_id, "remove_status_post", |run| {
            run.remove_status_post(post_id, self.now())
        })
    }

    /// Mark the run finished. Finishing a finished run is a no-op.
    pub fn finish_run(&self, run_id: &str, user_id: &str) -> Result<Mutation> {
        let (_, m) = self.modify_run_with_jobs(run_id, "finish_run", |run, jobs| {
            if run.current_status == RunStatus::Finished {
                return Ok(((), Mutation::Unchanged));
            }
            let now = self.now();
            run.current_status = RunStatus::Finished;
            run.end_at = now;
            run.add_timeline_event(
                TimelineEvent::new(&run.id, TimelineEventType::RunFinished, now)
                    .summary("Run finished")
                    .subject(user_id)
                    .creator(user_id),
            );

            jobs.push(JobChange::Cancel(run.id.clone()));
            let retro_key = retrospective_key(&run.id);
            let interval = run.retrospective_reminder_interval_seconds;
            if run.retrospective_published_at == 0 && interval > 0 {
                let at = reminder_at(now, interval)?;
                jobs.push(JobChange::Schedule { key: retro_key, at });
            } else {
                jobs.push(JobChange::Cancel(retro_key));
            }
            Ok(((), Mutation::Applied { timestamp: now }))
        })?;
        if m.is_applied() {
            info!(run_id, "run finished");
        }
        Ok(m)
    }

    /// Bring a finished run back to InProgress. Other runs are left alone.
    pub fn restore_run(&self, run_id: &str, user_id: &str) -> Result<Mutation> {
        let (_, m) = self.modify_run_with_jobs(run_id, "restore_run", |run, jobs| {
            if run.current_status != RunStatus::Finished {
                return Ok(((), Mutation::Unchanged));
            }
            let now = self.now();
            run.current_status = RunStatus::InProgress;
            run.end_at = 0;
            run.add_timeline_event(
                TimelineEvent::new(&run.id, TimelineEventType::RunRestored, now)
                    .summary("Run restored")
                    .subject(user_id)
                    .creator(user_id),
            );
            jobs.push(JobChange::Cancel(retrospective_key(&run.id)));
            Ok(((), Mutation::Applied { timestamp: now }))
        })?;
        if m.is_applied() {
            info!(run_id, "run restored");
        }
        Ok(m)
    }

    pub fn publish_retrospective(&self, run_id: &str, user_id: &str, text: &str) -> Result<Mutation> {
        self.modify_run_with_jobs(run_id, "publish_retrospective", |run, jobs| {
            let now = self.now();
            run.retrospective = text.to_string();
            run.retrospective_published_at = now;
            run.retrospective_was_canceled = false;
            run.add_timeline_event(
                TimelineEvent::new(&run.id, TimelineEventType::PublishedRetrospective, now)
                    .summary("Retrospective published")
                    .subject(user_id)
                    .creator(user_id),
            );
            jobs.push(JobChange::Cancel(retrospective_key(&run.id)));
            Ok(((), Mutation::Applied { timestamp: now }))
        })
        .map(|(_, m)| m)
    }

    pub fn cancel_retrospective(&self, run_id: &str, user_id: &str) -> Result<Mutation> {
        self.modify_run_with_jobs(run_id, "cancel_retrospective", |run, jobs| {
            if run.retrospective_was_canceled {
                return Ok(((), Mutation::Unchanged));
            }
            let now = self.now();
            run.retrospective_published_at = now;
            run.retrospective_was_canceled = true;
            run.add_timeline_event(
                TimelineEvent::new(&run.id, TimelineEventType::CanceledRetrospective, now)
                    .summary("Retrospective canceled")
                    .subject(user_id)
                    .creator(user_id),
            );
            jobs.push(JobChange::Cancel(retrospective_key(&run.id)));
            Ok(((), Mutation::Applied { timestamp: now }))
        })
        .map(|(_, m)| m)
    }

    // -----------------------------------------------------------------------
    // Timeline
    // -----------------------------------------------------------------------

    /// Record an externally produced event (e.g. `event_from_post`).
    pub fn add_timeline_event(&self, run_id: &str, event: TimelineEvent) -> Result<TimelineEvent> {
        let (event, _) = self.modify_run(run_id, "add_timeline_event", |run| {
            let now = self.now();
            let mut event = event;
            event.playbook_run_id = run.id.clone();
            if event.create_at == 0 {
                event.create_at = now;
            }
            if event.event_at == 0 {
                event.event_at = event.create_at;
            }
            run.add_timeline_event(event.clone());
            Ok((event, Mutation::Applied { timestamp: now }))
        })?;
        Ok(event)
    }

    pub fn remove_timeline_event(&self, run_id: &str, event_id: &str) -> Result<Mutation> {
        self.mutate(run_id, "remove_timeline_event", |run| {
            run.remove_timeline_event(event_id, self.now())
        })
    }

    // -----------------------------------------------------------------------
    // Reminders
    // -----------------------------------------------------------------------

    /// Schedule `key` to fire `seconds` from now.
    pub fn set_reminder(&self, key: &str, seconds: i64) -> Result<i64> {
        let at = reminder_at(self.now(), seconds)?;
        self.scheduler.schedule_once(key, at)?;
        debug!(key, at, "reminder scheduled");
        Ok(at)
    }

    /// Cancel the pending status reminder for a run.
    pub fn remove_reminder(&self, run_id: &str) {
        self.scheduler.cancel(run_id);
        debug!(run_id, "reminder removed");
    }

    /// Replace the pending status reminder. Zero cancels it; a negative or
    /// overflowing delay is rejected and leaves the reminder alone.
    pub fn set_new_reminder(&self, run_id: &str, seconds: i64) -> Result<Mutation> {
        self.modify_run_with_jobs(run_id, "set_new_reminder", |run, jobs| {
            let now = self.now();
            replace_reminder(run, seconds, now, jobs)?;
            Ok(((), Mutation::Applied { timestamp: now }))
        })
        .map(|(_, m)| m)
    }

    /// Decide what a fired reminder means for its run, as of the service
    /// clock.
    pub fn handle_reminder(&self, key: &str) -> Result<ReminderOutcome> {
        self.handle_reminder_at(key, self.now())
    }

    /// Decide what a reminder that fired at `now` means for its run. Follow-up
    /// reminders are scheduled relative to `now`.
    pub fn handle_reminder_at(&self, key: &str, now: i64) -> Result<ReminderOutcome> {
        match key.strip_prefix(RETROSPECTIVE_PREFIX) {
            Some(run_id) => self.handle_retrospective_reminder(key, run_id, now),
            None => self.handle_status_reminder(key, now),
        }
    }

    fn handle_retrospective_reminder(&self, key: &str, run_id: &str, now: i64) -> Result<ReminderOutcome> {
        let run = self.get_run(run_id)?;
        let skipped = |reason: &str| ReminderOutcome::Skipped {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if run.retrospective_published_at != 0 {
            return Ok(skipped("retrospective already published"));
        }
        if run.current_status != RunStatus::Finished {
            return Ok(skipped("run is not finished"));
        }

        let interval = run.retrospective_reminder_interval_seconds;
        let next_reminder_at = if interval > 0 {
            let at = reminder_at(now, interval)?;
            self.scheduler.schedule_once(key, at)?;
            debug!(key, at, "reminder scheduled");
            Some(at)
        } else {
            None
        };
        info!(run_id, "retrospective reminder due");
        Ok(ReminderOutcome::RetrospectiveDue {
            run_id: run_id.to_string(),
            next_reminder_at,
        })
    }

    fn handle_status_reminder(&self, run_id: &str, now: i64) -> Result<ReminderOutcome> {
        let (outcome, m) = self.modify_run(run_id, "handle_status_reminder", |run| {
            if !run.is_active() || run.current_status == RunStatus::Finished {
                warn!(run_id, status = %run.current_status, "status reminder for a closed run");
                let skipped = ReminderOutcome::Skipped {
                    key: run_id.to_string(),
                    reason: format!("run is {}", run.current_status),
                };
                return Ok((skipped, Mutation::Unchanged));
            }
            run.reminder_post_id = crate::id::new_id();
            let due = ReminderOutcome::StatusUpdateDue {
                run_id: run.id.clone(),
                owner_user_id: run.owner_user_id.clone(),
                reminder_post_id: run.reminder_post_id.clone(),
            };
            Ok((due, Mutation::Applied { timestamp: now }))
        })?;
        if m.is_applied() {
            info!(run_id, "status update due");
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Checklists
    // -----------------------------------------------------------------------

    pub fn add_checklist(&self, run_id: &str, checklist: Checklist) -> Result<Mutation> {
        self.mutate(run_id, "add_checklist", |run| {
            Ok(mutation::add_checklist(&mut run.checklists, checklist, self.stamp()))
        })
    }

    pub fn duplicate_checklist(&self, run_id: &str, checklist: usize) -> Result<Mutation> {
        self.mutate(run_id, "duplicate_checklist", |run| {
            mutation::duplicate_checklist(&mut run.checklists, checklist, self.stamp())
        })
    }

    pub fn remove_checklist(&self, run_id: &str, checklist: usize) -> Result<Checklist> {
        let (removed, _) = self.modify_run(run_id, "remove_checklist", |run| {
            mutation::remove_checklist(&mut run.checklists, checklist, self.stamp())
        })?;
        Ok(removed)
    }

    pub fn rename_checklist(&self, run_id: &str, checklist: usize, title: &str) -> Result<Mutation> {
        self.mutate(run_id, "rename_checklist", |run| {
            mutation::rename_checklist(&mut run.checklists, checklist, title, self.stamp())
        })
    }

    pub fn move_checklist(&self, run_id: &str, source: usize, dest: usize) -> Result<Mutation> {
        self.mutate(run_id, "move_checklist", |run| {
            mutation::move_checklist(&mut run.checklists, source, dest, self.stamp())
        })
    }

    // -----------------------------------------------------------------------
    // Checklist items
    // -----------------------------------------------------------------------

    pub fn add_checklist_item(&self, run_id: &str, checklist: usize, item: ChecklistItem) -> Result<Mutation> {
        self.mutate(run_id, "add_checklist_item", |run| {
            mutation::add_checklist_item(&mut run.checklists, checklist, item, self.stamp())
        })
    }

    pub fn duplicate_checklist_item(&self, run_id: &str, checklist: usize, item: usize) -> Result<Mutation> {
        self.mutate(run_id, "duplicate_checklist_item", |run| {
            mutation::duplicate_checklist_item(&mut run.checklists, checklist, item, self.stamp())
        })
    }

    pub fn remove_checklist_item(&self, run_id: &str, checklist: usize, item: usize) -> Result<ChecklistItem> {
        let (removed, _) = self.modify_run(run_id, "remove_checklist_item", |run| {
            mutation::remove_checklist_item(&mut run.checklists, checklist, item, self.stamp())
        })?;
        Ok(removed)
    }

    pub fn edit_checklist_item(
        &self,
        run_id: &str,
        checklist: usize,
        item: usize,
        edit: ItemEdit,
    ) -> Result<Mutation> {
        self.mutate(run_id, "edit_checklist_item", |run| {
            mutation::edit_checklist_item(&mut run.checklists, checklist, item, edit, self.stamp())
        })
    }

    pub fn move_checklist_item(
        &self,
        run_id: &str,
        source_checklist: usize,
        source_item: usize,
        dest_checklist: usize,
        dest_item: usize,
    ) -> Result<Mutation> {
        self.mutate(run_id, "move_checklist_item", |run| {
            mutation::move_checklist_item(
                &mut run.checklists,
                source_checklist,
                source_item,
                dest_checklist,
                dest_item,
                self.stamp(),
            )
        })
    }

    /// Change an item's state and record a `task_state_modified` event.
    pub fn modify_checked_state(
        &self,
        run_id: &str,
        user_id: &str,
        checklist: usize,
        item: usize,
        new_state: &str,
    ) -> Result<Mutation> {
        self.mutate(run_id, "modify_checked_state", |run| {
            let m = mutation::modify_checked_state_str(&mut run.checklists, checklist, item, new_state, self.stamp())?;
            self.record_state_change(run, user_id, checklist, item, m);
            Ok(m)
        })
    }

    pub fn toggle_checked_state(&self, run_id: &str, user_id: &str, checklist: usize, item: usize) -> Result<Mutation> {
        self.mutate(run_id, "toggle_checked_state", |run| {
            let m = mutation::toggle_checked_state(&mut run.checklists, checklist, item, self.stamp())?;
            self.record_state_change(run, user_id, checklist, item, m);
            Ok(m)
        })
    }

    fn record_state_change(&self, run: &mut PlaybookRun, user_id: &str, checklist: usize, item: usize, m: Mutation) {
        let Some(ts) = m.timestamp() else {
            return;
        };
        let title = item_title(run, checklist, item);
        let state = run.checklists[checklist].items[item].state;
        let action = state_action(state);
        let details = serde_json::json!({ "action": action, "task": title }).to_string();
        run.add_timeline_event(
            TimelineEvent::new(&run.id, TimelineEventType::TaskStateModified, ts)
                .summary(format!("{action} \"{title}\""))
                .details(details)
                .subject(user_id)
                .creator(user_id),
        );
    }

    pub fn set_assignee(
        &self,
        run_id: &str,
        user_id: &str,
        checklist: usize,
        item: usize,
        assignee_id: &str,
    ) -> Result<Mutation> {
        self.mutate(run_id, "set_assignee", |run| {
            let m = mutation::set_assignee(&mut run.checklists, checklist, item, assignee_id, self.stamp())?;
            if let Some(ts) = m.timestamp() {
                let title = item_title(run, checklist, item);
                let summary = if assignee_id.is_empty() {
                    format!("Unassigned \"{title}\"")
                } else {
                    format!("Assigned \"{title}\" to {assignee_id}")
                };
                let details = serde_json::json!({ "task": title, "assignee_id": assignee_id }).to_string();
                run.add_timeline_event(
                    TimelineEvent::new(&run.id, TimelineEventType::AssigneeChanged, ts)
                        .summary(summary)
                        .details(details)
                        .subject(assignee_id)
                        .creator(user_id),
                );
            }
            Ok(m)
        })
    }

    pub fn set_command(&self, run_id: &str, checklist: usize, item: usize, command: &str) -> Result<Mutation> {
        self.mutate(run_id, "set_command", |run| {
            mutation::set_command(&mut run.checklists, checklist, item, command, self.stamp())
        })
    }

    /// Record that the item's command was run and return the command text
    /// for the caller to execute.
    pub fn run_checklist_item_slash_command(
        &self,
        run_id: &str,
        user_id: &str,
        checklist: usize,
        item: usize,
    ) -> Result<String> {
        let (command, _) = self.modify_run(run_id, "run_slash_command", |run| {
            let m = mutation::record_command_run(&mut run.checklists, checklist, item, self.stamp())?;
            let command = run.checklists[checklist].items[item].command.clone();
            if let Some(ts) = m.timestamp() {
                run.add_timeline_event(
                    TimelineEvent::new(&run.id, TimelineEventType::RanSlashCommand, ts)
                        .summary(format!("ran the slash command: `{command}`"))
                        .details(serde_json::json!({ "command": command }).to_string())
                        .subject(user_id)
                        .creator(user_id),
                );
            }
            Ok((command, m))
        })?;
        Ok(command)
    }

    pub fn set_due_date(&self, run_id: &str, checklist: usize, item: usize, due_date: i64) -> Result<Mutation> {
        self.mutate(run_id, "set_due_date", |run| {
            mutation::set_due_date(&mut run.checklists, checklist, item, due_date, self.stamp())
        })
    }

    pub fn set_task_actions(
        &self,
        run_id: &str,
        checklist: usize,
        item: usize,
        task_actions: Vec<TaskAction>,
    ) -> Result<Mutation> {
        self.mutate(run_id, "set_task_actions", |run| {
            mutation::set_task_actions(&mut run.checklists, checklist, item, task_actions, self.stamp())
        })
    }

    // -----------------------------------------------------------------------
    // Playbooks
    // -----------------------------------------------------------------------

    pub fn create_playbook(&self, title: &str, checklists: Vec<PlaybookChecklist>) -> Result<Playbook> {
        self.create_playbook_from(Playbook {
            title: title.to_string(),
            checklists,
            ..Playbook::default()
        })
    }

    /// Store a filled-in template. The id, timestamps and counters are
    /// assigned here; a zero retrospective interval takes the configured one.
    pub fn create_playbook_from(&self, template: Playbook) -> Result<Playbook> {
        if template.title.trim().is_empty() {
            return Err(PlaybooksError::EmptyTitle("playbook"));
        }
        let now = self.now();
        reminder_at(now, template.reminder_timer_default_seconds)?;
        reminder_at(now, template.retrospective_reminder_interval_seconds)?;
        let mut playbook = Playbook {
            id: crate::id::new_id(),
            create_at: now,
            update_at: now,
            delete_at: 0,
            num_runs: 0,
            last_run_at: 0,
            ..template
        };
        playbook.recount();
        if playbook.retrospective_reminder_interval_seconds == 0 {
            playbook.retrospective_reminder_interval_seconds =
                self.config.retrospective_reminder_interval_seconds.max(0);
        }
        self.playbooks.create_playbook(&playbook)?;
        info!(playbook_id = %playbook.id, "playbook created");
        Ok(playbook)
    }

    pub fn get_playbook(&self, id: &str) -> Result<Playbook> {
        self.playbooks.get_playbook(id)
    }

    pub fn get_playbooks(&self, options: &PlaybookFilterOptions) -> Result<GetPlaybooksResults> {
        self.playbooks.get_playbooks(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::scheduler::MemoryScheduler;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Recorder(Mutex<Vec<RunChange>>);

    impl RunObserver for Recorder {
        fn run_changed(&self, change: &RunChange) {
            self.0.lock().unwrap().push(change.clone());
        }
    }

    struct Harness {
        service: PlaybookRunService,
        clock: Arc<ManualClock>,
        scheduler: Arc<MemoryScheduler>,
        recorder: Arc<Recorder>,
    }

    fn harness(config: Config) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let scheduler = Arc::new(MemoryScheduler::new());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let service = PlaybookRunService::new(
            store.clone(),
            store,
            scheduler.clone(),
            clock.clone(),
            config,
        )
        .with_observer(recorder.clone());
        Harness {
            service,
            clock,
            scheduler,
            recorder,
        }
    }

    fn standalone(h: &Harness) -> PlaybookRun {
        let run = h.service.create_run(NewRun::named("Outage"), None).unwrap();
        h.service
            .add_checklist_item(&run.id, 0, ChecklistItem::new("Page on-call"))
            .unwrap();
        run
    }

    #[test]
    fn mutations_stamp_run_with_item_timestamp() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.clock.set(5_000);
        let m = h
            .service
            .modify_checked_state(&run.id, "u1", 0, 0, "closed")
            .unwrap();
        assert_eq!(m, Mutation::Applied { timestamp: 5_000 });
        let run = h.service.get_run(&run.id).unwrap();
        assert_eq!(run.update_at, 5_000);
        assert_eq!(run.checklists[0].update_at, 5_000);
        assert_eq!(run.checklists[0].items[0].update_at, 5_000);
    }

    #[test]
    fn no_op_does_not_write_or_notify() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.service.set_assignee(&run.id, "u1", 0, 0, "alice").unwrap();
        let before = h.service.get_run(&run.id).unwrap();
        let notified = h.recorder.0.lock().unwrap().len();

        h.clock.set(9_000);
        let m = h.service.set_assignee(&run.id, "u1", 0, 0, "alice").unwrap();
        assert_eq!(m, Mutation::Unchanged);
        assert_eq!(h.service.get_run(&run.id).unwrap(), before);
        assert_eq!(h.recorder.0.lock().unwrap().len(), notified);
    }

    #[test]
    fn observer_sees_before_and_after() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.service.rename_checklist(&run.id, 0, "Now").unwrap();
        let changes = h.recorder.0.lock().unwrap();
        let last = changes.last().unwrap();
        assert_eq!(last.before.checklists[0].title, "Tasks");
        assert_eq!(last.after.checklists[0].title, "Now");
    }

    #[test]
    fn observer_silent_without_incremental_updates() {
        let h = harness(Config {
            incremental_updates: false,
            ..Config::default()
        });
        let run = standalone(&h);
        h.service.rename_checklist(&run.id, 0, "Now").unwrap();
        assert!(h.recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn state_change_records_timeline() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.service.modify_checked_state(&run.id, "u1", 0, 0, "in_progress").unwrap();
        h.service.toggle_checked_state(&run.id, "u1", 0, 0).unwrap();
        h.service.toggle_checked_state(&run.id, "u1", 0, 0).unwrap();
        let run = h.service.get_run(&run.id).unwrap();
        let actions: Vec<String> = run
            .timeline_events
            .iter()
            .filter(|e| e.event_type == TimelineEventType::TaskStateModified)
            .map(|e| {
                let v: serde_json::Value = serde_json::from_str(&e.details).unwrap();
                assert_eq!(v["task"], "Page on-call");
                v["action"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(actions, vec!["in_progress", "uncheck", "check"]);
    }

    #[test]
    fn invalid_state_leaves_run_untouched() {
        let h = harness(Config::default());
        let run = standalone(&h);
        let before = h.service.get_run(&run.id).unwrap();
        let err = h
            .service
            .modify_checked_state(&run.id, "u1", 0, 0, "done")
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        let err = h
            .service
            .modify_checked_state(&run.id, "u1", 0, 7, "closed")
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.service.get_run(&run.id).unwrap(), before);
        assert!(h.service.get_run("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn slash_command_run() {
        let h = harness(Config::default());
        let run = standalone(&h);
        assert!(h.service.run_checklist_item_slash_command(&run.id, "u1", 0, 0).is_err());
        h.service.set_command(&run.id, 0, 0, "/page oncall").unwrap();
        h.clock.set(7_000);
        let command = h
            .service
            .run_checklist_item_slash_command(&run.id, "u1", 0, 0)
            .unwrap();
        assert_eq!(command, "/page oncall");
        let run = h.service.get_run(&run.id).unwrap();
        assert_eq!(run.checklists[0].items[0].command_last_run, 7_000);
        assert!(run
            .timeline_events
            .iter()
            .any(|e| e.event_type == TimelineEventType::RanSlashCommand));
    }

    #[test]
    fn status_updates_build_history() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.clock.set(2_000);
        h.service
            .update_status(
                &run.id,
                "u1",
                StatusUpdateOptions {
                    status: "resolved".into(),
                    message: "fixed".into(),
                    reminder: 0,
                },
            )
            .unwrap();
        let stored = h.service.get_run(&run.id).unwrap();
        assert_eq!(stored.current_status, RunStatus::Resolved);
        assert_eq!(stored.last_status_update_at, 2_000);
        assert!(!stored.is_active());
        assert_eq!(h.service.resolved_at(&run.id).unwrap(), 2_000);

        let bad = StatusUpdateOptions {
            status: String::new(),
            ..Default::default()
        };
        assert!(h.service.update_status(&run.id, "u1", bad).is_err());

        h.clock.set(3_000);
        let post = h
            .service
            .update_status(
                &run.id,
                "u1",
                StatusUpdateOptions {
                    status: "Active".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(h.service.resolved_at(&run.id).unwrap(), 0);
        h.service.remove_status_post(&run.id, &post.id).unwrap();
        assert_eq!(h.service.resolved_at(&run.id).unwrap(), 2_000);
    }

    #[test]
    fn status_update_replaces_reminder() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.clock.set(10_000);
        let opts = |reminder| StatusUpdateOptions {
            status: "Active".into(),
            reminder,
            ..Default::default()
        };
        h.service.update_status(&run.id, "u1", opts(60)).unwrap();
        assert_eq!(h.scheduler.due_at(&run.id), Some(70_000));
        h.service.update_status(&run.id, "u1", opts(0)).unwrap();
        assert!(!h.scheduler.is_scheduled(&run.id));
        assert_eq!(h.service.get_run(&run.id).unwrap().previous_reminder, 0);
    }

    #[test]
    fn create_schedules_default_reminder() {
        let h = harness(Config {
            reminder_default_seconds: 30,
            ..Config::default()
        });
        let run = h.service.create_run(NewRun::named("r"), None).unwrap();
        assert_eq!(h.scheduler.due_at(&run.id), Some(31_000));
        assert_eq!(run.timeline_events[0].event_type, TimelineEventType::RunCreated);
    }

    #[test]
    fn finish_and_restore() {
        let h = harness(Config {
            retrospective_reminder_interval_seconds: 3_600,
            reminder_default_seconds: 30,
            ..Config::default()
        });
        let run = standalone(&h);
        h.clock.set(50_000);
        assert!(h.service.finish_run(&run.id, "u1").unwrap().is_applied());
        let stored = h.service.get_run(&run.id).unwrap();
        assert_eq!(stored.current_status, RunStatus::Finished);
        assert_eq!(stored.end_at, 50_000);
        assert!(!h.scheduler.is_scheduled(&run.id));
        assert_eq!(
            h.scheduler.due_at(&retrospective_key(&run.id)),
            Some(50_000 + 3_600_000)
        );
        assert_eq!(h.service.finish_run(&run.id, "u1").unwrap(), Mutation::Unchanged);

        assert!(h.service.restore_run(&run.id, "u1").unwrap().is_applied());
        let stored = h.service.get_run(&run.id).unwrap();
        assert_eq!(stored.current_status, RunStatus::InProgress);
        assert_eq!(stored.end_at, 0);
        assert!(!h.scheduler.is_scheduled(&retrospective_key(&run.id)));
        assert_eq!(h.service.restore_run(&run.id, "u1").unwrap(), Mutation::Unchanged);
    }

    #[test]
    fn retrospective_reminder_reschedules_until_published() {
        let h = harness(Config {
            retrospective_reminder_interval_seconds: 60,
            ..Config::default()
        });
        let run = standalone(&h);
        let key = retrospective_key(&run.id);

        // Not finished yet.
        let outcome = h.service.handle_reminder(&key).unwrap();
        assert!(matches!(outcome, ReminderOutcome::Skipped { .. }));

        h.service.finish_run(&run.id, "u1").unwrap();
        h.clock.set(100_000);
        let outcome = h.service.handle_reminder(&key).unwrap();
        assert_eq!(
            outcome,
            ReminderOutcome::RetrospectiveDue {
                run_id: run.id.clone(),
                next_reminder_at: Some(160_000),
            }
        );
        assert_eq!(h.scheduler.due_at(&key), Some(160_000));

        h.service.publish_retrospective(&run.id, "u1", "went fine").unwrap();
        assert!(!h.scheduler.is_scheduled(&key));
        let outcome = h.service.handle_reminder(&key).unwrap();
        assert!(matches!(outcome, ReminderOutcome::Skipped { .. }));
    }

    #[test]
    fn status_reminder_targets_owner() {
        let h = harness(Config::default());
        let mut new = NewRun::named("r");
        new.owner_user_id = "owner".into();
        let run = h.service.create_run(new, None).unwrap();
        match h.service.handle_reminder(&run.id).unwrap() {
            ReminderOutcome::StatusUpdateDue {
                owner_user_id,
                reminder_post_id,
                ..
            } => {
                assert_eq!(owner_user_id, "owner");
                assert_eq!(
                    h.service.get_run(&run.id).unwrap().reminder_post_id,
                    reminder_post_id
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        h.service.finish_run(&run.id, "u1").unwrap();
        assert!(matches!(
            h.service.handle_reminder(&run.id).unwrap(),
            ReminderOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn run_from_playbook_counts_runs() {
        let h = harness(Config::default());
        let playbook = h
            .service
            .create_playbook("Incident", vec![PlaybookChecklist::parse_spec("Triage:page,bridge")])
            .unwrap();
        h.clock.set(4_000);
        let run = h
            .service
            .create_run(NewRun::named("Outage"), Some(&playbook.id))
            .unwrap();
        assert_eq!(run.checklists[0].items.len(), 2);
        let playbook = h.service.get_playbook(&playbook.id).unwrap();
        assert_eq!(playbook.num_runs, 1);
        assert_eq!(playbook.last_run_at, 4_000);
        assert!(h.service.create_run(NewRun::named("x"), Some("missing")).is_err());
    }

    #[test]
    fn playbook_defaults_flow_into_runs() {
        let h = harness(Config {
            retrospective_reminder_interval_seconds: 600,
            ..Config::default()
        });
        let playbook = h
            .service
            .create_playbook_from(Playbook {
                id: "ignored".into(),
                title: "Deploy".into(),
                num_runs: 9,
                reminder_timer_default_seconds: 60,
                invited_user_ids: vec!["u7".into()],
                checklists: vec![PlaybookChecklist::parse_spec("Ship:build,push")],
                ..Playbook::default()
            })
            .unwrap();
        assert_ne!(playbook.id, "ignored");
        assert_eq!(playbook.num_runs, 0);
        assert_eq!(playbook.num_steps, 2);
        assert_eq!(playbook.retrospective_reminder_interval_seconds, 600);
        assert!(matches!(
            h.service.create_playbook("  ", Vec::new()),
            Err(PlaybooksError::EmptyTitle(_))
        ));

        let run = h
            .service
            .create_run(NewRun::named("Friday deploy"), Some(&playbook.id))
            .unwrap();
        assert_eq!(run.invited_user_ids, vec!["u7".to_string()]);
        assert_eq!(run.previous_reminder, 60);
        assert_eq!(h.scheduler.due_at(&run.id), Some(1_000 + 60_000));
    }

    #[test]
    fn timeline_events_can_be_removed() {
        let h = harness(Config::default());
        let run = standalone(&h);
        let event = h
            .service
            .add_timeline_event(&run.id, TimelineEvent::new("", TimelineEventType::EventFromPost, 0))
            .unwrap();
        assert_eq!(event.playbook_run_id, run.id);
        h.service.remove_timeline_event(&run.id, &event.id).unwrap();
        let run = h.service.get_run(&run.id).unwrap();
        assert!(run.visible_timeline().all(|e| e.id != event.id));
    }

    #[test]
    fn owner_change_is_idempotent() {
        let h = harness(Config::default());
        let run = standalone(&h);
        assert!(h.service.change_owner(&run.id, "u1", "u2").unwrap().is_applied());
        assert_eq!(h.service.change_owner(&run.id, "u1", "u2").unwrap(), Mutation::Unchanged);
        assert_eq!(h.service.get_run(&run.id).unwrap().owner_user_id, "u2");
    }

    #[test]
    fn concurrent_closes_apply_once() {
        let h = Arc::new(harness(Config::default()));
        let run = standalone(&h);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                let id = run.id.clone();
                std::thread::spawn(move || h.service.modify_checked_state(&id, "u", 0, 0, "closed").unwrap())
            })
            .collect();
        let applied = handles
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|m| m.is_applied())
            .count();
        assert_eq!(applied, 1);
    }

    // -----------------------------------------------------------------------
    // Reminder bounds and save ordering
    // -----------------------------------------------------------------------

    /// Run store whose writes fail on demand.
    #[derive(Default)]
    struct FlakyRuns {
        inner: MemoryStore,
        fail_creates: AtomicBool,
        fail_updates: AtomicBool,
    }

    fn disk_full() -> PlaybooksError {
        PlaybooksError::Io(std::io::Error::other("disk full"))
    }

    impl PlaybookRunStore for FlakyRuns {
        fn get_playbook_run(&self, id: &str) -> Result<PlaybookRun> {
            self.inner.get_playbook_run(id)
        }

        fn create_playbook_run(&self, run: &PlaybookRun) -> Result<()> {
            if self.fail_creates.load(Ordering::SeqCst) {
                return Err(disk_full());
            }
            self.inner.create_playbook_run(run)
        }

        fn update_playbook_run(&self, run: &PlaybookRun) -> Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(disk_full());
            }
            self.inner.update_playbook_run(run)
        }

        fn delete_playbook_run(&self, id: &str) -> Result<()> {
            self.inner.delete_playbook_run(id)
        }

        fn list_playbook_runs(&self) -> Result<Vec<PlaybookRun>> {
            self.inner.list_playbook_runs()
        }
    }

    struct FlakyHarness {
        service: PlaybookRunService,
        runs: Arc<FlakyRuns>,
        scheduler: Arc<MemoryScheduler>,
    }

    fn flaky_harness(config: Config) -> FlakyHarness {
        let runs = Arc::new(FlakyRuns::default());
        let scheduler = Arc::new(MemoryScheduler::new());
        let service = PlaybookRunService::new(
            runs.clone(),
            Arc::new(MemoryStore::new()),
            scheduler.clone(),
            Arc::new(ManualClock::new(1_000)),
            config,
        );
        FlakyHarness {
            service,
            runs,
            scheduler,
        }
    }

    #[test]
    fn reminder_delay_bounds() {
        assert_eq!(reminder_at(1_000, 0).unwrap(), 1_000);
        assert_eq!(reminder_at(1_000, 60).unwrap(), 61_000);
        assert!(matches!(reminder_at(1_000, -1), Err(PlaybooksError::InvalidReminder(-1))));
        assert!(reminder_at(1_000, i64::MAX / 1000 + 1).is_err());
        assert!(reminder_at(i64::MAX - 10, 1).is_err());
    }

    #[test]
    fn out_of_range_reminder_is_rejected_without_side_effects() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.service.set_new_reminder(&run.id, 60).unwrap();
        let before = h.service.get_run(&run.id).unwrap();

        h.clock.set(9_000);
        for seconds in [i64::MAX / 1000 + 1, i64::MAX, -5] {
            let err = h.service.set_new_reminder(&run.id, seconds).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        let err = h
            .service
            .update_status(
                &run.id,
                "u1",
                StatusUpdateOptions {
                    status: "Active".into(),
                    reminder: i64::MAX,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, PlaybooksError::InvalidReminder(_)));

        assert_eq!(h.service.get_run(&run.id).unwrap(), before);
        assert_eq!(h.scheduler.due_at(&run.id), Some(61_000));
        assert!(h.service.set_reminder("k", i64::MAX).is_err());
        assert!(!h.scheduler.is_scheduled("k"));

        assert!(h.service.set_new_reminder(&run.id, 0).unwrap().is_applied());
        assert!(!h.scheduler.is_scheduled(&run.id));
    }

    #[test]
    fn playbook_reminders_are_validated() {
        let h = harness(Config::default());
        let with = |reminder, retro| Playbook {
            title: "Incident".into(),
            reminder_timer_default_seconds: reminder,
            retrospective_reminder_interval_seconds: retro,
            ..Playbook::default()
        };
        assert!(matches!(
            h.service.create_playbook_from(with(i64::MAX, 0)),
            Err(PlaybooksError::InvalidReminder(_))
        ));
        assert!(matches!(
            h.service.create_playbook_from(with(0, -1)),
            Err(PlaybooksError::InvalidReminder(-1))
        ));
        let results = h.service.get_playbooks(&PlaybookFilterOptions::default()).unwrap();
        assert_eq!(results.total_count, 0);
        assert!(h.service.create_playbook_from(with(60, 3_600)).is_ok());
    }

    #[test]
    fn status_reminder_stamps_run_and_notifies() {
        let h = harness(Config::default());
        let run = standalone(&h);
        let stamped = h.service.get_run(&run.id).unwrap().update_at;
        let notified = h.recorder.0.lock().unwrap().len();

        h.clock.set(50_000);
        let outcome = h.service.handle_reminder(&run.id).unwrap();
        let ReminderOutcome::StatusUpdateDue { reminder_post_id, .. } = outcome.clone() else {
            panic!("unexpected outcome {outcome:?}");
        };
        let stored = h.service.get_run(&run.id).unwrap();
        assert!(stored.update_at > stamped);
        assert_eq!(stored.update_at, 50_000);
        assert_eq!(stored.reminder_post_id, reminder_post_id);

        let changes = h.recorder.0.lock().unwrap();
        assert_eq!(changes.len(), notified + 1);
        let last = changes.last().unwrap();
        assert_eq!(last.before.reminder_post_id, "");
        assert_eq!(last.after.reminder_post_id, reminder_post_id);
    }

    #[test]
    fn skipped_status_reminder_changes_nothing() {
        let h = harness(Config::default());
        let run = standalone(&h);
        h.service.finish_run(&run.id, "u1").unwrap();
        let before = h.service.get_run(&run.id).unwrap();
        let notified = h.recorder.0.lock().unwrap().len();

        h.clock.set(80_000);
        let outcome = h.service.handle_reminder(&run.id).unwrap();
        assert!(matches!(outcome, ReminderOutcome::Skipped { .. }));
        assert_eq!(h.service.get_run(&run.id).unwrap(), before);
        assert_eq!(h.recorder.0.lock().unwrap().len(), notified);
    }

    #[test]
    fn reminders_handled_at_an_explicit_time() {
        let h = harness(Config {
            retrospective_reminder_interval_seconds: 60,
            ..Config::default()
        });
        let run = standalone(&h);
        h.service.finish_run(&run.id, "u1").unwrap();
        let key = retrospective_key(&run.id);

        let outcome = h.service.handle_reminder_at(&key, 500_000).unwrap();
        assert_eq!(
            outcome,
            ReminderOutcome::RetrospectiveDue {
                run_id: run.id.clone(),
                next_reminder_at: Some(560_000),
            }
        );
        assert_eq!(h.scheduler.due_at(&key), Some(560_000));

        h.service.restore_run(&run.id, "u1").unwrap();
        h.service.handle_reminder_at(&run.id, 700_000).unwrap();
        assert_eq!(h.service.get_run(&run.id).unwrap().update_at, 700_000);
    }

    #[test]
    fn failed_save_leaves_reminders_alone() {
        let h = flaky_harness(Config {
            reminder_default_seconds: 30,
            retrospective_reminder_interval_seconds: 3_600,
            ..Config::default()
        });
        let run = h.service.create_run(NewRun::named("r"), None).unwrap();
        assert_eq!(h.scheduler.due_at(&run.id), Some(31_000));

        h.runs.fail_updates.store(true, Ordering::SeqCst);
        let opts = StatusUpdateOptions {
            status: "Active".into(),
            reminder: 120,
            ..Default::default()
        };
        assert!(h.service.update_status(&run.id, "u1", opts).is_err());
        assert!(h.service.set_new_reminder(&run.id, 0).is_err());
        assert!(h.service.finish_run(&run.id, "u1").is_err());

        assert_eq!(h.scheduler.due_at(&run.id), Some(31_000));
        assert!(!h.scheduler.is_scheduled(&retrospective_key(&run.id)));
        assert_eq!(h.service.get_run(&run.id).unwrap(), run);

        h.runs.fail_updates.store(false, Ordering::SeqCst);
        h.service.finish_run(&run.id, "u1").unwrap();
        assert!(!h.scheduler.is_scheduled(&run.id));
        assert!(h.scheduler.is_scheduled(&retrospective_key(&run.id)));
    }

    #[test]
    fn failed_create_does_not_count_the_run() {
        let h = flaky_harness(Config {
            reminder_default_seconds: 30,
            ..Config::default()
        });
        let playbook = h.service.create_playbook("Incident", Vec::new()).unwrap();

        h.runs.fail_creates.store(true, Ordering::SeqCst);
        assert!(h
            .service
            .create_run(NewRun::named("r"), Some(&playbook.id))
            .is_err());
        assert_eq!(h.service.get_playbook(&playbook.id).unwrap().num_runs, 0);
        assert!(h.scheduler.list_scheduled().is_empty());
    }

    #[test]
    fn deleting_a_run_drops_its_lock_and_reminders() {
        let h = harness(Config {
            reminder_default_seconds: 30,
            ..Config::default()
        });
        let run = standalone(&h);
        assert_eq!(h.service.tracked_locks(), 1);
        assert!(h.scheduler.is_scheduled(&run.id));

        h.service.delete_run(&run.id).unwrap();
        assert_eq!(h.service.tracked_locks(), 0);
        assert!(!h.scheduler.is_scheduled(&run.id));
        assert!(h.service.get_run(&run.id).unwrap_err().is_not_found());

        assert!(h.service.delete_run(&run.id).unwrap_err().is_not_found());
        assert!(h.service.rename_checklist(&run.id, 0, "x").unwrap_err().is_not_found());
        assert_eq!(h.service.tracked_locks(), 0);
    }
}
